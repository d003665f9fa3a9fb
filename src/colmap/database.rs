use rusqlite::{Connection, OpenFlags, Result as SqlResult};
use std::fmt;
use std::path::Path;

/// Row counts of the COLMAP tables that tell how far a run got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseSummary {
    /// Registered input images
    pub images: i64,
    /// Images with extracted keypoints
    pub keypoints: i64,
    /// Image pairs with verified geometry
    pub two_view_geometries: i64,
}

impl DatabaseSummary {
    /// Read the counts without modifying the database.
    /// Tables COLMAP has not created yet count as empty.
    pub fn read(path: &Path) -> SqlResult<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self {
            images: count_rows(&conn, "images")?,
            keypoints: count_rows(&conn, "keypoints")?,
            two_view_geometries: count_rows(&conn, "two_view_geometries")?,
        })
    }
}

impl fmt::Display for DatabaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} images, {} with keypoints, {} verified pairs",
            self.images, self.keypoints, self.two_view_geometries
        )
    }
}

fn count_rows(conn: &Connection, table: &str) -> SqlResult<i64> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(0);
    }
    // Table names come from the fixed list above, never from input
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
}
