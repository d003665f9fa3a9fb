use log::info;
use rusqlite::Connection;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// The COLMAP workspace tree.
///
/// ```text
/// <root>/
///   images/        copied input frames
///   database.db    features and matches (written by COLMAP)
///   sparse/<N>/    mapper models
///   dense/         undistorted images, stereo maps, fused.ply
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
    pub images: PathBuf,
    pub database: PathBuf,
    pub sparse: PathBuf,
    pub dense: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            root: root.to_path_buf(),
            images: root.join("images"),
            database: root.join("database.db"),
            sparse: root.join("sparse"),
            dense: root.join("dense"),
        }
    }

    /// Undistorted images written by image_undistorter
    pub fn undistorted_images(&self) -> PathBuf {
        self.dense.join("images")
    }

    /// Patch-match configuration and depth maps
    pub fn stereo(&self) -> PathBuf {
        self.dense.join("stereo")
    }

    /// Final point cloud written by stereo_fusion
    pub fn fused_point_cloud(&self) -> PathBuf {
        self.dense.join("fused.ply")
    }

    /// Get the workspace ready for feature extraction.
    ///
    /// Creates the root and images folders, creates the database file when
    /// it does not exist yet, and copies every frame into `images/`
    /// (same-named files are overwritten). Safe to call repeatedly.
    /// Returns the number of copied files.
    pub fn prepare(&self, frames: &[PathBuf]) -> Result<usize> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(&self.images)?;

        if self.ensure_database()? {
            info!("📁 Database created at: {}", self.database.display());
        }

        for frame in frames {
            let name = frame.file_name().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Not a file path: {}", frame.display()),
                )
            })?;
            fs::copy(frame, self.images.join(name))?;
        }

        info!(
            "📷 Copied {} frames into {}",
            frames.len(),
            self.images.display()
        );
        Ok(frames.len())
    }

    /// Create an empty SQLite file for COLMAP to fill.
    /// Returns whether the file was created.
    fn ensure_database(&self) -> Result<bool> {
        if self.database.exists() {
            return Ok(false);
        }
        // Opening is enough: SQLite creates the file, COLMAP creates the schema
        let conn = Connection::open(&self.database)?;
        drop(conn);
        Ok(true)
    }
}
