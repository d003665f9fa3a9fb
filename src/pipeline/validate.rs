/// Post-conditions checked between COLMAP stages
///
/// None of these attempt a repair: a failed check aborts the run.
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::workspace::WorkspaceLayout;

/// Files every mapper model folder must contain
pub const SPARSE_MODEL_FILES: [&str; 3] = ["cameras.bin", "images.bin", "points3D.bin"];

/// Pick the mapper's highest-numbered model folder under `sparse`.
///
/// COLMAP numbers reconstruction attempts 0, 1, 2, ... so the comparison is
/// numeric: "10" wins over "9". Names that are not all digits are ignored.
pub fn latest_sparse_model(sparse: &Path) -> Result<PathBuf> {
    if !sparse.is_dir() {
        return Err(PipelineError::NoSparseModel(sparse.to_path_buf()));
    }

    let mut latest: Option<(u64, PathBuf)> = None;
    for entry in WalkDir::new(sparse).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(index) = model_index(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        if latest.as_ref().map_or(true, |(best, _)| index > *best) {
            latest = Some((index, entry.into_path()));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| PipelineError::NoSparseModel(sparse.to_path_buf()))
}

fn model_index(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// The model folder must hold cameras, images and points.
pub fn check_sparse_model(model: &Path) -> Result<()> {
    let missing: Vec<String> = SPARSE_MODEL_FILES
        .iter()
        .filter(|name| !model.join(name).is_file())
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        debug!("Sparse model complete: {}", model.display());
        Ok(())
    } else {
        Err(PipelineError::IncompleteSparseModel {
            dir: model.to_path_buf(),
            missing,
        })
    }
}

/// Undistortion must have produced both the images and the stereo inputs.
pub fn check_dense_inputs(layout: &WorkspaceLayout) -> Result<()> {
    let images = layout.undistorted_images();
    if !has_entries(&images) {
        return Err(PipelineError::MissingUndistortedImages(images));
    }
    let stereo = layout.stereo();
    if !has_entries(&stereo) {
        return Err(PipelineError::MissingStereoInputs(stereo));
    }
    Ok(())
}

pub fn check_point_cloud(layout: &WorkspaceLayout) -> Result<()> {
    let cloud = layout.fused_point_cloud();
    if cloud.is_file() {
        Ok(())
    } else {
        Err(PipelineError::MissingPointCloud(cloud))
    }
}

/// A directory that exists and holds at least one entry
fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
