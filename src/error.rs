use std::path::PathBuf;
use thiserror::Error;

use crate::colmap::ToolStatus;
use crate::pipeline::{PipelineState, Stage};

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures while reading or resolving the nuScenes metadata tables.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read table {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse table {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown {table} token: {token}")]
    UnknownToken { table: &'static str, token: String },

    #[error("Scene index {index} is out of range ({count} scenes available)")]
    SceneIndex { index: usize, count: usize },

    #[error("Sample {sample} has no {channel} data")]
    MissingChannel { sample: String, channel: String },

    #[error("Sample chain loops back to {0}")]
    CyclicChain(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Every way the reconstruction can abort. None of them are recovered.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Workspace I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("COLMAP database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("COLMAP {stage} could not be started: {source}")]
    Spawn {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },

    #[error("COLMAP {stage} failed ({status})")]
    StageFailed { stage: Stage, status: ToolStatus },

    #[error("Cannot run {step} from state {actual}, it requires {expected}")]
    OutOfOrder {
        step: String,
        expected: PipelineState,
        actual: PipelineState,
    },

    #[error("No valid sparse reconstruction found in {}", .0.display())]
    NoSparseModel(PathBuf),

    #[error("COLMAP sparse reconstruction failed! {} is missing {missing:?}", .dir.display())]
    IncompleteSparseModel { dir: PathBuf, missing: Vec<String> },

    #[error(
        "Undistorted images are missing in {}. Ensure image_undistorter was run successfully.",
        .0.display()
    )]
    MissingUndistortedImages(PathBuf),

    #[error(
        "Dense stereo inputs are missing in {}. Ensure image_undistorter completed successfully.",
        .0.display()
    )]
    MissingStereoInputs(PathBuf),

    #[error("Stereo fusion did not write a point cloud to {}", .0.display())]
    MissingPointCloud(PathBuf),
}
