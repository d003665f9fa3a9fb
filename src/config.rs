/// Pipeline configuration
///
/// Every path and COLMAP flag the reconstruction uses lives here.
/// The defaults reproduce the fixed setup the tool was built around
/// (nuScenes mini, first scene, front camera); a JSON file can override
/// any subset of the values.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::workspace::WorkspaceLayout;

/// Top-level configuration passed to the orchestration routine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which scene and camera to extract
    pub dataset: DatasetConfig,

    /// Root of the COLMAP workspace (images/, database.db, sparse/, dense/)
    pub workspace: PathBuf,

    /// COLMAP executable, resolved through PATH when not absolute
    pub colmap: PathBuf,

    pub feature_extraction: FeatureExtractionOptions,
    pub matching: MatchingOptions,
    pub mapper: MapperOptions,
    pub patch_match: PatchMatchOptions,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset root, containing the version folder and the sensor files
    pub root: PathBuf,
    /// Metadata version folder (e.g. "v1.0-mini")
    pub version: String,
    /// Index into the scene table
    pub scene_index: usize,
    /// Sensor channel whose images are reconstructed
    pub channel: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FeatureExtractionOptions {
    /// SiftExtraction.max_num_features
    pub max_num_features: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MatchingOptions {
    /// SiftMatching.use_gpu
    pub use_gpu: bool,
}

/// Incremental mapper thresholds.
///
/// The inlier and model-size limits are deliberately low so that short
/// driving sequences with little parallax still produce a model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MapperOptions {
    pub init_min_num_inliers: u32,
    pub abs_pose_min_num_inliers: u32,
    pub min_model_size: u32,
    pub num_threads: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PatchMatchOptions {
    pub use_gpu: bool,
    /// Longest image side in pixels, bounds memory use
    pub max_image_size: u32,
    pub num_threads: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            workspace: PathBuf::from("./colmap_workspace"),
            colmap: PathBuf::from("colmap"),
            feature_extraction: FeatureExtractionOptions::default(),
            matching: MatchingOptions::default(),
            mapper: MapperOptions::default(),
            patch_match: PatchMatchOptions::default(),
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/NuScenesMini"),
            version: "v1.0-mini".to_string(),
            scene_index: 0,
            channel: "CAM_FRONT".to_string(),
        }
    }
}

impl Default for FeatureExtractionOptions {
    fn default() -> Self {
        Self { max_num_features: 5000 }
    }
}

impl Default for MatchingOptions {
    fn default() -> Self {
        Self { use_gpu: false }
    }
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            init_min_num_inliers: 5,
            abs_pose_min_num_inliers: 3,
            min_model_size: 1,
            num_threads: 8,
        }
    }
}

impl Default for PatchMatchOptions {
    fn default() -> Self {
        Self {
            use_gpu: false,
            max_image_size: 2000,
            num_threads: 4,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration file. Missing keys keep their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_json(&json)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Directory layout derived from the workspace root
    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.workspace)
    }
}
