use log::debug;
use std::fmt;
use std::fs;
use std::io;

use super::validate;
use super::{PipelineState, StageContext};
use crate::colmap::Invocation;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// The COLMAP stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    FeatureExtraction,
    SequentialMatching,
    Mapping,
    Undistortion,
    PatchMatchStereo,
    StereoFusion,
}

impl Stage {
    pub fn subcommand(self) -> &'static str {
        match self {
            Stage::FeatureExtraction => "feature_extractor",
            Stage::SequentialMatching => "sequential_matcher",
            Stage::Mapping => "mapper",
            Stage::Undistortion => "image_undistorter",
            Stage::PatchMatchStereo => "patch_match_stereo",
            Stage::StereoFusion => "stereo_fusion",
        }
    }

    /// Output directories COLMAP expects to exist before it starts. A point
    /// cloud left by an earlier run is removed so only this fusion can
    /// satisfy the output check.
    fn prepare(self, ctx: &StageContext) -> Result<()> {
        match self {
            Stage::Mapping => fs::create_dir_all(&ctx.layout.sparse)?,
            Stage::Undistortion => fs::create_dir_all(&ctx.layout.dense)?,
            Stage::StereoFusion => {
                let cloud = ctx.layout.fused_point_cloud();
                match fs::remove_file(&cloud) {
                    Ok(()) => debug!("Removed stale {}", cloud.display()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn invocation(self, config: &PipelineConfig, ctx: &StageContext) -> Result<Invocation> {
        let layout = &ctx.layout;
        let invocation = Invocation::new(self.subcommand());
        Ok(match self {
            Stage::FeatureExtraction => invocation
                .path("database_path", &layout.database)
                .path("image_path", &layout.images)
                .option(
                    "SiftExtraction.max_num_features",
                    config.feature_extraction.max_num_features.to_string(),
                ),
            Stage::SequentialMatching => invocation
                .path("database_path", &layout.database)
                .flag("SiftMatching.use_gpu", config.matching.use_gpu),
            Stage::Mapping => {
                let mapper = &config.mapper;
                invocation
                    .path("database_path", &layout.database)
                    .path("image_path", &layout.images)
                    .path("output_path", &layout.sparse)
                    .option(
                        "Mapper.init_min_num_inliers",
                        mapper.init_min_num_inliers.to_string(),
                    )
                    .option(
                        "Mapper.abs_pose_min_num_inliers",
                        mapper.abs_pose_min_num_inliers.to_string(),
                    )
                    .option("Mapper.min_model_size", mapper.min_model_size.to_string())
                    .option("Mapper.num_threads", mapper.num_threads.to_string())
            }
            Stage::Undistortion => {
                let model = ctx
                    .sparse_model
                    .as_deref()
                    .ok_or_else(|| PipelineError::NoSparseModel(layout.sparse.clone()))?;
                invocation
                    .path("image_path", &layout.images)
                    .path("input_path", model)
                    .path("output_path", &layout.dense)
            }
            Stage::PatchMatchStereo => {
                let patch_match = &config.patch_match;
                invocation
                    .path("workspace_path", &layout.dense)
                    .flag("PatchMatchStereo.use_gpu", patch_match.use_gpu)
                    .option(
                        "PatchMatchStereo.max_image_size",
                        patch_match.max_image_size.to_string(),
                    )
                    .option(
                        "PatchMatchStereo.num_threads",
                        patch_match.num_threads.to_string(),
                    )
            }
            Stage::StereoFusion => invocation
                .path("workspace_path", &layout.dense)
                .path("output_path", &layout.fused_point_cloud()),
        })
    }

    /// Check the files a successful run leaves behind
    fn verify(self, ctx: &mut StageContext) -> Result<()> {
        match self {
            Stage::Mapping => {
                let model = validate::latest_sparse_model(&ctx.layout.sparse)?;
                validate::check_sparse_model(&model)?;
                ctx.sparse_model = Some(model);
            }
            Stage::Undistortion => validate::check_dense_inputs(&ctx.layout)?,
            Stage::StereoFusion => validate::check_point_cloud(&ctx.layout)?,
            _ => {}
        }
        Ok(())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FeatureExtraction => "feature extraction",
            Stage::SequentialMatching => "sequential matching",
            Stage::Mapping => "mapping",
            Stage::Undistortion => "image undistortion",
            Stage::PatchMatchStereo => "dense stereo",
            Stage::StereoFusion => "stereo fusion",
        };
        f.write_str(name)
    }
}

/// One step of the reconstruction: which stage runs, the state it needs,
/// the state its exit reaches and, when the stage has an output check, the
/// state reached once that check passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub stage: Stage,
    pub requires: PipelineState,
    pub reaches: PipelineState,
    pub validated: Option<PipelineState>,
}

impl StageDescriptor {
    pub fn prepare(&self, ctx: &StageContext) -> Result<()> {
        self.stage.prepare(ctx)
    }

    pub fn invocation(&self, config: &PipelineConfig, ctx: &StageContext) -> Result<Invocation> {
        self.stage.invocation(config, ctx)
    }

    pub fn verify(&self, ctx: &mut StageContext) -> Result<()> {
        self.stage.verify(ctx)
    }

    /// State once the stage and its check have both succeeded
    pub fn completes(&self) -> PipelineState {
        self.validated.unwrap_or(self.reaches)
    }
}

/// Every COLMAP stage, in the only order they may run.
pub const STAGES: [StageDescriptor; 6] = [
    StageDescriptor {
        stage: Stage::FeatureExtraction,
        requires: PipelineState::WorkspacePrepared,
        reaches: PipelineState::FeaturesExtracted,
        validated: None,
    },
    StageDescriptor {
        stage: Stage::SequentialMatching,
        requires: PipelineState::FeaturesExtracted,
        reaches: PipelineState::Matched,
        validated: None,
    },
    StageDescriptor {
        stage: Stage::Mapping,
        requires: PipelineState::Matched,
        reaches: PipelineState::Mapped,
        validated: Some(PipelineState::SparseValidated),
    },
    StageDescriptor {
        stage: Stage::Undistortion,
        requires: PipelineState::SparseValidated,
        reaches: PipelineState::Undistorted,
        validated: Some(PipelineState::DenseValidated),
    },
    StageDescriptor {
        stage: Stage::PatchMatchStereo,
        requires: PipelineState::DenseValidated,
        reaches: PipelineState::StereoComputed,
        validated: None,
    },
    StageDescriptor {
        stage: Stage::StereoFusion,
        requires: PipelineState::StereoComputed,
        reaches: PipelineState::Fused,
        validated: None,
    },
];
