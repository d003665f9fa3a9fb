/// Reconstruction pipeline
///
/// Drives a collected image sequence through the COLMAP stages:
/// - Pipeline states and the orchestrator (this file)
/// - Stage descriptors and their command lines (stages.rs)
/// - Output checks run between stages (validate.rs)
///
/// The run is strictly linear. Each stage only starts from the state its
/// predecessor left, and the first failure moves the pipeline to
/// `Aborted` for good.

pub mod stages;
pub mod validate;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::colmap::{DatabaseSummary, ToolRunner};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::workspace::WorkspaceLayout;

pub use stages::{Stage, StageDescriptor, STAGES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Start,
    ImagesCollected,
    WorkspacePrepared,
    FeaturesExtracted,
    Matched,
    Mapped,
    SparseValidated,
    Undistorted,
    DenseValidated,
    StereoComputed,
    Fused,
    Done,
    /// Terminal: a step failed
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Start => "start",
            PipelineState::ImagesCollected => "images-collected",
            PipelineState::WorkspacePrepared => "workspace-prepared",
            PipelineState::FeaturesExtracted => "features-extracted",
            PipelineState::Matched => "matched",
            PipelineState::Mapped => "mapped",
            PipelineState::SparseValidated => "sparse-validated",
            PipelineState::Undistorted => "undistorted",
            PipelineState::DenseValidated => "dense-validated",
            PipelineState::StereoComputed => "stereo-computed",
            PipelineState::Fused => "fused",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What stages learn about the workspace as the run goes
#[derive(Debug, Clone)]
pub struct StageContext {
    pub layout: WorkspaceLayout,
    /// Model folder picked after mapping
    pub sparse_model: Option<PathBuf>,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub point_cloud: PathBuf,
    pub sparse_model: PathBuf,
    pub frames: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Reconstruction {
    /// Log frame count, model, timing and the database counts.
    /// Reading the database is best effort.
    pub fn log_summary(&self, database: &Path) {
        let elapsed = self.finished_at - self.started_at;
        info!(
            "📊 {} frames reconstructed in {}s, sparse model {}",
            self.frames,
            elapsed.num_seconds(),
            self.sparse_model.display()
        );
        match DatabaseSummary::read(database) {
            Ok(summary) => info!("📊 Database: {}", summary),
            Err(err) => warn!("⚠️  Could not read {}: {}", database.display(), err),
        }
    }
}

pub struct Pipeline<'a, R: ToolRunner> {
    config: &'a PipelineConfig,
    runner: R,
    state: PipelineState,
    context: StageContext,
}

impl<'a, R: ToolRunner> Pipeline<'a, R> {
    pub fn new(config: &'a PipelineConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            state: PipelineState::Start,
            context: StageContext {
                layout: config.layout(),
                sparse_model: None,
            },
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.context.layout
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run everything from the collected frames to the fused point cloud.
    pub fn run(&mut self, frames: &[PathBuf]) -> Result<Reconstruction> {
        let result = self.run_all(frames);
        if let Err(err) = &result {
            debug!("Pipeline aborted in state {}", self.state);
            self.state = PipelineState::Aborted;
        }
        result
    }

    fn run_all(&mut self, frames: &[PathBuf]) -> Result<Reconstruction> {
        let started_at = Utc::now();

        self.transition("image collection", PipelineState::Start, PipelineState::ImagesCollected)?;
        info!("🔍 {} frames collected", frames.len());

        self.expect_state("workspace preparation", PipelineState::ImagesCollected)?;
        self.context.layout.prepare(frames)?;
        self.state = PipelineState::WorkspacePrepared;

        for descriptor in &STAGES {
            self.run_stage(descriptor)?;
        }

        self.transition("completion", PipelineState::Fused, PipelineState::Done)?;

        let sparse_model = self
            .context
            .sparse_model
            .clone()
            .ok_or_else(|| PipelineError::NoSparseModel(self.context.layout.sparse.clone()))?;
        Ok(Reconstruction {
            point_cloud: self.context.layout.fused_point_cloud(),
            sparse_model,
            frames: frames.len(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run one COLMAP stage and its output check.
    pub fn run_stage(&mut self, descriptor: &StageDescriptor) -> Result<()> {
        let stage = descriptor.stage;
        self.expect_state(&stage.to_string(), descriptor.requires)?;

        descriptor.prepare(&self.context)?;
        let invocation = descriptor.invocation(self.config, &self.context)?;
        info!("🚀 COLMAP {}: {}", stage, invocation);

        let status = self
            .runner
            .run(&invocation)
            .map_err(|source| PipelineError::Spawn { stage, source })?;
        if !status.success() {
            return Err(PipelineError::StageFailed { stage, status });
        }
        self.state = descriptor.reaches;

        descriptor.verify(&mut self.context)?;
        self.state = descriptor.completes();
        info!("✅ COLMAP {} done ({})", stage, self.state);
        Ok(())
    }

    fn expect_state(&self, step: &str, expected: PipelineState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PipelineError::OutOfOrder {
                step: step.to_string(),
                expected,
                actual: self.state,
            })
        }
    }

    fn transition(&mut self, step: &str, from: PipelineState, to: PipelineState) -> Result<()> {
        self.expect_state(step, from)?;
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colmap::{Invocation, ToolStatus};
    use crate::dataset::nuscenes::testing::{write_dataset, VERSION};
    use crate::dataset::{collect_channel_images, NuScenes};
    use std::collections::HashMap;
    use std::fs;
    use std::io;
    use tempfile::{tempdir, TempDir};

    /// What the fake COLMAP does for a subcommand
    #[derive(Clone, Copy, PartialEq)]
    enum Behavior {
        /// Exit 0 and write the usual outputs
        Succeed,
        /// Exit with this code, write nothing
        Fail(i32),
        /// Exit 0 but write nothing
        SucceedSilently,
    }

    /// Stands in for the COLMAP executable: records every call and writes
    /// the files the real tool would leave behind.
    struct ScriptedRunner {
        calls: Vec<&'static str>,
        behavior: HashMap<&'static str, Behavior>,
    }

    impl ScriptedRunner {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                behavior: HashMap::new(),
            }
        }

        fn with(mut self, subcommand: &'static str, behavior: Behavior) -> Self {
            self.behavior.insert(subcommand, behavior);
            self
        }

        fn simulate_outputs(invocation: &Invocation) -> io::Result<()> {
            let value = |flag: &str| PathBuf::from(invocation.value(flag).unwrap());
            match invocation.subcommand() {
                "mapper" => {
                    for model in ["0", "1"] {
                        let dir = value("output_path").join(model);
                        fs::create_dir_all(&dir)?;
                        for name in validate::SPARSE_MODEL_FILES {
                            fs::write(dir.join(name), b"bin")?;
                        }
                    }
                }
                "image_undistorter" => {
                    let dense = value("output_path");
                    fs::create_dir_all(dense.join("images"))?;
                    fs::write(dense.join("images/frame_0.jpg"), "undistorted")?;
                    fs::create_dir_all(dense.join("stereo"))?;
                    fs::write(dense.join("stereo/patch-match.cfg"), "frame_0.jpg\n")?;
                }
                "stereo_fusion" => fs::write(value("output_path"), "ply\n")?,
                _ => {}
            }
            Ok(())
        }
    }

    impl ToolRunner for ScriptedRunner {
        fn run(&mut self, invocation: &Invocation) -> io::Result<ToolStatus> {
            self.calls.push(invocation.subcommand());
            let behavior = self
                .behavior
                .get(invocation.subcommand())
                .copied()
                .unwrap_or(Behavior::Succeed);
            match behavior {
                Behavior::Succeed => {
                    Self::simulate_outputs(invocation)?;
                    Ok(ToolStatus::from_code(0))
                }
                Behavior::Fail(code) => Ok(ToolStatus::from_code(code)),
                Behavior::SucceedSilently => Ok(ToolStatus::from_code(0)),
            }
        }
    }

    const ALL_CALLS: [&str; 6] = [
        "feature_extractor",
        "sequential_matcher",
        "mapper",
        "image_undistorter",
        "patch_match_stereo",
        "stereo_fusion",
    ];

    fn setup(samples: usize) -> (TempDir, PipelineConfig, Vec<PathBuf>) {
        let dir = tempdir().unwrap();
        let dataset = dir.path().join("nuscenes");
        write_dataset(&dataset, samples);

        let mut config = PipelineConfig::default();
        config.dataset.root = dataset.clone();
        config.dataset.version = VERSION.to_string();
        config.workspace = dir.path().join("colmap_workspace");

        let nusc = NuScenes::load(&dataset, VERSION).unwrap();
        let scene = nusc.scene(0).unwrap();
        let frames = collect_channel_images(&nusc, scene, "CAM_FRONT").unwrap();
        (dir, config, frames)
    }

    #[test]
    fn test_three_sample_scene_end_to_end() {
        let (_dir, config, frames) = setup(3);
        assert_eq!(frames.len(), 3);

        let mut pipeline = Pipeline::new(&config, ScriptedRunner::new());
        let reconstruction = pipeline.run(&frames).unwrap();

        assert_eq!(reconstruction.point_cloud, config.workspace.join("dense").join("fused.ply"));
        assert_eq!(reconstruction.sparse_model, config.workspace.join("sparse").join("1"));
        assert_eq!(reconstruction.frames, 3);
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(pipeline.runner().calls, ALL_CALLS);
        assert_eq!(fs::read_dir(&pipeline.layout().images).unwrap().count(), 3);
        assert!(reconstruction.finished_at >= reconstruction.started_at);
    }

    #[test]
    fn test_failed_exit_stops_the_run() {
        for (index, failing) in ALL_CALLS.iter().enumerate() {
            let (_dir, config, frames) = setup(2);
            let runner = ScriptedRunner::new().with(*failing, Behavior::Fail(1));
            let mut pipeline = Pipeline::new(&config, runner);

            let err = pipeline.run(&frames).unwrap_err();

            match err {
                PipelineError::StageFailed { stage, status } => {
                    assert_eq!(stage.subcommand(), *failing);
                    assert_eq!(status.code(), Some(1));
                }
                other => panic!("{} should fail its own stage, got {:?}", failing, other),
            }
            assert_eq!(pipeline.runner().calls, &ALL_CALLS[..=index]);
            assert_eq!(pipeline.state(), PipelineState::Aborted);
        }
    }

    #[test]
    fn test_mapper_without_model() {
        let (_dir, config, frames) = setup(2);
        let runner = ScriptedRunner::new().with("mapper", Behavior::SucceedSilently);
        let mut pipeline = Pipeline::new(&config, runner);

        let err = pipeline.run(&frames).unwrap_err();

        assert!(matches!(err, PipelineError::NoSparseModel(_)));
        assert_eq!(pipeline.runner().calls, &ALL_CALLS[..3]);
    }

    #[test]
    fn test_missing_undistorted_images_blocks_stereo() {
        let (_dir, config, frames) = setup(2);
        let runner = ScriptedRunner::new().with("image_undistorter", Behavior::SucceedSilently);
        let mut pipeline = Pipeline::new(&config, runner);

        let err = pipeline.run(&frames).unwrap_err();

        assert!(matches!(err, PipelineError::MissingUndistortedImages(_)));
        assert!(!pipeline.runner().calls.contains(&"patch_match_stereo"));
        assert_eq!(pipeline.state(), PipelineState::Aborted);
    }

    #[test]
    fn test_missing_point_cloud() {
        let (_dir, config, frames) = setup(1);
        let runner = ScriptedRunner::new().with("stereo_fusion", Behavior::SucceedSilently);
        let mut pipeline = Pipeline::new(&config, runner);

        let err = pipeline.run(&frames).unwrap_err();
        assert!(matches!(err, PipelineError::MissingPointCloud(_)));
    }

    #[test]
    fn test_stale_point_cloud_does_not_pass_fusion() {
        let (_dir, config, frames) = setup(2);
        let layout = config.layout();
        fs::create_dir_all(&layout.dense).unwrap();
        fs::write(layout.fused_point_cloud(), "old run").unwrap();

        let runner = ScriptedRunner::new().with("stereo_fusion", Behavior::SucceedSilently);
        let mut pipeline = Pipeline::new(&config, runner);
        let err = pipeline.run(&frames).unwrap_err();

        assert!(matches!(err, PipelineError::MissingPointCloud(_)));
        assert!(!layout.fused_point_cloud().exists());
        assert_eq!(pipeline.state(), PipelineState::Aborted);
    }

    #[test]
    fn test_stage_out_of_order() {
        let (_dir, config, _frames) = setup(1);
        let mut pipeline = Pipeline::new(&config, ScriptedRunner::new());

        let err = pipeline.run_stage(&STAGES[2]).unwrap_err();

        match err {
            PipelineError::OutOfOrder { expected, actual, .. } => {
                assert_eq!(expected, PipelineState::Matched);
                assert_eq!(actual, PipelineState::Start);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(pipeline.runner().calls.is_empty());
    }

    #[test]
    fn test_aborted_pipeline_cannot_rerun() {
        let (_dir, config, frames) = setup(1);
        let runner = ScriptedRunner::new().with("feature_extractor", Behavior::Fail(2));
        let mut pipeline = Pipeline::new(&config, runner);

        assert!(pipeline.run(&frames).is_err());
        let err = pipeline.run(&frames).unwrap_err();
        assert!(matches!(err, PipelineError::OutOfOrder { actual: PipelineState::Aborted, .. }));
        assert_eq!(pipeline.runner().calls, vec!["feature_extractor"]);
    }

    #[test]
    fn test_spawn_failure_names_stage() {
        struct Unspawnable;
        impl ToolRunner for Unspawnable {
            fn run(&mut self, _: &Invocation) -> io::Result<ToolStatus> {
                Err(io::Error::new(io::ErrorKind::NotFound, "colmap not found"))
            }
        }

        let (_dir, config, frames) = setup(1);
        let mut pipeline = Pipeline::new(&config, Unspawnable);
        let err = pipeline.run(&frames).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Spawn { stage: Stage::FeatureExtraction, .. }
        ));
        assert!(err.to_string().contains("feature extraction"));
    }

    #[test]
    fn test_summary_reads_fresh_database() {
        let (_dir, config, frames) = setup(2);
        let mut pipeline = Pipeline::new(&config, ScriptedRunner::new());
        let reconstruction = pipeline.run(&frames).unwrap();

        // The database is still the empty file created during preparation
        let summary = DatabaseSummary::read(&pipeline.layout().database).unwrap();
        assert_eq!(summary, DatabaseSummary::default());
        reconstruction.log_summary(&pipeline.layout().database);
    }
}
