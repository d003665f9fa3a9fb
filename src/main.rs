use log::{debug, error, info};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

mod colmap;
mod config;
mod dataset;
mod error;
mod pipeline;
mod workspace;

use colmap::ProcessRunner;
use config::PipelineConfig;
use dataset::{collect_channel_images, NuScenes};
use error::Result;
use pipeline::Pipeline;

const USAGE: &str = "Usage: nuscenes-colmap [config.json]";

fn main() -> ExitCode {
    init_logger();

    let config_path = env::args_os().nth(1);
    if matches!(&config_path, Some(arg) if arg == "-h" || arg == "--help") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    match run(config_path) {
        Ok(point_cloud) => {
            println!(
                "✅ Reconstruction complete! The point cloud is saved at: {}",
                point_cloud.display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("❌ {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr, `RUST_LOG` overrides the default `info` level
fn init_logger() {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

fn run(config_path: Option<OsString>) -> Result<PathBuf> {
    let config = match config_path {
        Some(path) => {
            info!("⚙️  Loading configuration from {}", PathBuf::from(&path).display());
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };
    debug!("Configuration:\n{}", config.to_json()?);

    let nusc = NuScenes::load(&config.dataset.root, &config.dataset.version)?;
    let scene = nusc.scene(config.dataset.scene_index)?;
    info!(
        "🎬 Scene {} of {} in {}",
        config.dataset.scene_index + 1,
        nusc.scenes().len(),
        nusc.version()
    );
    println!("{}", serde_json::to_string_pretty(scene)?);

    let frames = collect_channel_images(&nusc, scene, &config.dataset.channel)?;

    let runner = ProcessRunner::new(&config.colmap);
    let mut pipeline = Pipeline::new(&config, runner);
    let reconstruction = pipeline.run(&frames)?;
    reconstruction.log_summary(&pipeline.layout().database);

    Ok(reconstruction.point_cloud)
}
