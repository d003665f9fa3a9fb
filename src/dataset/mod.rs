/// Dataset access module
///
/// This module handles:
/// - Loading the nuScenes metadata tables and resolving tokens (nuscenes.rs)
/// - Walking a scene's sample chain to collect camera images (walker.rs)

pub mod nuscenes;
pub mod walker;

pub use nuscenes::NuScenes;
pub use walker::collect_channel_images;
