use log::{debug, warn};
use std::collections::HashSet;
use std::path::PathBuf;

use super::nuscenes::{NuScenes, Scene};
use crate::error::DatasetError;

/// Collect one image path per sample of `scene`, in chain order.
///
/// Starts at the scene's first sample and follows `next` until the chain
/// ends, resolving `sample.data[channel]` to the capture's file each time.
pub fn collect_channel_images(
    nusc: &NuScenes,
    scene: &Scene,
    channel: &str,
) -> Result<Vec<PathBuf>, DatasetError> {
    let mut images = Vec::with_capacity(scene.nbr_samples);
    let mut visited = HashSet::new();
    let mut token = scene.first_sample_token.as_str();

    while !token.is_empty() {
        if !visited.insert(token) {
            return Err(DatasetError::CyclicChain(token.to_string()));
        }

        let sample = nusc.sample(token)?;
        let data_token = sample
            .data
            .get(channel)
            .ok_or_else(|| DatasetError::MissingChannel {
                sample: sample.token.clone(),
                channel: channel.to_string(),
            })?;
        let record = nusc.sample_data(data_token)?;
        let path = nusc.data_path(record);
        debug!("{} -> {}", sample.token, path.display());
        images.push(path);

        token = sample.next.as_str();
    }

    if images.len() != scene.nbr_samples {
        warn!(
            "⚠️  Scene {} lists {} samples but the chain holds {}",
            scene.name,
            scene.nbr_samples,
            images.len()
        );
    }

    Ok(images)
}
