/// nuScenes metadata reader
///
/// Loads the JSON tables of one dataset version and indexes them by token.
/// Only the tables needed to go from a scene to its camera files are read:
/// scene, sample, sample_data, calibrated_sensor and sensor.
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DatasetError;

/// A recorded driving sequence
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Scene {
    pub token: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nbr_samples: usize,
    pub first_sample_token: String,
    pub last_sample_token: String,
    #[serde(default)]
    pub log_token: String,
}

/// One key frame of a scene, linked to its neighbours through `prev`/`next`.
/// An empty token marks the end of the chain.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Sample {
    pub token: String,
    pub timestamp: i64,
    pub scene_token: String,
    pub prev: String,
    pub next: String,
    /// Channel name -> key-frame sample_data token, filled in at load time
    #[serde(skip)]
    pub data: BTreeMap<String, String>,
}

/// One sensor capture. `filename` is relative to the dataset root.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SampleData {
    pub token: String,
    pub sample_token: String,
    pub calibrated_sensor_token: String,
    pub filename: String,
    #[serde(default)]
    pub fileformat: String,
    pub is_key_frame: bool,
    pub timestamp: i64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub prev: String,
    #[serde(default)]
    pub next: String,
    /// Resolved through calibrated_sensor -> sensor at load time
    #[serde(skip)]
    pub channel: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CalibratedSensor {
    pub token: String,
    pub sensor_token: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Sensor {
    pub token: String,
    pub channel: String,
    pub modality: String,
}

/// The metadata of one dataset version, indexed by token.
pub struct NuScenes {
    root: PathBuf,
    version: String,
    scenes: Vec<Scene>,
    samples: HashMap<String, Sample>,
    sample_data: HashMap<String, SampleData>,
}

impl NuScenes {
    /// Load `<root>/<version>/*.json`.
    pub fn load(root: impl Into<PathBuf>, version: &str) -> Result<Self, DatasetError> {
        let root = root.into();
        let table_dir = root.join(version);
        info!(
            "Loading nuScenes tables for version {} from {}",
            version,
            table_dir.display()
        );

        let scenes: Vec<Scene> = read_table(&table_dir, "scene")?;
        let samples: Vec<Sample> = read_table(&table_dir, "sample")?;
        let sample_data: Vec<SampleData> = read_table(&table_dir, "sample_data")?;
        let calibrated_sensors: Vec<CalibratedSensor> =
            read_table(&table_dir, "calibrated_sensor")?;
        let sensors: Vec<Sensor> = read_table(&table_dir, "sensor")?;

        info!(
            "{} scene, {} sample, {} sample_data, {} calibrated_sensor, {} sensor",
            scenes.len(),
            samples.len(),
            sample_data.len(),
            calibrated_sensors.len(),
            sensors.len()
        );

        Self::from_tables(
            root,
            version,
            scenes,
            samples,
            sample_data,
            calibrated_sensors,
            sensors,
        )
    }

    /// Build the token indexes and attach every key-frame capture to its
    /// sample under the capturing sensor's channel.
    pub fn from_tables(
        root: impl Into<PathBuf>,
        version: &str,
        scenes: Vec<Scene>,
        samples: Vec<Sample>,
        sample_data: Vec<SampleData>,
        calibrated_sensors: Vec<CalibratedSensor>,
        sensors: Vec<Sensor>,
    ) -> Result<Self, DatasetError> {
        let sensors: HashMap<String, Sensor> = sensors
            .into_iter()
            .map(|sensor| (sensor.token.clone(), sensor))
            .collect();
        let calibrated_sensors: HashMap<String, CalibratedSensor> = calibrated_sensors
            .into_iter()
            .map(|cs| (cs.token.clone(), cs))
            .collect();
        let mut samples: HashMap<String, Sample> = samples
            .into_iter()
            .map(|sample| (sample.token.clone(), sample))
            .collect();

        let mut indexed_data = HashMap::with_capacity(sample_data.len());
        for mut record in sample_data {
            let calibrated = calibrated_sensors
                .get(&record.calibrated_sensor_token)
                .ok_or_else(|| DatasetError::UnknownToken {
                    table: "calibrated_sensor",
                    token: record.calibrated_sensor_token.clone(),
                })?;
            let sensor =
                sensors
                    .get(&calibrated.sensor_token)
                    .ok_or_else(|| DatasetError::UnknownToken {
                        table: "sensor",
                        token: calibrated.sensor_token.clone(),
                    })?;
            record.channel = sensor.channel.clone();

            if record.is_key_frame {
                let sample = samples.get_mut(&record.sample_token).ok_or_else(|| {
                    DatasetError::UnknownToken {
                        table: "sample",
                        token: record.sample_token.clone(),
                    }
                })?;
                sample
                    .data
                    .insert(record.channel.clone(), record.token.clone());
            }

            indexed_data.insert(record.token.clone(), record);
        }

        Ok(Self {
            root: root.into(),
            version: version.to_string(),
            scenes,
            samples,
            sample_data: indexed_data,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Scene by position in the scene table
    pub fn scene(&self, index: usize) -> Result<&Scene, DatasetError> {
        self.scenes.get(index).ok_or(DatasetError::SceneIndex {
            index,
            count: self.scenes.len(),
        })
    }

    pub fn sample(&self, token: &str) -> Result<&Sample, DatasetError> {
        self.samples
            .get(token)
            .ok_or_else(|| DatasetError::UnknownToken {
                table: "sample",
                token: token.to_string(),
            })
    }

    pub fn sample_data(&self, token: &str) -> Result<&SampleData, DatasetError> {
        self.sample_data
            .get(token)
            .ok_or_else(|| DatasetError::UnknownToken {
                table: "sample_data",
                token: token.to_string(),
            })
    }

    /// Absolute location of a capture's file
    pub fn data_path(&self, record: &SampleData) -> PathBuf {
        self.root.join(&record.filename)
    }
}

fn read_table<T: DeserializeOwned>(table_dir: &Path, name: &str) -> Result<Vec<T>, DatasetError> {
    let path = table_dir.join(format!("{}.json", name));
    let content = fs::read_to_string(&path).map_err(|source| DatasetError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| DatasetError::Json { path, source })
}
