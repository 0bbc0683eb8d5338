use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    TarmacError,
    geometry::GradientConfig,
    replay::{PlaybackSpeed, engine::DEFAULT_GAP_TOP_K},
};

const APP_DIR_NAME: &str = "tarmac";
const CONFIG_FILE_NAME: &str = "config.json";
pub const FRAME_INTERVAL_MS: u64 = 50;
pub const SUB_LINE_SAMPLES: usize = 40;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    /// Time between two rendered frames
    pub frame_interval_ms: u64,
    pub default_speed: PlaybackSpeed,
    pub gradient: GradientConfig,
    /// Samples per highlighted stretch of track
    pub sub_line_samples: usize,
    /// Drivers plotted in the gap chart
    pub gap_series_top_k: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: FRAME_INTERVAL_MS,
            default_speed: PlaybackSpeed::default(),
            gradient: GradientConfig::default(),
            sub_line_samples: SUB_LINE_SAMPLES,
            gap_series_top_k: DEFAULT_GAP_TOP_K,
        }
    }
}

impl ReplayConfig {
    pub fn config_path() -> Result<PathBuf, TarmacError> {
        Ok(dirs::config_dir()
            .ok_or(TarmacError::NoConfigDir)?
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    pub fn from_local_file() -> Result<Option<Self>, TarmacError> {
        Self::from_file(&Self::config_path()?)
    }

    pub fn from_file(config_path: &Path) -> Result<Option<Self>, TarmacError> {
        if !config_path.exists() {
            return Ok(None);
        }
        let file = File::open(config_path).map_err(|e| TarmacError::ConfigIOError { source: e })?;
        let config = serde_json::from_reader(file)
            .map_err(|e| TarmacError::ConfigSerializeError { source: e })?;
        info!("Loaded config from {:?}", config_path);
        Ok(Some(config))
    }

    pub fn save(&self) -> Result<(), TarmacError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), TarmacError> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| TarmacError::ConfigIOError { source: e })?;
        }
        let file =
            File::create(config_path).map_err(|e| TarmacError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| TarmacError::ConfigSerializeError { source: e })
    }
}
