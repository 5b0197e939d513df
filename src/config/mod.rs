use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cw::{DecoderOptions, SpeedLevel};
use crate::error::ConfigError;
use crate::input::KeyMap;

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Decoder settings
    pub speed_level: u8,
    pub word_space_after_unrecognized: bool,
    pub keymap: KeyMap,

    // Device settings
    pub midi_device: Option<String>,
    pub midi_cancel_note: Option<u8>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speed_level: SpeedLevel::DEFAULT.get(),
            word_space_after_unrecognized: false,
            keymap: KeyMap::default(),
            midi_device: None,
            midi_cancel_note: None,
        }
    }
}

impl Settings {
    /// Get the path to the settings file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("morse-ime");
            path.push("settings.json");
            path
        })
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("[settings] Could not determine config path");
                Self::default()
            }
        }
    }

    /// Load settings from `path`, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("[settings] {:?} does not exist, using defaults", path);
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("[settings] Failed to read config file: {}", e);
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(settings) => {
                info!("[settings] Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("[settings] Failed to parse config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write with explicit sync to ensure data reaches disk
        let mut file = fs::File::create(path).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        info!("[settings] Saved settings to {:?}", path);
        Ok(())
    }

    /// The persisted speed, or the default when the stored value is invalid
    pub fn speed(&self) -> SpeedLevel {
        SpeedLevel::new(self.speed_level).unwrap_or_else(|err| {
            warn!("[settings] {}, using speed level {}", err, SpeedLevel::DEFAULT);
            SpeedLevel::DEFAULT
        })
    }

    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            space_after_unrecognized: self.word_space_after_unrecognized,
            ..DecoderOptions::default()
        }
    }
}
