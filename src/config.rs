//! Configuration loading and management
//!
//! Everything has a default so the daemon runs without a config file. A
//! TOML file overrides any subset of the fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "TATTLE_CONFIG";

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gpio: GpioConfig,
    pub input: InputConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub call: CallConfig,
    /// JSON file listing the contacts offered in the call menu
    pub contacts_path: PathBuf,
}

/// Pull resistor applied to an input line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pull {
    #[default]
    Up,
    Down,
    None,
}

/// Hardware line assignment (BCM numbering)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub hook_pin: u8,
    pub dial_pin: u8,
    pub pull: Pull,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            hook_pin: 18,
            dial_pin: 23,
            pull: Pull::Up,
        }
    }
}

/// Timing of the edge decoding pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Bounce window in milliseconds
    pub bounce_ms: u64,
    /// Longest gap between two pulses of the same digit, in milliseconds
    pub pulse_timeout_ms: u64,
}

impl InputConfig {
    pub fn bounce(&self) -> Duration {
        Duration::from_millis(self.bounce_ms)
    }

    pub fn pulse_timeout(&self) -> Duration {
        Duration::from_millis(self.pulse_timeout_ms)
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            bounce_ms: 10,
            pulse_timeout_ms: 150,
        }
    }
}

/// External programs used for speech and file playback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub speech_program: String,
    pub speech_args: Vec<String>,
    pub playback_program: String,
    pub playback_args: Vec<String>,
    /// Tone played when a recording starts
    pub beep_path: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            speech_program: "espeak-ng".into(),
            speech_args: vec!["-ven-us+f2".into()],
            playback_program: "aplay".into(),
            playback_args: Vec::new(),
            beep_path: data_dir().join("sounds").join("beep.wav"),
        }
    }
}

/// Voice recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub program: String,
    pub args: Vec<String>,
    pub directory: PathBuf,
    pub extension: String,
    /// Hard upper bound on a single recording, in seconds
    pub max_duration_secs: u64,
}

impl RecordingConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            program: "arecord".into(),
            args: Vec::new(),
            directory: data_dir().join("recordings"),
            extension: "wav".into(),
            max_duration_secs: 120,
        }
    }
}

/// Outbound call settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub enabled: bool,
    pub program: String,
    pub config_dir: PathBuf,
    pub register_timeout_secs: u64,
    pub dial_timeout_secs: u64,
}

impl CallConfig {
    pub fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.register_timeout_secs)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "baresip".into(),
            config_dir: PathBuf::from("/etc/opt/baresip/"),
            register_timeout_secs: 10,
            dial_timeout_secs: 60,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("tattle")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("tattle")
}

impl Config {
    /// Load configuration from `TATTLE_CONFIG` or the default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir().join("config.toml"));

        if !path.exists() {
            debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }

        Self::from_file(&path)
    }

    /// Load configuration from a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Ensure the recording directory exists
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        let dir = &self.recording.directory;
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
            path: dir.clone(),
            source,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpio: GpioConfig::default(),
            input: InputConfig::default(),
            audio: AudioConfig::default(),
            recording: RecordingConfig::default(),
            call: CallConfig::default(),
            contacts_path: config_dir().join("contacts.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.input.bounce(), Duration::from_millis(10));
        assert_eq!(config.input.pulse_timeout(), Duration::from_millis(150));
        assert_eq!(config.recording.max_duration(), Duration::from_secs(120));
        assert_eq!(config.recording.extension, "wav");
        assert!(!config.call.enabled);
        assert!(config.contacts_path.ends_with("contacts.json"));
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[gpio]
hook_pin = 12

[input]
pulse_timeout_ms = 200

[call]
enabled = true
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.gpio.hook_pin, 12);
        assert_eq!(config.gpio.dial_pin, 23);
        assert_eq!(config.gpio.pull, Pull::Up);
        assert_eq!(config.input.pulse_timeout_ms, 200);
        assert_eq!(config.input.bounce_ms, 10);
        assert!(config.call.enabled);
        assert_eq!(config.call.program, "baresip");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[input\nbounce_ms = ").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_ensure_dirs_creates_recording_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.recording.directory = tmp.path().join("nested").join("recordings");
        config.ensure_dirs().unwrap();
        assert!(config.recording.directory.is_dir());
    }
}
