// Global configuration management

use crate::engine::{DEFAULT_MAX_WORKERS, PresetOverride, PresetTable};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable that points at an alternative config file
pub const CONFIG_ENV: &str = "FFCLIP_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    /// Entries replacing or extending the builtin resolution ladder
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presets: Vec<PresetOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// ffmpeg binary (name on PATH or absolute path)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// ffprobe binary (name on PATH or absolute path)
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Encoder to use when ffmpeg offers it, e.g. "h264_nvenc"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_encoder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Default number of concurrent transcodes
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Resolutions used when `transcode` is given none
    #[serde(default = "default_resolutions")]
    pub default_resolutions: Vec<u32>,

    /// Wall-clock limit for a whole transcode request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_resolutions() -> Vec<u32> {
    vec![360, 720, 1080]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            preferred_encoder: None,
        }
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            default_resolutions: default_resolutions(),
            job_timeout_secs: None,
        }
    }
}

impl TranscodeConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        config_path_from(std::env::var_os(CONFIG_ENV))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        let config = Config::default();

        // Try to save the default config, but don't fail if we can't
        // (e.g., if the directory isn't writable)
        if let Err(e) = config.save_to(&config_path) {
            warn!(
                path = %config_path.display(),
                error = %format!("{:#}", e),
                "Could not create default config file; using built-in defaults. Run 'ffclip init-config' to create one."
            );
        }

        Ok(config)
    }

    /// Load a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file missing; using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // Surface bad presets at load time rather than mid-transcode
        config.preset_table()?;
        Ok(config)
    }

    /// Write the config as pretty TOML, creating parent directories
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Builtin ladder merged with `[[presets]]`
    pub fn preset_table(&self) -> Result<PresetTable> {
        PresetTable::with_overrides(&self.presets).context("Invalid [[presets]] entry in config")
    }
}

fn config_path_from(env_override: Option<OsString>) -> Result<PathBuf> {
    if let Some(path) = env_override.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let config_dir = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".config")
            .join("ffclip")
    } else {
        dirs::config_dir()
            .context("Could not determine config directory")?
            .join("ffclip")
    };

    Ok(config_dir.join("config.toml"))
}
