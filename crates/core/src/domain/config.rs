//! Configuration management for Minstrel
//!
//! This module provides:
//! - The persisted configuration model (devices, formats, settings, events)
//! - TOML load/save
//! - `ConfigManager` for the main config file with factory defaults
//! - The bridge that pushes a configuration into a [`MediaContext`]

use crate::domain::context::MediaContext;
use crate::domain::device::{DeviceIdentity, Lane, MediaClass};
use crate::domain::format::{AudioFormat, BufferConfig, VideoFormat};
use crate::domain::settings::VideoSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Installed sound directory, searched when a clip path does not resolve
    pub data_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|p| p.join("minstrel").join("sounds"))
            .unwrap_or_else(|| PathBuf::from("sounds"));
        Self { data_dir }
    }
}

/// Microphone configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioInputSection {
    /// Device string (empty = fallback device)
    pub device: String,
    pub volume: u32,
    pub format: AudioFormat,
    /// Bytes per frame (0 = 20 ms)
    pub buffer_size: usize,
    pub num_buffers: usize,
}

impl Default for AudioInputSection {
    fn default() -> Self {
        Self {
            device: String::new(),
            volume: 50,
            format: AudioFormat::default(),
            buffer_size: 320,
            num_buffers: 5,
        }
    }
}

/// Speaker configuration, one device per lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOutputSection {
    pub primary_device: String,
    /// Ringer device (empty = play events on the primary device)
    pub secondary_device: String,
    pub primary_volume: u32,
    pub secondary_volume: u32,
    pub format: AudioFormat,
    pub buffer_size: usize,
    pub num_buffers: usize,
}

impl Default for AudioOutputSection {
    fn default() -> Self {
        Self {
            primary_device: String::new(),
            secondary_device: String::new(),
            primary_volume: 50,
            secondary_volume: 50,
            format: AudioFormat::default(),
            buffer_size: 320,
            num_buffers: 5,
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoInputSection {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub brightness: i32,
    pub whiteness: i32,
    pub colour: i32,
    pub contrast: i32,
}

impl Default for VideoInputSection {
    fn default() -> Self {
        let format = VideoFormat::default();
        let picture = VideoSettings::default();
        Self {
            device: String::new(),
            width: format.width,
            height: format.height,
            fps: format.fps,
            brightness: picture.brightness,
            whiteness: picture.whiteness,
            colour: picture.colour,
            contrast: picture.contrast,
        }
    }
}

impl VideoInputSection {
    pub fn format(&self) -> VideoFormat {
        VideoFormat::new(self.width, self.height, self.fps)
    }

    pub fn picture(&self) -> VideoSettings {
        VideoSettings::new(self.brightness, self.whiteness, self.colour, self.contrast)
    }
}

fn default_event_lane() -> Lane {
    Lane::Secondary
}

fn default_enabled() -> bool {
    true
}

/// Sound event catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub name: String,
    pub file: PathBuf,
    #[serde(default = "default_event_lane")]
    pub lane: Lane,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl EventConfig {
    fn new(name: &str, file: &str, lane: Lane) -> Self {
        Self {
            name: name.to_string(),
            file: PathBuf::from(file),
            lane,
            enabled: true,
        }
    }
}

/// Complete Minstrel configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MinstrelConfig {
    pub app: AppConfig,
    pub audio_input: AudioInputSection,
    pub audio_output: AudioOutputSection,
    pub video_input: VideoInputSection,
    pub events: Vec<EventConfig>,
}

/// Device string from the config file; empty selects the fallback
fn device(text: &str, class: MediaClass) -> DeviceIdentity {
    if text.trim().is_empty() {
        DeviceIdentity::fallback(class)
    } else {
        DeviceIdentity::parse_or_fallback(text, class)
    }
}

fn check_audio(section: &str, format: &AudioFormat) -> Result<()> {
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(ConfigError::Invalid(format!(
            "{section}: channels and sample_rate must be non-zero"
        )));
    }
    if !matches!(format.bits_per_sample, 8 | 16 | 32) {
        return Err(ConfigError::Invalid(format!(
            "{section}: unsupported bits_per_sample {}",
            format.bits_per_sample
        )));
    }
    Ok(())
}

impl MinstrelConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Create factory default configuration
    pub fn factory_default() -> Self {
        let mut config = Self::default();

        config.events = vec![
            EventConfig::new("incoming_call", "ring.wav", Lane::Secondary),
            EventConfig::new("ring_tone", "ringback.wav", Lane::Primary),
            EventConfig::new("busy_tone", "busytone.wav", Lane::Primary),
            EventConfig::new("new_message", "newmessage.wav", Lane::Secondary),
        ];

        config
    }

    /// Reject values no device could be opened with
    pub fn validate(&self) -> Result<()> {
        check_audio("audio_input", &self.audio_input.format)?;
        check_audio("audio_output", &self.audio_output.format)?;

        let video = &self.video_input;
        if video.width == 0 || video.height == 0 || video.fps == 0 {
            return Err(ConfigError::Invalid(
                "video_input: width, height and fps must be non-zero".to_string(),
            ));
        }
        if let Some(event) = self.events.iter().find(|e| e.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "event with empty name (file {})",
                event.file.display()
            )));
        }
        Ok(())
    }

    /// Push devices, formats, settings and the event catalog into `context`
    pub fn apply(&self, context: &MediaContext) {
        let input = &self.audio_input;
        let core = &context.audio_input;
        let buffers = BufferConfig::new(input.buffer_size, input.num_buffers);
        core.set_device(Lane::Primary, device(&input.device, MediaClass::AudioInput));
        core.set_volume(Lane::Primary, input.volume);
        core.set_preview_config(input.format, buffers);
        core.set_stream_config(input.format, buffers);

        let output = &self.audio_output;
        let core = &context.audio_output;
        let buffers = BufferConfig::new(output.buffer_size, output.num_buffers);
        core.set_device(Lane::Primary, device(&output.primary_device, MediaClass::AudioOutput));
        core.set_device(Lane::Secondary, device(&output.secondary_device, MediaClass::AudioOutput));
        core.set_volume(Lane::Primary, output.primary_volume);
        core.set_volume(Lane::Secondary, output.secondary_volume);
        core.set_preview_config(output.format, buffers);
        core.set_stream_config(output.format, buffers);

        let video = &self.video_input;
        let core = &context.video_input;
        core.set_device(Lane::Primary, device(&video.device, MediaClass::VideoInput));
        core.set_preview_config(video.format(), BufferConfig::default());
        core.set_stream_config(video.format(), BufferConfig::default());
        core.set_settings(Lane::Primary, video.picture());

        for event in &self.events {
            context
                .scheduler
                .add_event(&event.name, event.file.clone(), event.lane, event.enabled);
        }

        info!(events = self.events.len(), "Configuration applied");
    }
}

/// Configuration manager for the main Minstrel config
///
/// Manages the main configuration file at `~/.config/minstrel/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at `config_dir`
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Create a manager for an explicit config file path
    pub fn with_path(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/minstrel` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("minstrel"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns the factory default.
    /// If the config file is corrupt, backs it up and returns the factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> MinstrelConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = MinstrelConfig::factory_default();

            // Save the factory default for next time
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match MinstrelConfig::load_from_file(&self.config_path).await {
            Ok(config) => {
                info!(
                    path = %self.config_path.display(),
                    "Configuration loaded successfully"
                );
                config
            }
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                // Backup the corrupt config
                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                MinstrelConfig::factory_default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &MinstrelConfig) -> Result<()> {
        // Create config directory if it doesn't exist
        fs::create_dir_all(&self.config_dir).await?;

        config.save_to_file(&self.config_path).await
    }

    /// Overwrite the config file with the factory default
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<MinstrelConfig> {
        let config = MinstrelConfig::factory_default();
        self.save(&config).await?;
        info!(path = %self.config_path.display(), "Configuration reset");
        Ok(config)
    }

    /// Check if config file exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
