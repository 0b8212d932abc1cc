//! Domain entities and business rules

pub mod config;
pub mod context;
pub mod device;
pub mod events;
pub mod format;
pub mod kind;
pub mod manager;
pub mod media;
pub mod preview;
pub mod scheduler;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

// Re-export specific items to avoid ambiguous glob imports
pub use config::{ConfigError, ConfigManager, EventConfig, MinstrelConfig};
pub use context::MediaContext;
pub use device::{DeviceIdentity, DeviceIdentityError, Lane, MediaClass};
pub use events::{CoreEvent, EventHub};
pub use format::{AudioFormat, BufferConfig, DeviceConfig, StreamFormat, VideoFormat};
pub use kind::{AudioInput, AudioOutput, CaptureKind, MediaKind, PlaybackKind, VideoInput};
pub use manager::{DeviceErrorCode, Manager, ManagerEvents, NullManager};
pub use media::{
    AudioInputCore, AudioOutputCore, CoreMode, MediaCore, ModeError, VideoInputCore,
};
pub use preview::{FrameSink, PreviewPump};
pub use scheduler::{
    BufferPlayer, ClipError, ClipLoader, EventFileName, EventScheduler, SoundClip,
};
pub use settings::{
    AudioSettings, DeviceKnobs, DeviceSettings, SettingsSnapshot, VideoSettings,
};
