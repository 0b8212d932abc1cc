//! Media kinds served by a [`MediaCore`](crate::domain::media::MediaCore)

use crate::domain::device::{Lane, MediaClass};
use crate::domain::format::{AudioFormat, BufferConfig, StreamFormat, VideoFormat};
use crate::domain::settings::{AudioSettings, DeviceKnobs, VideoSettings};

/// Static description of one media class
pub trait MediaKind: Send + Sync + 'static {
    type Format: StreamFormat + Default;
    type Settings: DeviceKnobs;

    const CLASS: MediaClass;

    /// Lanes this class drives, primary first
    const LANES: &'static [Lane];

    /// Whether `start_stream` may take over a running preview
    const PREVIEW_HANDOFF: bool;

    fn default_buffers() -> BufferConfig {
        BufferConfig::default()
    }
}

/// Kinds whose frames flow from the device to the caller
pub trait CaptureKind: MediaKind {}

/// Kinds whose frames flow from the caller to the device
pub trait PlaybackKind: MediaKind {}

pub struct AudioInput;
pub struct AudioOutput;
pub struct VideoInput;

impl MediaKind for AudioInput {
    type Format = AudioFormat;
    type Settings = AudioSettings;

    const CLASS: MediaClass = MediaClass::AudioInput;
    const LANES: &'static [Lane] = &[Lane::Primary];
    const PREVIEW_HANDOFF: bool = false;

    fn default_buffers() -> BufferConfig {
        BufferConfig::new(320, 5)
    }
}

impl CaptureKind for AudioInput {}

impl MediaKind for AudioOutput {
    type Format = AudioFormat;
    type Settings = AudioSettings;

    const CLASS: MediaClass = MediaClass::AudioOutput;
    const LANES: &'static [Lane] = &[Lane::Primary, Lane::Secondary];
    const PREVIEW_HANDOFF: bool = false;

    fn default_buffers() -> BufferConfig {
        BufferConfig::new(320, 5)
    }
}

impl PlaybackKind for AudioOutput {}

impl MediaKind for VideoInput {
    type Format = VideoFormat;
    type Settings = VideoSettings;

    const CLASS: MediaClass = MediaClass::VideoInput;
    const LANES: &'static [Lane] = &[Lane::Primary];
    const PREVIEW_HANDOFF: bool = true;
}

impl CaptureKind for VideoInput {}
