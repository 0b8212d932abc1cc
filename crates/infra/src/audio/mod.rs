//! Audio backends
//!
//! Real devices go through CPAL, which abstracts the platform APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio
//!
//! The silent device backs the audio fallback identity and needs no
//! hardware at all.

pub mod clip;
pub mod cpal_backend;
pub mod silent;
pub mod stream;

pub use clip::SymphoniaClipLoader;
pub use cpal_backend::{CpalAudioManager, CPAL_TYPE};
pub use silent::SilentAudioManager;
