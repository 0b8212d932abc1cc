//! Minstrel infrastructure: concrete device managers and clip decoding

pub mod audio;
pub mod pacing;
pub mod video;

use minstrel_core::domain::context::MediaContext;
use minstrel_core::domain::kind::{AudioInput, AudioOutput};
use tracing::info;

pub use audio::{CpalAudioManager, SilentAudioManager, SymphoniaClipLoader};
pub use video::TestPatternManager;

/// Register the synthetic fallback devices on every core
pub fn register_fallback_managers(context: &MediaContext) {
    context
        .audio_input
        .add_manager(Box::new(SilentAudioManager::<AudioInput>::new()));
    context
        .audio_output
        .add_manager(Box::new(SilentAudioManager::<AudioOutput>::new()));
    context
        .video_input
        .add_manager(Box::new(TestPatternManager::new()));
}

/// Register every manager this platform supports, fallbacks first
pub fn register_default_managers(context: &MediaContext) {
    register_fallback_managers(context);
    context
        .audio_input
        .add_manager(Box::new(CpalAudioManager::<AudioInput>::new()));
    context
        .audio_output
        .add_manager(Box::new(CpalAudioManager::<AudioOutput>::new()));
    info!("Default managers registered");
}
