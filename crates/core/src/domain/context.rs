//! Explicit media context
//!
//! Built once at startup and handed to whatever needs the cores; there is no
//! process-wide instance.

use crate::domain::media::{AudioInputCore, AudioOutputCore, VideoInputCore};
use crate::domain::format::{AudioFormat, VideoFormat};
use crate::domain::preview::FrameSink;
use crate::domain::scheduler::{ClipLoader, EventScheduler};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct MediaContext {
    pub audio_input: Arc<AudioInputCore>,
    pub audio_output: Arc<AudioOutputCore>,
    pub video_input: Arc<VideoInputCore>,
    pub scheduler: EventScheduler,
}

impl MediaContext {
    /// Build the three cores and the event scheduler.
    ///
    /// The microphone preview is routed to the speaker, and event clips
    /// play through the audio output core.
    pub fn new(loader: Arc<dyn ClipLoader>, data_dir: PathBuf) -> io::Result<Self> {
        let audio_input = AudioInputCore::new();
        let audio_output = AudioOutputCore::new();
        let video_input = VideoInputCore::new();

        audio_input.set_preview_sink(audio_output.clone() as Arc<dyn FrameSink<AudioFormat>>)?;
        let scheduler = EventScheduler::new(audio_output.clone(), loader, data_dir)?;

        info!("Media context ready");
        Ok(Self {
            audio_input,
            audio_output,
            video_input,
            scheduler,
        })
    }

    /// Route the video preview to a renderer
    pub fn set_video_sink(&self, sink: Arc<dyn FrameSink<VideoFormat>>) -> io::Result<()> {
        self.video_input.set_preview_sink(sink)
    }
}
