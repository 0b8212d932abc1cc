//! Sound clip decoding with symphonia
//!
//! Any container/codec symphonia was built with (WAV, FLAC, MP3, Ogg Vorbis)
//! is decoded in one go into interleaved 16-bit PCM.

use minstrel_core::domain::format::AudioFormat;
use minstrel_core::domain::scheduler::{ClipError, ClipLoader, Result, SoundClip};
use std::fs::File;
use std::io;
use std::path::Path;
use symphonia::core::audio::{SampleBuffer, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaClipLoader;

impl SymphoniaClipLoader {
    pub fn new() -> Self {
        Self
    }
}

fn decode_error(e: SymphoniaError) -> ClipError {
    match e {
        SymphoniaError::IoError(e) => ClipError::Io(e),
        SymphoniaError::Unsupported(what) => ClipError::Unsupported(what.to_string()),
        other => ClipError::Decode(other.to_string()),
    }
}

impl ClipLoader for SymphoniaClipLoader {
    fn load(&self, path: &Path) -> Result<SoundClip> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ClipError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(decode_error)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| ClipError::Unsupported("no audio track".to_string()))?;
        let track_id = track.id;
        let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
        let mut sample_rate = track.codec_params.sample_rate;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(decode_error)?;

        let mut data = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(decode_error(e)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!(path = %path.display(), "Skipping corrupt packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(decode_error(e)),
            };

            let spec = *decoded.spec();
            channels.get_or_insert(spec.channels.count() as u16);
            sample_rate.get_or_insert(spec.rate);

            let mut samples = SampleBuffer::<i16>::new(decoded.frames() as u64, spec);
            samples.copy_interleaved_ref(decoded);
            for sample in samples.samples() {
                data.extend_from_slice(&sample.to_le_bytes());
            }
        }

        let (Some(channels), Some(sample_rate)) = (channels, sample_rate) else {
            return Err(ClipError::Unsupported("unknown channel layout or sample rate".to_string()));
        };
        let clip = SoundClip::new(AudioFormat::new(channels, sample_rate, 16), data);
        debug!(
            path = %path.display(),
            channels,
            sample_rate,
            duration_ms = clip.duration().as_millis() as u64,
            "Clip decoded"
        );
        Ok(clip)
    }
}
