//! Stream formats and per-mode device configuration

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Anything a core can open a device with
pub trait StreamFormat: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Size in bytes of one frame handed across the transfer path
    fn frame_len(&self, buffers: &BufferConfig) -> usize;
}

/// PCM audio format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample,
        }
    }

    pub fn bytes_per_second(&self) -> usize {
        self.channels as usize * self.sample_rate as usize * (self.bits_per_sample as usize / 8)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(1, 8000, 16)
    }
}

impl StreamFormat for AudioFormat {
    fn frame_len(&self, buffers: &BufferConfig) -> usize {
        if buffers.size > 0 {
            return buffers.size;
        }
        // 20 ms, rounded down to whole samples
        let sample_bytes = (self.channels as usize * (self.bits_per_sample as usize / 8)).max(1);
        let len = self.bytes_per_second() / 50;
        (len / sample_bytes * sample_bytes).max(sample_bytes)
    }
}

/// Raw video capture format (YUV420 planar frames)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoFormat {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self::new(176, 144, 30)
    }
}

impl StreamFormat for VideoFormat {
    fn frame_len(&self, _buffers: &BufferConfig) -> usize {
        self.width as usize * self.height as usize * 3 / 2
    }
}

/// Backend buffering hint, `0` means "backend default"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferConfig {
    pub size: usize,
    pub count: usize,
}

impl BufferConfig {
    pub fn new(size: usize, count: usize) -> Self {
        Self { size, count }
    }
}

/// Configuration of one mode (preview or stream) of a core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig<F> {
    pub active: bool,
    pub format: F,
    pub buffers: BufferConfig,
}

impl<F: StreamFormat> DeviceConfig<F> {
    pub fn new(format: F, buffers: BufferConfig) -> Self {
        Self {
            active: false,
            format,
            buffers,
        }
    }

    /// Whether a device opened with `other` can serve this config as is
    pub fn same_parameters(&self, other: &Self) -> bool {
        self.format == other.format && self.buffers == other.buffers
    }

    pub fn frame_len(&self) -> usize {
        self.format.frame_len(&self.buffers)
    }
}

impl<F: StreamFormat + Default> Default for DeviceConfig<F> {
    fn default() -> Self {
        Self::new(F::default(), BufferConfig::default())
    }
}
