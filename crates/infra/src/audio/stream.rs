//! cpal stream plumbing
//!
//! `cpal::Stream` is not `Send`, so every stream lives on its own thread for
//! its whole life. PCM crosses between that thread's callback and the
//! manager through bounded crossbeam channels of 16-bit samples; the callback
//! never blocks on them.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig as CpalStreamConfig;
use crossbeam::channel::{bounded, Receiver, Sender};
use minstrel_core::domain::format::AudioFormat;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// How long `open` waits for the stream thread to report back
const START_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Capture,
    Playback,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Capture => write!(f, "input"),
            Direction::Playback => write!(f, "output"),
        }
    }
}

/// Manager side of the sample channel
pub enum Pipe {
    Capture(Receiver<Vec<i16>>),
    Playback(Sender<Vec<i16>>),
}

/// Owner of one running cpal stream
///
/// Dropping the handle stops the stream and joins its thread.
pub struct StreamHandle {
    pipe: Pipe,
    lost: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Start a stream on `device_name` and wait until it is playing
    pub fn spawn(
        direction: Direction,
        device_name: &str,
        format: AudioFormat,
        queue_depth: usize,
    ) -> Result<Self> {
        let (samples_tx, samples_rx) = bounded::<Vec<i16>>(queue_depth.max(2));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let lost = Arc::new(AtomicBool::new(false));

        let (pipe, thread_end) = match direction {
            Direction::Capture => (Pipe::Capture(samples_rx), ThreadEnd::Capture(samples_tx)),
            Direction::Playback => (Pipe::Playback(samples_tx), ThreadEnd::Playback(samples_rx)),
        };

        let name = device_name.to_string();
        let lost_flag = Arc::clone(&lost);
        let worker = thread::Builder::new()
            .name(format!("cpal-{direction}"))
            .spawn(move || {
                let stream = match build_stream(&name, format, thread_end, lost_flag) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(anyhow!("Failed to start stream: {e}")));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Park until the handle goes away
                let _ = stop_rx.recv();
                drop(stream);
                debug!(device = %name, "Stream thread finished");
            })
            .context("Failed to spawn stream thread")?;

        let handle = Self {
            pipe,
            lost,
            stop: Some(stop_tx),
            worker: Some(worker),
        };

        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => {
                info!(device = device_name, direction = %direction, ?format, "Stream started");
                Ok(handle)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow!("Stream thread did not start in time")),
        }
    }

    pub fn pipe(&self) -> &Pipe {
        &self.pipe
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Stream thread side of the sample channel
enum ThreadEnd {
    Capture(Sender<Vec<i16>>),
    Playback(Receiver<Vec<i16>>),
}

fn find_device(host: &cpal::Host, name: &str, capture: bool) -> Result<cpal::Device> {
    let mut devices: Box<dyn Iterator<Item = cpal::Device>> = if capture {
        Box::new(host.input_devices().context("Failed to list input devices")?)
    } else {
        Box::new(host.output_devices().context("Failed to list output devices")?)
    };
    #[allow(deprecated)]
    let device = devices.find(|d| d.name().ok().as_deref() == Some(name));
    device.ok_or_else(|| anyhow!("Device not found: {name}"))
}

fn build_stream(
    name: &str,
    format: AudioFormat,
    end: ThreadEnd,
    lost: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let capture = matches!(end, ThreadEnd::Capture(_));
    let device = find_device(&host, name, capture)?;

    let sample_format = if capture {
        device.default_input_config()
    } else {
        device.default_output_config()
    }
    .map(|config| config.sample_format())
    .unwrap_or(cpal::SampleFormat::F32);

    let config = CpalStreamConfig {
        channels: format.channels,
        sample_rate: format.sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    match (end, sample_format) {
        (ThreadEnd::Capture(tx), cpal::SampleFormat::I16) => capture_stream::<i16>(&device, &config, tx, lost),
        (ThreadEnd::Capture(tx), cpal::SampleFormat::U16) => capture_stream::<u16>(&device, &config, tx, lost),
        (ThreadEnd::Capture(tx), _) => capture_stream::<f32>(&device, &config, tx, lost),
        (ThreadEnd::Playback(rx), cpal::SampleFormat::I16) => playback_stream::<i16>(&device, &config, rx, lost),
        (ThreadEnd::Playback(rx), cpal::SampleFormat::U16) => playback_stream::<u16>(&device, &config, rx, lost),
        (ThreadEnd::Playback(rx), _) => playback_stream::<f32>(&device, &config, rx, lost),
    }
}

fn error_callback(lost: Arc<AtomicBool>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        error!("Stream error: {}", err);
        lost.store(true, Ordering::Release);
    }
}

fn capture_stream<T>(
    device: &cpal::Device,
    config: &CpalStreamConfig,
    tx: Sender<Vec<i16>>,
    lost: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    i16: cpal::FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<i16> = data
                    .iter()
                    .map(|s| <i16 as cpal::Sample>::from_sample(*s))
                    .collect();
                // A full queue means the reader fell behind; drop the chunk
                let _ = tx.try_send(chunk);
            },
            error_callback(lost),
            None,
        )
        .map_err(|e| anyhow!("Failed to build stream: {e}"))?;
    Ok(stream)
}

fn playback_stream<T>(
    device: &cpal::Device,
    config: &CpalStreamConfig,
    rx: Receiver<Vec<i16>>,
    lost: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let mut pending: VecDeque<i16> = VecDeque::new();
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    if pending.is_empty() {
                        if let Ok(chunk) = rx.try_recv() {
                            pending.extend(chunk);
                        }
                    }
                    // Underruns play silence
                    let sample = pending.pop_front().unwrap_or(0);
                    *out = <T as cpal::Sample>::from_sample(sample);
                }
            },
            error_callback(lost),
            None,
        )
        .map_err(|e| anyhow!("Failed to build stream: {e}"))?;
    Ok(stream)
}
