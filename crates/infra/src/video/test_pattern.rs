//! Synthetic video source
//!
//! Owns the video fallback identity. Frames are YUV420 planar colour bars
//! that scroll one bar width per second, so a renderer can tell a frozen
//! picture from a live one.

use crate::pacing::Pacer;
use minstrel_core::domain::device::{DeviceIdentity, Lane, MediaClass};
use minstrel_core::domain::format::{StreamFormat, VideoFormat};
use minstrel_core::domain::kind::VideoInput;
use minstrel_core::domain::manager::{Manager, ManagerEvents};
use minstrel_core::domain::settings::{DeviceSettings, VideoSettings};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// (Y, U, V) of the classic eight bars
const BARS: [(u8, u8, u8); 8] = [
    (235, 128, 128),
    (210, 16, 146),
    (170, 166, 16),
    (145, 54, 34),
    (106, 202, 222),
    (81, 90, 240),
    (41, 240, 110),
    (16, 128, 128),
];

/// Neutral value of every picture control
const NEUTRAL: i32 = 127;

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Apply the picture controls to one bar colour
fn adjust(bar: (u8, u8, u8), picture: &VideoSettings) -> (u8, u8, u8) {
    let (y, u, v) = (bar.0 as i32, bar.1 as i32, bar.2 as i32);

    let contrasted = (y - 128) * picture.contrast / NEUTRAL + 128;
    let floor = (picture.whiteness - NEUTRAL).max(0) / 2;
    let y = (contrasted + picture.brightness - NEUTRAL).max(floor);

    let u = (u - 128) * picture.colour / NEUTRAL + 128;
    let v = (v - 128) * picture.colour / NEUTRAL + 128;
    (clamp_u8(y), clamp_u8(u), clamp_u8(v))
}

/// Render frame number `index` of `format` into `out`
fn render(format: &VideoFormat, index: u64, picture: &VideoSettings, out: &mut Vec<u8>) {
    let (width, height) = (format.width as usize, format.height as usize);
    out.clear();
    out.resize(format.frame_len(&Default::default()), 0);
    if width == 0 || height == 0 {
        return;
    }

    let bar_width = (width / BARS.len()).max(1);
    let fps = format.fps.max(1) as u64;
    let shift = ((index * bar_width as u64) / fps) as usize;
    let colours: Vec<_> = BARS.iter().map(|bar| adjust(*bar, picture)).collect();
    let colour_at = |x: usize| colours[((x + shift) / bar_width) % colours.len()];

    let (luma, chroma) = out.split_at_mut(width * height);
    for row in luma.chunks_exact_mut(width) {
        for (x, px) in row.iter_mut().enumerate() {
            *px = colour_at(x).0;
        }
    }

    let (chroma_width, chroma_height) = (width / 2, height / 2);
    let plane = chroma_width * chroma_height;
    if plane == 0 {
        return;
    }
    let (u_plane, v_plane) = chroma.split_at_mut(plane);
    for (i, (u, v)) in u_plane.iter_mut().zip(v_plane.iter_mut()).enumerate() {
        let (_, cu, cv) = colour_at((i % chroma_width) * 2);
        *u = cu;
        *v = cv;
    }
}

/// State the frame path mutates
struct Generator {
    open: Option<VideoFormat>,
    pacer: Pacer,
    frame_index: u64,
    picture: VideoSettings,
    scratch: Vec<u8>,
}

pub struct TestPatternManager {
    fallback: DeviceIdentity,
    selected: bool,
    generator: Mutex<Generator>,
    events: Option<ManagerEvents<VideoSettings>>,
}

impl TestPatternManager {
    pub fn new() -> Self {
        Self {
            fallback: DeviceIdentity::fallback(MediaClass::VideoInput),
            selected: false,
            generator: Mutex::new(Generator {
                open: None,
                pacer: Pacer::new(Duration::ZERO),
                frame_index: 0,
                picture: VideoSettings::default(),
                scratch: Vec::new(),
            }),
            events: None,
        }
    }

    fn generator(&self) -> MutexGuard<'_, Generator> {
        self.generator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TestPatternManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager<VideoInput> for TestPatternManager {
    fn name(&self) -> &str {
        "test-pattern"
    }

    fn attach(&mut self, events: ManagerEvents<VideoSettings>) {
        self.events = Some(events);
    }

    fn enumerate(&self) -> Vec<DeviceIdentity> {
        vec![self.fallback.clone()]
    }

    fn select(&mut self, _lane: Lane, device: &DeviceIdentity) -> bool {
        self.selected = *device == self.fallback;
        self.selected
    }

    fn open(&mut self, lane: Lane, format: &VideoFormat) -> bool {
        if !self.selected {
            return false;
        }
        let mut generator = self.generator();
        let fps = format.fps.max(1);
        generator.pacer.set_period(Duration::from_secs(1) / fps);
        generator.frame_index = 0;
        generator.open = Some(*format);
        debug!(width = format.width, height = format.height, fps, "Test pattern started");

        if let Some(events) = &self.events {
            events.opened(lane, self.fallback.clone(), DeviceSettings::new(generator.picture, true));
        }
        true
    }

    fn close(&mut self, lane: Lane) {
        let mut generator = self.generator();
        if generator.open.take().is_none() {
            return;
        }
        generator.pacer.reset();
        if let Some(events) = &self.events {
            events.closed(lane, self.fallback.clone());
        }
    }

    fn read_frame(&self, _lane: Lane, frame: &mut [u8]) -> bool {
        let mut generator = self.generator();
        let Some(format) = generator.open else {
            frame.fill(0);
            return true;
        };
        generator.pacer.wait();

        let Generator {
            frame_index,
            picture,
            scratch,
            ..
        } = &mut *generator;
        render(&format, *frame_index, picture, scratch);
        *frame_index += 1;

        let len = frame.len().min(scratch.len());
        frame[..len].copy_from_slice(&scratch[..len]);
        frame[len..].fill(0);
        true
    }

    fn apply_settings(&self, _lane: Lane, settings: &VideoSettings) {
        debug!(?settings, "Picture controls updated");
        self.generator().picture = *settings;
    }

    fn owns(&self, source: &str, name: &str) -> Option<DeviceIdentity> {
        (self.fallback.source == source && self.fallback.name == name).then(|| self.fallback.clone())
    }
}
