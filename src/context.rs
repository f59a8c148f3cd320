//! Per-frame inputs handed to the runtime by the host.

use serde::{Deserialize, Serialize};

use crate::raster::FrameBuffer;

/// Output frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Frame timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingInfo {
    /// Seconds since the preset was loaded.
    pub t_seconds: f64,
    pub frame_index: u64,
    pub dt_seconds: f64,
}

impl Default for TimingInfo {
    fn default() -> Self {
        Self {
            t_seconds: 0.0,
            frame_index: 0,
            dt_seconds: 1.0 / 60.0,
        }
    }
}

impl TimingInfo {
    /// Timing for frame `frame_index` at a fixed frame rate.
    pub fn at_frame(frame_index: u64, fps: f64) -> Self {
        let dt = if fps > 0.0 { 1.0 / fps } else { 0.0 };
        Self {
            t_seconds: frame_index as f64 * dt,
            frame_index,
            dt_seconds: dt,
        }
    }
}

/// One frame's worth of analysed audio.
///
/// Waveforms are in -1..1, spectra unit-scaled; either may have any length,
/// including zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioFeatures {
    pub osc_l: Vec<f32>,
    pub osc_r: Vec<f32>,
    pub spec_l: Vec<f32>,
    pub spec_r: Vec<f32>,
    pub beat: bool,
    pub bass: f32,
    pub mid: f32,
    pub treb: f32,
}

impl AudioFeatures {
    /// The waveform channel used for point sampling: left, or right when left
    /// is empty.
    pub fn primary_waveform(&self) -> &[f32] {
        if self.osc_l.is_empty() {
            &self.osc_r
        } else {
            &self.osc_l
        }
    }
}

/// Timing plus audio for one update.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    pub time: TimingInfo,
    pub audio: &'a AudioFeatures,
}

impl<'a> ProcessContext<'a> {
    pub fn new(time: TimingInfo, audio: &'a AudioFeatures) -> Self {
        Self { time, audio }
    }
}

/// The images a render pass works on. `current` is written in place;
/// `previous` is the last frame and is absent on the first one.
pub struct FrameBuffers<'a> {
    pub current: &'a mut FrameBuffer,
    pub previous: Option<&'a FrameBuffer>,
}

impl<'a> FrameBuffers<'a> {
    pub fn new(current: &'a mut FrameBuffer, previous: Option<&'a FrameBuffer>) -> Self {
        Self { current, previous }
    }
}
