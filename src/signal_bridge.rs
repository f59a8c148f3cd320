//! Bridge from the host's float audio buffers to the fixed-size signals the
//! point renderer and script engine consume.
//!
//! Two products are refreshed every update:
//! - a 576-sample linearly resampled waveform used for the `v` variable,
//! - byte-quantized legacy buffers (two channels, 576 samples each) read by
//!   the engine's `getosc`/`getspec` functions.
//!
//! Host buffers can have any length; they are resampled, never truncated.
//! Empty inputs degrade to zeros.

use crate::context::{AudioFeatures, ProcessContext};

/// Samples per channel in the legacy buffers.
pub const LEGACY_VIS_SAMPLES: usize = 576;

/// Length of the resampled waveform used by the point loop.
pub const WAVEFORM_LEN: usize = 576;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalKind {
    /// Signed -1..1 signal stored around 127.5.
    Waveform,
    /// Unsigned 0..1 magnitude stored as 0..255.
    Spectrum,
}

/// Linearly interpolate `src` at fractional position `pos`.
fn lerp_at(src: &[f32], pos: f64) -> f64 {
    let last = src.len() - 1;
    let base = (pos.floor().max(0.0) as usize).min(last);
    let next = (base + 1).min(last);
    let frac = pos - base as f64;
    let v0 = src[base] as f64;
    let v1 = src[next] as f64;
    v0 + (v1 - v0) * frac
}

/// Value of `src` at normalised position `t` in [0, 1].
fn sample_normalized(src: &[f32], t: f64) -> f64 {
    lerp_at(src, t * (src.len() - 1) as f64)
}

fn normalized_index(i: usize, count: usize) -> f64 {
    if count > 1 {
        i as f64 / (count - 1) as f64
    } else {
        0.0
    }
}

/// Resample `src` onto `dst` by linear interpolation. An empty source fills
/// `dst` with zeros.
pub fn resample_linear(src: &[f32], dst: &mut [f32]) {
    if src.is_empty() {
        dst.fill(0.0);
        return;
    }
    let count = dst.len();
    for (i, out) in dst.iter_mut().enumerate() {
        *out = sample_normalized(src, normalized_index(i, count)) as f32;
    }
}

fn quantize_channel(src: &[f32], dst: &mut [u8], kind: SignalKind) {
    if src.is_empty() {
        dst.fill(0);
        return;
    }
    let count = dst.len();
    for (i, out) in dst.iter_mut().enumerate() {
        let value = sample_normalized(src, normalized_index(i, count));
        *out = match kind {
            SignalKind::Spectrum => (value.clamp(0.0, 1.0) * 255.0).round() as u8,
            SignalKind::Waveform => (value.clamp(-1.0, 1.0) * 127.5 + 127.5).round() as u8,
        };
    }
}

/// Root mean square of `samples`, 0 for an empty slice.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let accum: f64 = samples.iter().map(|&v| v as f64 * v as f64).sum();
    (accum / samples.len() as f64).sqrt() as f32
}

/// Byte-quantized waveform and spectrum, channel 1 followed by channel 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyBuffers {
    osc: [u8; LEGACY_VIS_SAMPLES * 2],
    spec: [u8; LEGACY_VIS_SAMPLES * 2],
    channels: u8,
}

impl Default for LegacyBuffers {
    fn default() -> Self {
        Self {
            osc: [0; LEGACY_VIS_SAMPLES * 2],
            spec: [0; LEGACY_VIS_SAMPLES * 2],
            channels: 0,
        }
    }
}

impl LegacyBuffers {
    /// Re-quantize from the host buffers. When the right channel is missing,
    /// channel 2 is a copy of channel 1 and the channel count is 1.
    pub fn refresh(&mut self, audio: &AudioFeatures) {
        let (osc_l, osc_r) = self.osc.split_at_mut(LEGACY_VIS_SAMPLES);
        quantize_channel(&audio.osc_l, osc_l, SignalKind::Waveform);
        if audio.osc_r.is_empty() {
            osc_r.copy_from_slice(osc_l);
            self.channels = 1;
        } else {
            quantize_channel(&audio.osc_r, osc_r, SignalKind::Waveform);
            self.channels = 2;
        }

        let (spec_l, spec_r) = self.spec.split_at_mut(LEGACY_VIS_SAMPLES);
        quantize_channel(&audio.spec_l, spec_l, SignalKind::Spectrum);
        if audio.spec_r.is_empty() {
            spec_r.copy_from_slice(spec_l);
        } else {
            quantize_channel(&audio.spec_r, spec_r, SignalKind::Spectrum);
        }
    }

    pub fn osc(&self) -> &[u8] {
        &self.osc
    }

    pub fn spec(&self) -> &[u8] {
        &self.spec
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }
}

/// What the engine's legacy sampling functions read. Borrowed from the bridge;
/// engines copy what they need.
#[derive(Debug, Clone, Copy)]
pub struct LegacySources<'a> {
    pub osc: &'a [u8],
    pub spec: &'a [u8],
    pub sample_count: usize,
    pub channels: u8,
    pub audio_time_seconds: f64,
    pub engine_time_seconds: f64,
}

/// Legacy band-window average over byte-quantized samples.
///
/// `chan` 0 mixes both channels, 1 and 2 select one; anything else yields 0.
/// `xorv` converts the unsigned byte domain (128 for waveforms, 0 for
/// spectra).
pub fn legacy_vis_sample(
    data: &[u8],
    sample_count: usize,
    channels: u8,
    band: f64,
    bandw: f64,
    chan: i32,
    xorv: i32,
) -> f64 {
    if sample_count == 0 || data.len() < sample_count {
        return 0.0;
    }
    if chan != 0 && chan != 1 && chan != 2 {
        return 0.0;
    }
    let count = sample_count as i32;
    let mut bc = (band * count as f64) as i32;
    let mut bw = ((bandw * count as f64) as i32).max(1);
    bc -= bw / 2;
    if bc < 0 {
        bw += bc;
        bc = 0;
    }
    if bc > count - 1 {
        bc = count - 1;
    }
    if bc + bw > count {
        bw = count - bc;
    }
    if bw <= 0 {
        return 0.0;
    }

    let ch0 = &data[..sample_count];
    let ch1 = if channels > 1 && data.len() >= sample_count * 2 {
        Some(&data[sample_count..sample_count * 2])
    } else {
        None
    };
    let decode = |byte: u8| ((byte as i32 ^ xorv) - xorv) as f64;
    let window = bc as usize..(bc + bw) as usize;

    if chan == 0 {
        let scale = if channels > 1 { 255.0 } else { 127.5 };
        let denom = scale * bw as f64;
        let mut accum = 0.0;
        for x in window {
            accum += decode(ch0[x]);
            match ch1 {
                Some(right) => accum += decode(right[x]),
                None if xorv != 0 => accum += decode(ch0[x]),
                None => {}
            }
        }
        return accum / denom;
    }

    let src = match (chan, ch1) {
        (2, Some(right)) => right,
        (2, None) => return 0.0,
        _ => ch0,
    };
    let accum: f64 = window.map(|x| decode(src[x])).sum();
    accum / (127.5 * bw as f64)
}

/// Refreshes and owns the per-frame derived audio signals.
#[derive(Debug, Clone)]
pub struct LegacySignalBridge {
    waveform: [f32; WAVEFORM_LEN],
    legacy: LegacyBuffers,
    rms: f32,
    time_seconds: f64,
}

impl Default for LegacySignalBridge {
    fn default() -> Self {
        Self {
            waveform: [0.0; WAVEFORM_LEN],
            legacy: LegacyBuffers::default(),
            rms: 0.0,
            time_seconds: 0.0,
        }
    }
}

impl LegacySignalBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(&mut self, ctx: &ProcessContext<'_>) {
        let primary = ctx.audio.primary_waveform();
        self.rms = compute_rms(primary);
        resample_linear(primary, &mut self.waveform);
        self.legacy.refresh(ctx.audio);
        self.time_seconds = ctx.time.t_seconds;
    }

    pub fn waveform(&self) -> &[f32] {
        &self.waveform
    }

    /// Interpolated waveform value at normalised position `t` in [0, 1].
    pub fn sample_waveform(&self, t: f64) -> f64 {
        sample_normalized(&self.waveform, t)
    }

    pub fn rms(&self) -> f32 {
        self.rms
    }

    pub fn legacy(&self) -> &LegacyBuffers {
        &self.legacy
    }

    pub fn sources(&self) -> LegacySources<'_> {
        LegacySources {
            osc: self.legacy.osc(),
            spec: self.legacy.spec(),
            sample_count: LEGACY_VIS_SAMPLES,
            channels: self.legacy.channels(),
            audio_time_seconds: self.time_seconds,
            engine_time_seconds: self.time_seconds,
        }
    }
}
