//! Per-frame audio features for offline rendering.
//!
//! A track is either loaded from JSON (an array of [`AudioFeatures`] objects,
//! one per frame) or generated synthetically so renders are reproducible
//! without an analyzer in the loop.

use std::f32::consts::TAU;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::AudioFeatures;
use crate::error::{read_json, Result};
use crate::signal_bridge::LEGACY_VIS_SAMPLES;

static SILENCE: AudioFeatures = AudioFeatures {
    osc_l: Vec::new(),
    osc_r: Vec::new(),
    spec_l: Vec::new(),
    spec_r: Vec::new(),
    beat: false,
    bass: 0.0,
    mid: 0.0,
    treb: 0.0,
};

fn default_samples() -> usize {
    LEGACY_VIS_SAMPLES
}

fn default_beat_period() -> u64 {
    30
}

fn default_cycles() -> f32 {
    2.0
}

fn default_amplitude() -> f32 {
    0.8
}

/// Parameters of the generated test signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticAudio {
    /// Samples per waveform and spectrum channel.
    #[serde(default = "default_samples")]
    pub samples: usize,
    /// A beat fires on every frame divisible by this. 0 disables beats.
    #[serde(default = "default_beat_period")]
    pub beat_period: u64,
    /// Sine periods across one waveform.
    #[serde(default = "default_cycles")]
    pub cycles: f32,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

impl Default for SyntheticAudio {
    fn default() -> Self {
        Self {
            samples: default_samples(),
            beat_period: default_beat_period(),
            cycles: default_cycles(),
            amplitude: default_amplitude(),
        }
    }
}

impl SyntheticAudio {
    /// Deterministic features for frame `index`.
    pub fn frame(&self, index: u64) -> AudioFeatures {
        let len = self.samples;
        let phase = index as f32 * 0.1;
        let pulse = 0.6 + 0.4 * (phase * 0.5).sin();

        let position = |k: usize| k as f32 / len.max(1) as f32;
        let osc_l = (0..len)
            .map(|k| self.amplitude * (TAU * self.cycles * position(k) + phase).sin())
            .collect();
        let osc_r = (0..len)
            .map(|k| self.amplitude * (TAU * self.cycles * position(k) + phase).cos())
            .collect();
        let spec_l: Vec<f32> = (0..len)
            .map(|k| (-4.0 * position(k)).exp() * pulse)
            .collect();
        let spec_r = spec_l.iter().map(|v| v * 0.9).collect();

        let band = |from: f32, to: f32| -> f32 {
            let start = (from * len as f32) as usize;
            let end = ((to * len as f32) as usize).max(start + 1).min(len);
            if start >= end {
                return 0.0;
            }
            spec_l[start..end].iter().sum::<f32>() / (end - start) as f32
        };
        let (bass, mid, treb) = (band(0.0, 0.1), band(0.1, 0.5), band(0.5, 1.0));

        AudioFeatures {
            osc_l,
            osc_r,
            spec_l,
            spec_r,
            beat: self.beat_period > 0 && index % self.beat_period == 0,
            bass,
            mid,
            treb,
        }
    }
}

/// A sequence of per-frame audio features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioTrack {
    frames: Vec<AudioFeatures>,
}

impl AudioTrack {
    pub fn new(frames: Vec<AudioFeatures>) -> Self {
        Self { frames }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let track: Self = read_json(path)?;
        log::info!("Loaded {} audio frames from {:?}", track.len(), path);
        Ok(track)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Generate `frame_count` frames of synthetic audio.
    pub fn synthetic(frame_count: u64, params: &SyntheticAudio) -> Self {
        Self {
            frames: (0..frame_count).map(|i| params.frame(i)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Features for frame `index`, wrapping around the end of the track.
    /// An empty track is silent.
    pub fn frame(&self, index: u64) -> &AudioFeatures {
        if self.frames.is_empty() {
            return &SILENCE;
        }
        &self.frames[(index % self.frames.len() as u64) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_track_is_silent() {
        let track = AudioTrack::default();
        assert!(track.is_empty());
        let frame = track.frame(42);
        assert!(frame.osc_l.is_empty());
        assert!(!frame.beat);
    }

    #[test]
    fn test_frames_wrap_around() {
        let track = AudioTrack::new(vec![
            AudioFeatures {
                bass: 1.0,
                ..Default::default()
            },
            AudioFeatures {
                bass: 2.0,
                ..Default::default()
            },
        ]);
        assert_eq!(track.frame(0).bass, 1.0);
        assert_eq!(track.frame(3).bass, 2.0);
        assert_eq!(track.frame(4).bass, 1.0);
    }

    #[test]
    fn test_synthetic_is_deterministic() {
        let params = SyntheticAudio::default();
        let a = AudioTrack::synthetic(10, &params);
        let b = AudioTrack::synthetic(10, &params);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert_eq!(a.frame(0).osc_l.len(), LEGACY_VIS_SAMPLES);
    }

    #[test]
    fn test_synthetic_beats_and_bands() {
        let params = SyntheticAudio {
            beat_period: 4,
            ..Default::default()
        };
        let beats: Vec<bool> = (0..9).map(|i| params.frame(i).beat).collect();
        assert_eq!(
            beats,
            vec![true, false, false, false, true, false, false, false, true]
        );
        let frame = params.frame(1);
        assert!(frame.bass > frame.mid && frame.mid > frame.treb);
        assert!(frame.osc_l.iter().all(|v| v.abs() <= params.amplitude + 1e-6));

        let no_beats = SyntheticAudio {
            beat_period: 0,
            ..Default::default()
        };
        assert!(!no_beats.frame(0).beat);
    }

    #[test]
    fn test_parses_json_array() {
        let track: AudioTrack =
            serde_json::from_str(r#"[{ "oscL": [0.0, 1.0], "beat": true }, { "bass": 0.5 }]"#).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.frame(0).osc_l, vec![0.0, 1.0]);
        assert!(track.frame(0).beat);
        assert_eq!(track.frame(1).bass, 0.5);
    }
}
