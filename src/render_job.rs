//! Render job specification, offline rendering and render metadata.
//!
//! A job renders a preset against an audio track (loaded or synthetic) into
//! a sequence of frames, using a double buffer so each frame sees the one
//! before it. Every frame is hashed (SHA-256 over the packed RGBA rows) so
//! renders can be compared against golden hashes.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::audio_track::{AudioTrack, SyntheticAudio};
use crate::context::{FrameBuffers, FrameSize, ProcessContext, TimingInfo};
use crate::error::{read_json, Result, SuperscopeError};
use crate::preset::SuperscopePreset;
use crate::raster::FrameBuffer;
use crate::rhai_engine::RhaiScriptEngine;
use crate::superscope::Superscope;

/// Default FPS for rendering.
fn default_fps() -> f64 {
    60.0
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_frame_count() -> u64 {
    120
}

/// Specification for a single render job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJobSpec {
    /// Path to the preset JSON file.
    pub preset_path: PathBuf,

    /// Path to an audio track JSON file. None renders synthetic audio.
    #[serde(default)]
    pub audio_path: Option<PathBuf>,

    /// Output directory for frames and metadata. None renders hashes only.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_frame_count")]
    pub frame_count: u64,

    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Seed for the script `rand()` function.
    #[serde(default)]
    pub seed: u64,

    /// Synthetic audio settings, used when `audio_path` is None.
    #[serde(default)]
    pub synthetic: SyntheticAudio,
}

impl RenderJobSpec {
    /// Create a new render job spec with required fields only.
    pub fn new(preset_path: PathBuf) -> Self {
        Self {
            preset_path,
            audio_path: None,
            output_dir: None,
            width: default_width(),
            height: default_height(),
            frame_count: default_frame_count(),
            fps: default_fps(),
            seed: 0,
            synthetic: SyntheticAudio::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    /// Validate the job specification.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(SuperscopeError::InvalidJob(msg)) };
        if !self.preset_path.exists() {
            return invalid(format!("Preset file not found: {:?}", self.preset_path));
        }
        if let Some(audio) = &self.audio_path {
            if !audio.exists() {
                return invalid(format!("Audio file not found: {:?}", audio));
            }
        }
        if self.fps.is_nan() || self.fps <= 0.0 {
            return invalid("FPS must be positive".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return invalid("Width and height must be positive".to_string());
        }
        if self.frame_count == 0 {
            return invalid("Frame count must be positive".to_string());
        }
        Ok(())
    }

    pub fn settings(&self) -> RenderSettings {
        RenderSettings {
            size: FrameSize::new(self.width, self.height),
            frame_count: self.frame_count,
            fps: self.fps,
            seed: self.seed,
        }
    }

    /// The job's audio: the loaded track, or synthetic audio of the job's
    /// length.
    pub fn audio_track(&self) -> Result<AudioTrack> {
        match &self.audio_path {
            Some(path) => AudioTrack::load(path),
            None => Ok(AudioTrack::synthetic(self.frame_count, &self.synthetic)),
        }
    }
}

/// Frame geometry and timing for [`render_frames`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub size: FrameSize,
    pub frame_count: u64,
    pub fps: f64,
    pub seed: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            size: FrameSize::default(),
            frame_count: default_frame_count(),
            fps: default_fps(),
            seed: 0,
        }
    }
}

/// Result of [`render_frames`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutput {
    /// Hex SHA-256 of each frame, in order.
    pub frame_hashes: Vec<String>,
    /// Distinct script problems reported during the render.
    pub warnings: Vec<String>,
}

/// SHA-256 (hex) of the visible pixels, independent of row stride.
pub fn frame_hash(frame: &FrameBuffer) -> String {
    let mut hasher = Sha256::new();
    for row in frame.rows() {
        hasher.update(row);
    }
    format!("{:x}", hasher.finalize())
}

/// Render `settings.frame_count` frames of `preset` against `audio`.
///
/// `on_frame` sees every finished frame before the next one starts; an error
/// from it stops the render.
pub fn render_frames<F>(
    preset: &SuperscopePreset,
    audio: &AudioTrack,
    settings: &RenderSettings,
    mut on_frame: F,
) -> Result<RenderOutput>
where
    F: FnMut(u64, &FrameBuffer) -> Result<()>,
{
    let FrameSize { width, height } = settings.size;
    let mut scope = Superscope::new(RhaiScriptEngine::with_seed(settings.seed));
    scope.init(settings.size);
    scope.set_scripts(preset.scripts.clone());
    scope.set_overrides(preset.overrides);

    let mut output = RenderOutput::default();
    let mut current = FrameBuffer::new(width, height);
    let mut previous = FrameBuffer::new(width, height);

    for index in 0..settings.frame_count {
        let time = TimingInfo::at_frame(index, settings.fps);
        scope.update(&ProcessContext::new(time, audio.frame(index)));

        let last = (index > 0).then_some(&previous);
        let stats = scope.render(FrameBuffers::new(&mut current, last));
        log::trace!("Frame {}: {} points, {} drawn", index, stats.points, stats.drawn);

        for diagnostic in scope.engine_mut().take_diagnostics() {
            let warning = format!("{:?}: {}", diagnostic.kind, diagnostic.message);
            if !output.warnings.contains(&warning) {
                log::warn!("Frame {}: {}", index, warning);
                output.warnings.push(warning);
            }
        }

        output.frame_hashes.push(frame_hash(&current));
        on_frame(index, &current)?;
        std::mem::swap(&mut current, &mut previous);
    }

    Ok(output)
}

/// Render a validated job, writing PNG frames and `metadata.json` when the
/// job has an output directory.
pub fn run_job(job: &RenderJobSpec) -> Result<RenderMetadata> {
    job.validate()?;
    let started_at = Utc::now();
    let clock = Instant::now();

    let preset = SuperscopePreset::load(&job.preset_path)?;
    let audio = job.audio_track()?;

    if let Some(dir) = &job.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    log::info!(
        "Rendering {} frames at {}x{} ({} fps)",
        job.frame_count,
        job.width,
        job.height,
        job.fps
    );

    let output = render_frames(&preset, &audio, &job.settings(), |index, frame| {
        if let Some(dir) = &job.output_dir {
            let image = frame.to_rgba_image().ok_or_else(|| {
                SuperscopeError::InvalidFrame(format!("frame {} has no pixel data", index))
            })?;
            image.save(dir.join(format!("frame_{:05}.png", index)))?;
        }
        if index % 60 == 0 {
            log::info!("Rendered frame {}/{}", index + 1, job.frame_count);
        }
        Ok(())
    })?;

    let elapsed = clock.elapsed().as_secs_f64();
    let frame_count = output.frame_hashes.len();
    let metadata = RenderMetadata {
        job: job.clone(),
        started_at,
        completed_at: Utc::now(),
        render_duration_secs: elapsed,
        frame_count,
        average_render_fps: if elapsed > 0.0 {
            frame_count as f64 / elapsed
        } else {
            0.0
        },
        preset_hash: RenderMetadata::hash_file(&job.preset_path)?,
        audio_hash: job
            .audio_path
            .as_deref()
            .map(RenderMetadata::hash_file)
            .transpose()?,
        superscope_version: env!("CARGO_PKG_VERSION").to_string(),
        frame_hashes: output.frame_hashes,
        warnings: output.warnings,
    };

    if let Some(dir) = &job.output_dir {
        metadata.save(&dir.join("metadata.json"))?;
    }
    Ok(metadata)
}

/// Metadata for a completed render.
/// Written as metadata.json alongside rendered frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMetadata {
    /// The job specification used.
    pub job: RenderJobSpec,

    /// Timestamp when render started (ISO 8601).
    pub started_at: DateTime<Utc>,

    /// Timestamp when render completed (ISO 8601).
    pub completed_at: DateTime<Utc>,

    /// Total render duration in seconds.
    pub render_duration_secs: f64,

    /// Total frames rendered.
    pub frame_count: usize,

    /// Average rendering FPS (frames / render_duration).
    pub average_render_fps: f64,

    /// SHA-256 hash of the preset file.
    pub preset_hash: String,

    /// SHA-256 hash of the audio file, if one was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_hash: Option<String>,

    pub superscope_version: String,

    /// SHA-256 of every rendered frame.
    pub frame_hashes: Vec<String>,

    /// Any warnings or issues during render.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RenderMetadata {
    /// Compute SHA-256 hash of file content.
    pub fn hash_file(path: &Path) -> Result<String> {
        use std::io::Read;

        let mut file = std::fs::File::open(path).map_err(|e| SuperscopeError::read(path, e))?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
