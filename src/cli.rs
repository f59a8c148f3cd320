use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::render_job::{render_frames, run_job, RenderJobSpec};
use crate::preset::SuperscopePreset;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render frames to disk
    Render {
        #[command(flatten)]
        job: JobArgs,

        /// Output directory for frames and metadata.json
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print one SHA-256 per rendered frame
    Hash {
        #[command(flatten)]
        job: JobArgs,
    },
}

#[derive(Args)]
struct JobArgs {
    /// Render job JSON file. Other flags override its fields.
    #[arg(long)]
    job: Option<PathBuf>,

    /// Preset JSON file
    #[arg(long)]
    preset: Option<PathBuf>,

    /// Audio track JSON file (synthetic audio when omitted)
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Number of frames
    #[arg(long)]
    frames: Option<u64>,

    /// Frames per second
    #[arg(long)]
    fps: Option<f64>,

    /// Output width
    #[arg(long)]
    width: Option<u32>,

    /// Output height
    #[arg(long)]
    height: Option<u32>,

    /// Seed for the script rand() function
    #[arg(long)]
    seed: Option<u64>,
}

impl JobArgs {
    fn into_job(self) -> Result<RenderJobSpec> {
        let mut job = match (&self.job, &self.preset) {
            (Some(path), _) => RenderJobSpec::load(path)
                .with_context(|| format!("loading render job {:?}", path))?,
            (None, Some(preset)) => RenderJobSpec::new(preset.clone()),
            (None, None) => bail!("either --job or --preset is required"),
        };
        if let Some(preset) = self.preset {
            job.preset_path = preset;
        }
        if self.audio.is_some() {
            job.audio_path = self.audio;
        }
        if let Some(frames) = self.frames {
            job.frame_count = frames;
        }
        if let Some(fps) = self.fps {
            job.fps = fps;
        }
        if let Some(width) = self.width {
            job.width = width;
        }
        if let Some(height) = self.height {
            job.height = height;
        }
        if let Some(seed) = self.seed {
            job.seed = seed;
        }
        Ok(job)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { job, out } => {
            let mut job = job.into_job()?;
            if out.is_some() {
                job.output_dir = out;
            }
            let metadata = run_job(&job)?;
            println!(
                "Rendered {} frames in {:.2}s ({:.1} fps)",
                metadata.frame_count, metadata.render_duration_secs, metadata.average_render_fps
            );
            for warning in &metadata.warnings {
                eprintln!("warning: {}", warning);
            }
        }
        Commands::Hash { job } => {
            let job = job.into_job()?;
            job.validate()?;
            let preset = SuperscopePreset::load(&job.preset_path)?;
            let audio = job.audio_track()?;
            let output = render_frames(&preset, &audio, &job.settings(), |_, _| Ok(()))?;
            for (index, hash) in output.frame_hashes.iter().enumerate() {
                println!("{} {}", index, hash);
            }
        }
    }
    Ok(())
}
