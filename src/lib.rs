pub mod error;
pub mod context;
pub mod preset;

// Rendering core
pub mod raster;
pub mod signal_bridge;
pub mod slots;
pub mod stages;
pub mod superscope;

// Script engine
pub mod script_engine;
pub mod rhai_engine;
pub mod script_log;
pub mod script_diagnostics;

// Offline rendering
pub mod audio_track;
pub mod render_job;
pub mod cli;

pub use context::{AudioFeatures, FrameBuffers, FrameSize, ProcessContext, TimingInfo};
pub use error::{Result, SuperscopeError};
pub use preset::{Overrides, ScriptSet, SuperscopePreset};
pub use raster::{ColorRgba8, FrameBuffer};
pub use rhai_engine::RhaiScriptEngine;
pub use script_engine::{ScriptEngine, ScriptError, SlotId};
pub use superscope::{FrameStats, Superscope};
