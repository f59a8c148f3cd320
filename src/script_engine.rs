//! The contract between the point renderer and an expression-script engine.
//!
//! The engine owns the numeric storage behind every registered variable; the
//! host addresses it through [`SlotId`]s handed out at registration, so the
//! per-point path never looks variables up by name. Compiled programs are
//! owned values: dropping one releases whatever the engine allocated for it.

use crate::script_diagnostics::ScriptDiagnostic;
use crate::signal_bridge::LegacySources;

/// Index of a registered variable in an engine's slot storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
    #[error("compile failed: {}", .0.message)]
    Compile(ScriptDiagnostic),
    #[error("runtime error: {}", .0.message)]
    Runtime(ScriptDiagnostic),
}

impl ScriptError {
    pub fn diagnostic(&self) -> &ScriptDiagnostic {
        match self {
            ScriptError::Compile(d) | ScriptError::Runtime(d) => d,
        }
    }
}

pub trait ScriptEngine {
    /// A compiled program. Dropping it frees the engine-side resources.
    type Program;

    /// Register (or look up) a numeric variable. Idempotent per name; `None`
    /// when the name is invalid or the engine has no room left.
    fn register_slot(&mut self, name: &str) -> Option<SlotId>;

    fn compile(&mut self, source: &str) -> Result<Self::Program, ScriptError>;

    /// Run a program to completion. Its only side effects are on registered
    /// variables and engine-internal state.
    fn execute(&mut self, program: &Self::Program) -> Result<(), ScriptError>;

    fn slot(&self, id: SlotId) -> f64;

    fn set_slot(&mut self, id: SlotId, value: f64);

    /// Latest audio data for the legacy sampling functions.
    fn set_legacy_sources(&mut self, sources: &LegacySources<'_>);

    /// Called once at the start of each render pass.
    fn begin_frame(&mut self) {}
}
