//! Script stage lifecycle: source text, lazy compilation and the once-only
//! setup stage.
//!
//! The lifecycle is a three-state machine:
//!
//! ```text
//!   Uncompiled --ensure_compiled--> PendingSetup --run_setup--> Ready
//!        ^                                                        |
//!        +------------------------ set_scripts -------------------+
//! ```
//!
//! Any edit returns to `Uncompiled`, which forces both a recompile and a
//! fresh setup run.

use crate::preset::ScriptSet;
use crate::script_engine::{ScriptEngine, ScriptError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Setup,
    Frame,
    Beat,
    Point,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Setup, Stage::Frame, Stage::Beat, Stage::Point];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Frame => "frame",
            Stage::Beat => "beat",
            Stage::Point => "point",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn source(self, scripts: &ScriptSet) -> &str {
        match self {
            Stage::Setup => &scripts.setup,
            Stage::Frame => &scripts.frame,
            Stage::Beat => &scripts.beat,
            Stage::Point => &scripts.point,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Source changed since the last compile.
    Uncompiled,
    /// Compiled; the setup stage has not run yet.
    PendingSetup,
    /// Compiled and set up.
    Ready,
}

/// Owns the four stage sources and their compiled programs.
pub struct ScriptStageManager<E: ScriptEngine> {
    scripts: ScriptSet,
    state: StageState,
    programs: [Option<E::Program>; 4],
    /// Runtime errors per stage since the last compile.
    runtime_errors: [u64; 4],
    compile_count: u64,
}

impl<E: ScriptEngine> Default for ScriptStageManager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ScriptEngine> ScriptStageManager<E> {
    pub fn new() -> Self {
        Self {
            scripts: ScriptSet::default(),
            state: StageState::Uncompiled,
            programs: [None, None, None, None],
            runtime_errors: [0; 4],
            compile_count: 0,
        }
    }

    /// Replace all four sources. Compilation is deferred to the next
    /// [`ensure_compiled`](Self::ensure_compiled).
    pub fn set_scripts(&mut self, scripts: ScriptSet) {
        self.scripts = scripts;
        self.state = StageState::Uncompiled;
    }

    pub fn scripts(&self) -> &ScriptSet {
        &self.scripts
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state == StageState::Uncompiled
    }

    /// Number of times the stages have been (re)compiled.
    pub fn compile_count(&self) -> u64 {
        self.compile_count
    }

    pub fn has(&self, stage: Stage) -> bool {
        self.programs[stage.index()].is_some()
    }

    pub fn runtime_errors(&self, stage: Stage) -> u64 {
        self.runtime_errors[stage.index()]
    }

    /// Recompile every stage if the sources changed. Returns true when a
    /// compile happened.
    ///
    /// A stage that fails to compile is left without a program and simply
    /// does not run; the other stages are unaffected.
    pub fn ensure_compiled(&mut self, engine: &mut E) -> bool {
        if self.state != StageState::Uncompiled {
            return false;
        }
        // Release the old programs before compiling their replacements.
        self.programs = [None, None, None, None];
        self.runtime_errors = [0; 4];

        for stage in Stage::ALL {
            let source = stage.source(&self.scripts);
            if source.trim().is_empty() {
                continue;
            }
            match engine.compile(source) {
                Ok(program) => self.programs[stage.index()] = Some(program),
                Err(err) => {
                    log::warn!("{} script failed to compile: {}", stage.name(), err);
                }
            }
        }

        self.compile_count += 1;
        self.state = StageState::PendingSetup;
        log::debug!(
            "Compiled script stages (setup={}, frame={}, beat={}, point={})",
            self.has(Stage::Setup),
            self.has(Stage::Frame),
            self.has(Stage::Beat),
            self.has(Stage::Point)
        );
        true
    }

    /// Run the setup stage if it has not run since the last compile.
    pub fn run_setup_once(&mut self, engine: &mut E) -> bool {
        if self.state != StageState::PendingSetup {
            return false;
        }
        self.run(engine, Stage::Setup);
        self.state = StageState::Ready;
        true
    }

    /// Ask for the setup stage to run again without recompiling.
    pub fn request_setup(&mut self) {
        if self.state == StageState::Ready {
            self.state = StageState::PendingSetup;
        }
    }

    /// Execute one stage. Returns false when the stage has no program.
    pub fn run(&mut self, engine: &mut E, stage: Stage) -> bool {
        let result = match &self.programs[stage.index()] {
            Some(program) => engine.execute(program),
            None => return false,
        };
        if let Err(err) = result {
            self.note_runtime_error(stage, &err);
        }
        true
    }

    fn note_runtime_error(&mut self, stage: Stage, err: &ScriptError) {
        let count = &mut self.runtime_errors[stage.index()];
        *count += 1;
        if *count == 1 {
            log::warn!("{} script error: {}", stage.name(), err);
        } else {
            log::trace!("{} script error #{}: {}", stage.name(), count, err);
        }
    }
}
