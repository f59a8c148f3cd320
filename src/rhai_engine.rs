//! Rhai implementation of [`ScriptEngine`].
//!
//! Each registered slot is a shared value held by both the engine and the Rhai
//! scope, so the host reads and writes it without name lookups and scripts see
//! it as an ordinary numeric variable:
//!
//! ```rhai
//! x = i * 2.0 - 1.0;
//! y = v * 0.5;
//! red = bass; green = mid; blue = treb;
//! ```
//!
//! Top-level `let` declarations outlive the execution that made them, which
//! gives scripts the legacy model of one shared set of globals across all
//! stages and points. Re-declaring an existing name updates it in place.
//!
//! Built-in functions:
//! - `getosc(band, width, channel)` / `getspec(band, width, channel)` - legacy
//!   band averages over the current frame's waveform / spectrum
//! - `gettime(start)` - audio time (`-1` seconds, `-2` milliseconds) or
//!   seconds elapsed since `start`
//! - `rand()`, `clamp(x, lo, hi)`, `smooth(prev, x, amount)`
//! - `megabuf[i]` (per engine) and `gmegabuf[i]` (process wide) scratch arrays

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Mutex, OnceLock};

use rhai::{Dynamic, Engine, Scope, AST, FLOAT, INT};

use crate::script_diagnostics::{from_eval_error, from_parse_error, ScriptDiagnostic};
use crate::script_engine::{ScriptEngine, ScriptError, SlotId};
use crate::script_log;
use crate::signal_bridge::{legacy_vis_sample, LegacySources};

/// Most variables a single engine will register.
pub const MAX_SLOTS: usize = 64;

/// Bounded so a script failing on every point cannot grow memory.
const MAX_DIAGNOSTICS: usize = 32;

const MEGABUF_BLOCKS: usize = 64;
const MEGABUF_BLOCK_ITEMS: usize = 16384;
/// Addressable entries in `megabuf` and `gmegabuf`.
pub const MEGABUF_LEN: usize = MEGABUF_BLOCKS * MEGABUF_BLOCK_ITEMS;

/// Names the engine reserves for its own scope variables.
const RESERVED_NAMES: [&str; 2] = ["megabuf", "gmegabuf"];

/// Numeric view of a script value. Booleans read as 1/0.
pub fn dynamic_to_f64(value: &Dynamic) -> Option<f64> {
    if let Ok(f) = value.as_float() {
        return Some(f);
    }
    if let Ok(i) = value.as_int() {
        return Some(i as f64);
    }
    if let Ok(b) = value.as_bool() {
        return Some(if b { 1.0 } else { 0.0 });
    }
    None
}

fn number(value: &Dynamic) -> f64 {
    dynamic_to_f64(value).unwrap_or(0.0)
}

/// Lazily allocated scratch memory addressed like the legacy megabuf.
#[derive(Debug)]
struct MegaBlocks {
    blocks: Vec<Option<Box<[f64]>>>,
}

impl Default for MegaBlocks {
    fn default() -> Self {
        Self {
            blocks: vec![None; MEGABUF_BLOCKS],
        }
    }
}

impl MegaBlocks {
    fn locate(index: i64) -> Option<(usize, usize)> {
        if index < 0 || index as usize >= MEGABUF_LEN {
            return None;
        }
        let index = index as usize;
        Some((index / MEGABUF_BLOCK_ITEMS, index % MEGABUF_BLOCK_ITEMS))
    }

    fn get(&self, index: i64) -> f64 {
        match Self::locate(index) {
            Some((block, item)) => self.blocks[block].as_ref().map_or(0.0, |b| b[item]),
            None => 0.0,
        }
    }

    fn set(&mut self, index: i64, value: f64) {
        if let Some((block, item)) = Self::locate(index) {
            let block = self.blocks[block]
                .get_or_insert_with(|| vec![0.0; MEGABUF_BLOCK_ITEMS].into_boxed_slice());
            block[item] = value;
        }
    }
}

static GLOBAL_MEGABUF: OnceLock<Mutex<MegaBlocks>> = OnceLock::new();

fn with_global_megabuf<R>(f: impl FnOnce(&mut MegaBlocks) -> R) -> R {
    let lock = GLOBAL_MEGABUF.get_or_init(|| Mutex::new(MegaBlocks::default()));
    let mut blocks = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut blocks)
}

trait MegaAccess {
    fn read(&self, index: i64) -> f64;
    fn write(&self, index: i64, value: f64);
}

/// `megabuf`: private to one engine.
#[derive(Debug, Clone, Default)]
struct MegaBuf(Rc<RefCell<MegaBlocks>>);

impl MegaAccess for MegaBuf {
    fn read(&self, index: i64) -> f64 {
        self.0.borrow().get(index)
    }

    fn write(&self, index: i64, value: f64) {
        self.0.borrow_mut().set(index, value);
    }
}

/// `gmegabuf`: shared by every engine in the process.
#[derive(Debug, Clone, Copy, Default)]
struct GlobalMegaBuf;

impl MegaAccess for GlobalMegaBuf {
    fn read(&self, index: i64) -> f64 {
        with_global_megabuf(|b| b.get(index))
    }

    fn write(&self, index: i64, value: f64) {
        with_global_megabuf(|b| b.set(index, value));
    }
}

fn float_index(index: FLOAT) -> i64 {
    (index + 0.0001).floor() as i64
}

fn register_megabuf<T: MegaAccess + Clone + 'static>(engine: &mut Engine, name: &str) {
    engine
        .register_type_with_name::<T>(name)
        .register_indexer_get(|buf: &mut T, index: INT| -> FLOAT { buf.read(index) })
        .register_indexer_get(|buf: &mut T, index: FLOAT| -> FLOAT {
            buf.read(float_index(index))
        })
        .register_indexer_set(|buf: &mut T, index: INT, value: FLOAT| buf.write(index, value))
        .register_indexer_set(|buf: &mut T, index: INT, value: INT| {
            buf.write(index, value as f64)
        })
        .register_indexer_set(|buf: &mut T, index: FLOAT, value: FLOAT| {
            buf.write(float_index(index), value)
        })
        .register_indexer_set(|buf: &mut T, index: FLOAT, value: INT| {
            buf.write(float_index(index), value as f64)
        });
}

/// Copy of the bridge's legacy buffers, read by `getosc`/`getspec`/`gettime`.
#[derive(Debug, Default)]
struct LegacyState {
    osc: Vec<u8>,
    spec: Vec<u8>,
    sample_count: usize,
    channels: u8,
    audio_time_seconds: f64,
    engine_time_seconds: f64,
}

impl LegacyState {
    fn osc(&self, band: f64, bandw: f64, chan: f64) -> f64 {
        legacy_vis_sample(
            &self.osc,
            self.sample_count,
            self.channels,
            band,
            bandw,
            chan as i32,
            128,
        )
    }

    fn spec(&self, band: f64, bandw: f64, chan: f64) -> f64 {
        0.5 * legacy_vis_sample(
            &self.spec,
            self.sample_count,
            self.channels,
            band,
            bandw,
            chan as i32,
            0,
        )
    }

    fn time(&self, start: f64) -> f64 {
        if start == -1.0 {
            self.audio_time_seconds
        } else if start == -2.0 {
            self.audio_time_seconds * 1000.0
        } else {
            self.engine_time_seconds - start
        }
    }
}

struct Slot {
    name: String,
    value: f64,
    cell: Dynamic,
}

impl Slot {
    fn store(&mut self, value: f64) {
        self.value = value;
        if let Some(mut guard) = self.cell.write_lock::<Dynamic>() {
            *guard = Dynamic::from_float(value);
        }
    }

    /// Pick up what the last execution wrote. Non-numeric writes keep the
    /// previous value.
    fn sync(&mut self) {
        match dynamic_to_f64(&self.cell.flatten_clone()) {
            Some(value) => self.value = value,
            None => self.store(self.value),
        }
    }
}

/// A compiled Rhai script.
#[derive(Debug, Clone)]
pub struct RhaiProgram {
    ast: AST,
}

pub struct RhaiScriptEngine {
    engine: Engine,
    scope: Scope<'static>,
    slots: Vec<Slot>,
    legacy: Rc<RefCell<LegacyState>>,
    diagnostics: Vec<ScriptDiagnostic>,
}

impl Default for RhaiScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RhaiScriptEngine {
    /// Create a new engine with sandboxed settings and a deterministic `rand()`.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    pub fn with_seed(seed: u64) -> Self {
        let mut engine = Engine::new();

        // Sandbox settings
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(64);
        engine.set_max_operations(100_000); // Prevent infinite loops
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(500);

        script_log::install(&mut engine);

        let legacy = Rc::new(RefCell::new(LegacyState::default()));

        let osc = legacy.clone();
        engine.register_fn(
            "getosc",
            move |band: Dynamic, bandw: Dynamic, chan: Dynamic| -> FLOAT {
                osc.borrow().osc(number(&band), number(&bandw), number(&chan))
            },
        );
        let spec = legacy.clone();
        engine.register_fn(
            "getspec",
            move |band: Dynamic, bandw: Dynamic, chan: Dynamic| -> FLOAT {
                spec.borrow().spec(number(&band), number(&bandw), number(&chan))
            },
        );
        let time = legacy.clone();
        engine.register_fn("gettime", move |start: Dynamic| -> FLOAT {
            time.borrow().time(number(&start))
        });

        let rng = Rc::new(RefCell::new(fastrand::Rng::with_seed(seed)));
        engine.register_fn("rand", move || -> FLOAT { rng.borrow_mut().f64() });
        engine.register_fn(
            "clamp",
            |x: Dynamic, lo: Dynamic, hi: Dynamic| -> FLOAT {
                let (lo, hi) = (number(&lo), number(&hi));
                let mut v = number(&x);
                if v < lo {
                    v = lo;
                }
                if v > hi {
                    v = hi;
                }
                v
            },
        );
        engine.register_fn(
            "smooth",
            |prev: Dynamic, x: Dynamic, amount: Dynamic| -> FLOAT {
                let prev = number(&prev);
                prev + (number(&x) - prev) * number(&amount)
            },
        );

        register_megabuf::<MegaBuf>(&mut engine, "MegaBuf");
        register_megabuf::<GlobalMegaBuf>(&mut engine, "GlobalMegaBuf");

        let mut scope = Scope::new();
        scope.push("megabuf", MegaBuf::default());
        scope.push("gmegabuf", GlobalMegaBuf);

        Self {
            engine,
            scope,
            slots: Vec::new(),
            legacy,
            diagnostics: Vec::new(),
        }
    }

    fn push_diagnostic(&mut self, diag: ScriptDiagnostic) {
        self.diagnostics.push(diag);
        if self.diagnostics.len() > MAX_DIAGNOSTICS {
            let excess = self.diagnostics.len() - MAX_DIAGNOSTICS;
            self.diagnostics.drain(0..excess);
        }
    }

    /// Most recent compile and runtime problems, oldest first.
    pub fn diagnostics(&self) -> &[ScriptDiagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<ScriptDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Value of a script global (registered or `let`-declared) by name.
    pub fn variable(&self, name: &str) -> Option<f64> {
        if let Some(slot) = self.slots.iter().find(|s| s.name == name) {
            return Some(slot.value);
        }
        self.scope
            .get_value::<Dynamic>(name)
            .and_then(|v| dynamic_to_f64(&v))
    }

    fn is_valid_name(&self, name: &str) -> bool {
        if RESERVED_NAMES.contains(&name) {
            return false;
        }
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
        // Rejects keywords.
        self.engine.compile(format!("let {name} = 0.0;")).is_ok()
    }


    /// Keep variables declared during the last execution, folding
    /// re-declarations of existing names back into the original entry.
    fn retain_declarations(&mut self, mark: usize) {
        if self.scope.len() <= mark {
            return;
        }
        let declared: Vec<(String, bool, Dynamic)> = self
            .scope
            .iter()
            .skip(mark)
            .map(|(name, is_const, value)| (name.to_string(), is_const, value))
            .collect();
        self.scope.rewind(mark);
        for (name, is_const, value) in declared {
            if let Some(slot) = self.slots.iter_mut().find(|s| s.name == name) {
                if let Some(value) = dynamic_to_f64(&value) {
                    slot.store(value);
                }
                continue;
            }
            match self.scope.is_constant(&name) {
                Some(false) => {
                    self.scope.set_value(name, value);
                }
                Some(true) => {}
                None if is_const => {
                    self.scope.push_constant_dynamic(name, value);
                }
                None => {
                    self.scope.push_dynamic(name, value);
                }
            }
        }
    }
}

impl ScriptEngine for RhaiScriptEngine {
    type Program = RhaiProgram;

    fn register_slot(&mut self, name: &str) -> Option<SlotId> {
        if let Some(index) = self.slots.iter().position(|s| s.name == name) {
            return Some(SlotId(index));
        }
        if self.slots.len() >= MAX_SLOTS {
            log::warn!("Slot capacity ({}) exhausted, cannot register '{}'", MAX_SLOTS, name);
            return None;
        }
        if !self.is_valid_name(name) {
            log::warn!("Cannot register '{}': not a valid variable name", name);
            return None;
        }
        let value = self
            .scope
            .get_value::<Dynamic>(name)
            .and_then(|v| dynamic_to_f64(&v))
            .unwrap_or(0.0);
        let cell = Dynamic::from_float(value).into_shared();
        match self.scope.get_mut(name) {
            Some(entry) => *entry = cell.clone(),
            None => {
                self.scope.push_dynamic(name.to_string(), cell.clone());
            }
        }
        self.slots.push(Slot {
            name: name.to_string(),
            value,
            cell,
        });
        Some(SlotId(self.slots.len() - 1))
    }

    fn compile(&mut self, source: &str) -> Result<RhaiProgram, ScriptError> {
        match self.engine.compile(source) {
            Ok(ast) => Ok(RhaiProgram { ast }),
            Err(e) => {
                let diag = from_parse_error(&e);
                self.push_diagnostic(diag.clone());
                Err(ScriptError::Compile(diag))
            }
        }
    }

    fn execute(&mut self, program: &RhaiProgram) -> Result<(), ScriptError> {
        let mark = self.scope.len();
        let result = self.engine.run_ast_with_scope(&mut self.scope, &program.ast);
        self.retain_declarations(mark);

        for slot in &mut self.slots {
            slot.sync();
        }

        result.map_err(|e| {
            let diag = from_eval_error(&e);
            self.push_diagnostic(diag.clone());
            ScriptError::Runtime(diag)
        })
    }

    fn slot(&self, id: SlotId) -> f64 {
        self.slots.get(id.0).map_or(0.0, |s| s.value)
    }

    fn set_slot(&mut self, id: SlotId, value: f64) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.store(value);
        }
    }

    fn set_legacy_sources(&mut self, sources: &LegacySources<'_>) {
        let mut legacy = self.legacy.borrow_mut();
        legacy.osc.clear();
        legacy.osc.extend_from_slice(sources.osc);
        legacy.spec.clear();
        legacy.spec.extend_from_slice(sources.spec);
        legacy.sample_count = sources.sample_count;
        legacy.channels = sources.channels;
        legacy.audio_time_seconds = sources.audio_time_seconds;
        legacy.engine_time_seconds = sources.engine_time_seconds;
    }

    fn begin_frame(&mut self) {
        script_log::reset_frame_log_count();
    }
}
