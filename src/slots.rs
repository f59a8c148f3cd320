//! The canonical variables shared between the host and the scripts.
//!
//! Each name is registered once with the engine and remembered as an
//! optional [`SlotId`]; the hot per-point path then addresses slots by
//! [`Var`] through a fixed-size array. A name the engine refused to register
//! reads as absent and swallows writes, so default behaviour still applies.

use crate::script_engine::{ScriptEngine, SlotId};

/// Canonical script variables, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    Time,
    Frame,
    Bass,
    Mid,
    Treb,
    Rms,
    Beat,
    /// Alias of `beat` kept for legacy presets.
    B,
    N,
    I,
    V,
    W,
    H,
    Skip,
    LineSize,
    DrawMode,
    X,
    Y,
    Red,
    Green,
    Blue,
}

impl Var {
    pub const ALL: [Var; 21] = [
        Var::Time,
        Var::Frame,
        Var::Bass,
        Var::Mid,
        Var::Treb,
        Var::Rms,
        Var::Beat,
        Var::B,
        Var::N,
        Var::I,
        Var::V,
        Var::W,
        Var::H,
        Var::Skip,
        Var::LineSize,
        Var::DrawMode,
        Var::X,
        Var::Y,
        Var::Red,
        Var::Green,
        Var::Blue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Var::Time => "time",
            Var::Frame => "frame",
            Var::Bass => "bass",
            Var::Mid => "mid",
            Var::Treb => "treb",
            Var::Rms => "rms",
            Var::Beat => "beat",
            Var::B => "b",
            Var::N => "n",
            Var::I => "i",
            Var::V => "v",
            Var::W => "w",
            Var::H => "h",
            Var::Skip => "skip",
            Var::LineSize => "linesize",
            Var::DrawMode => "drawmode",
            Var::X => "x",
            Var::Y => "y",
            Var::Red => "red",
            Var::Green => "green",
            Var::Blue => "blue",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Registered slot ids for every canonical variable.
#[derive(Debug, Clone, Default)]
pub struct RegisteredSlots {
    ids: [Option<SlotId>; Var::ALL.len()],
}

impl RegisteredSlots {
    /// Register every canonical name with `engine`. Safe to call repeatedly.
    pub fn register<E: ScriptEngine>(engine: &mut E) -> Self {
        let mut slots = Self::default();
        for var in Var::ALL {
            let id = engine.register_slot(var.name());
            if id.is_none() {
                log::warn!("Script variable '{}' could not be registered; it will read as unset", var.name());
            }
            slots.ids[var.index()] = id;
        }
        slots
    }

    pub fn id(&self, var: Var) -> Option<SlotId> {
        self.ids[var.index()]
    }

    pub fn is_registered(&self, var: Var) -> bool {
        self.id(var).is_some()
    }

    /// Current value, `None` when the variable is unregistered.
    pub fn get<E: ScriptEngine>(&self, engine: &E, var: Var) -> Option<f64> {
        self.id(var).map(|id| engine.slot(id))
    }

    /// Write a value; a no-op when the variable is unregistered.
    pub fn set<E: ScriptEngine>(&self, engine: &mut E, var: Var, value: f64) {
        if let Some(id) = self.id(var) {
            engine.set_slot(id, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhai_engine::RhaiScriptEngine;

    #[test]
    fn test_names_are_unique_and_ordered() {
        let mut names: Vec<&str> = Var::ALL.iter().map(|v| v.name()).collect();
        assert_eq!(names[0], "time");
        assert_eq!(names[20], "blue");
        for (i, var) in Var::ALL.iter().enumerate() {
            assert_eq!(var.index(), i);
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Var::ALL.len());
    }

    #[test]
    fn test_register_all_and_access() {
        let mut engine = RhaiScriptEngine::new();
        let slots = RegisteredSlots::register(&mut engine);
        assert!(Var::ALL.iter().all(|&v| slots.is_registered(v)));
        slots.set(&mut engine, Var::LineSize, 3.0);
        assert_eq!(slots.get(&engine, Var::LineSize), Some(3.0));
        // Registering again yields the same ids.
        let again = RegisteredSlots::register(&mut engine);
        assert_eq!(again.id(Var::LineSize), slots.id(Var::LineSize));
    }

    #[test]
    fn test_unregistered_reads_none_and_ignores_writes() {
        let mut engine = RhaiScriptEngine::new();
        let slots = RegisteredSlots::default();
        slots.set(&mut engine, Var::X, 1.0);
        assert_eq!(slots.get(&engine, Var::X), None);
    }
}
