//! Host-facing configuration: the four script stages and the overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{read_json, Result};

/// Source text for the four script stages. Empty text means "no stage".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptSet {
    /// Runs once after each (re)compile.
    #[serde(alias = "init")]
    pub setup: String,
    /// Runs every frame.
    #[serde(alias = "perFrame")]
    pub frame: String,
    /// Runs on frames where a beat is pending.
    #[serde(alias = "onBeat")]
    pub beat: String,
    /// Runs once per point.
    #[serde(alias = "perPoint")]
    pub point: String,
}

impl ScriptSet {
    pub fn new(
        setup: impl Into<String>,
        frame: impl Into<String>,
        beat: impl Into<String>,
        point: impl Into<String>,
    ) -> Self {
        Self {
            setup: setup.into(),
            frame: frame.into(),
            beat: beat.into(),
            point: point.into(),
        }
    }

    /// Only a per-point script.
    pub fn point_only(point: impl Into<String>) -> Self {
        Self {
            point: point.into(),
            ..Default::default()
        }
    }
}

/// Host-supplied values that win over whatever the scripts set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Overrides {
    pub points: Option<i32>,
    pub thickness: Option<f32>,
    /// `true` connects consecutive points with lines.
    pub line_mode: Option<bool>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.points.is_none() && self.thickness.is_none() && self.line_mode.is_none()
    }
}

/// A complete point-renderer preset as stored on disk (JSON).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuperscopePreset {
    pub name: Option<String>,
    pub scripts: ScriptSet,
    #[serde(skip_serializing_if = "Overrides::is_empty")]
    pub overrides: Overrides,
}

impl SuperscopePreset {
    pub fn load(path: &Path) -> Result<Self> {
        let preset: Self = read_json(path)?;
        log::info!(
            "Loaded preset {:?} from {:?}",
            preset.name.as_deref().unwrap_or("unnamed"),
            path
        );
        Ok(preset)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
