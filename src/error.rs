//! Crate-level error type.
//!
//! The per-frame path never returns these: compile failures surface as absent
//! stages and bad configuration is clamped. Errors only come from loading
//! presets, audio tracks and job files, or from writing render output.

use std::path::PathBuf;

/// Result alias that carries [`SuperscopeError`].
pub type Result<T> = std::result::Result<T, SuperscopeError>;

#[derive(Debug, thiserror::Error)]
pub enum SuperscopeError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid frame buffer: {0}")]
    InvalidFrame(String),
    #[error("invalid render job: {0}")]
    InvalidJob(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl SuperscopeError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }
}

/// Read a JSON document from disk into `T`.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| SuperscopeError::read(path, e))?;
    serde_json::from_str(&content).map_err(|e| SuperscopeError::parse(path, e))
}
