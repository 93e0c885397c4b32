//! CLI command implementations.

pub mod check_config;
pub mod compare;
pub mod replay;

use std::path::Path;
use thiserror::Error;

/// Errors raised while loading command input.
#[derive(Error, Debug)]
pub enum InputError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid JSON of the expected shape.
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        /// File path.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Reads and deserializes a JSON file.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| InputError::Read {
        path: display.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| InputError::Parse {
        path: display,
        source,
    })
}
