use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the recording and streaming core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No candidate base directory and not even the fallback path accept
    /// writes. Recording must not start in this condition.
    #[error("no writable recording location (fallback {} included)", .fallback.display())]
    StorageUnavailable { fallback: PathBuf },

    /// The capture device rejected or failed an operation.
    #[error("camera device error: {0}")]
    Camera(String),

    /// The indicator/sensor panel rejected or failed an operation.
    #[error("sensor panel error: {0}")]
    Panel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, CoreError::StorageUnavailable { .. })
    }
}
