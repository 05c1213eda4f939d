use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Local;
use tracing::{info, warn};

use crate::error::CoreError;

/// Timestamp format used for session directories and chunk files.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";
/// Timestamp format used for on-frame annotations.
pub const ANNOTATION_TIMESTAMP_FORMAT: &str = "%d-%m-%Y (%H:%M:%S)";
/// Extension of the raw video chunks produced by the capture device.
pub const CHUNK_EXTENSION: &str = "h264";
/// Last-resort base directory when every candidate fails the write probe.
pub const FALLBACK_BASE: &str = "./recordings";

const PROBE_FILE_NAME: &str = ".write_access_probe";
const PROBE_CONTENT: &[u8] = b"assert can write";

pub fn file_timestamp() -> String {
    Local::now().format(FILE_TIMESTAMP_FORMAT).to_string()
}

pub fn annotation_timestamp() -> String {
    Local::now().format(ANNOTATION_TIMESTAMP_FORMAT).to_string()
}

/// Probes a directory by creating it and writing, reading back and removing
/// a small marker file.
pub fn dir_is_writable(path: &Path) -> bool {
    if fs::create_dir_all(path).is_err() {
        return false;
    }
    let probe = path.join(PROBE_FILE_NAME);
    if fs::write(&probe, PROBE_CONTENT).is_err() {
        return false;
    }
    let ok = fs::read(&probe)
        .map(|content| content == PROBE_CONTENT)
        .unwrap_or(false);
    let _ = fs::remove_file(&probe);
    ok
}

/// Picks a writable base directory, creates dated session directories and
/// mints chunk file paths on demand.
///
/// Chunk filenames carry a monotonic counter after the second-granularity
/// timestamp so that rotations landing in the same second get distinct
/// paths.
pub struct ChunkPathAllocator {
    candidates: Vec<PathBuf>,
    fallback: PathBuf,
    base: Mutex<PathBuf>,
    sequence: AtomicU64,
}

impl ChunkPathAllocator {
    /// Selects a writable base among `candidates`, falling back to
    /// [`FALLBACK_BASE`].
    pub fn new(candidates: Vec<PathBuf>) -> Result<Self, CoreError> {
        Self::with_fallback(candidates, PathBuf::from(FALLBACK_BASE))
    }

    pub fn with_fallback(candidates: Vec<PathBuf>, fallback: PathBuf) -> Result<Self, CoreError> {
        let base = Self::select_writable_base(&candidates, &fallback)?;
        info!("selected recording base: {}", base.display());
        Ok(Self {
            candidates,
            fallback,
            base: Mutex::new(base),
            sequence: AtomicU64::new(0),
        })
    }

    fn select_writable_base(candidates: &[PathBuf], fallback: &Path) -> Result<PathBuf, CoreError> {
        for candidate in candidates {
            if dir_is_writable(candidate) {
                return Ok(candidate.clone());
            }
            warn!(
                "recording location {} failed the write probe, trying next",
                candidate.display()
            );
        }
        if dir_is_writable(fallback) {
            return Ok(fallback.to_path_buf());
        }
        Err(CoreError::StorageUnavailable {
            fallback: fallback.to_path_buf(),
        })
    }

    /// The currently selected base directory.
    pub fn base(&self) -> PathBuf {
        self.base.lock().unwrap().clone()
    }

    /// Re-runs base selection, e.g. after the current base became
    /// unwritable mid-session.
    pub fn reselect_base(&self) -> Result<PathBuf, CoreError> {
        let base = Self::select_writable_base(&self.candidates, &self.fallback)?;
        warn!("recording base reselected: {}", base.display());
        *self.base.lock().unwrap() = base.clone();
        Ok(base)
    }

    /// Creates `base/<timestamp>` for a new recording session.
    pub fn new_session(&self) -> Result<PathBuf, CoreError> {
        let session = self.base().join(file_timestamp());
        fs::create_dir_all(&session)?;
        Ok(session)
    }

    /// Mints `session/<timestamp>_<seq>.h264`. Never touches the disk;
    /// the capture device creates the file when recording into it.
    pub fn next_chunk_path(&self, session: &Path) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        session.join(format!("{}_{:04}.{}", file_timestamp(), seq, CHUNK_EXTENSION))
    }
}
