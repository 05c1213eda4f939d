use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::CoreError;

/// Interface to the physical capture device.
///
/// The real hardware driver lives outside this crate; implementations are
/// swapped in at construction time. All recording operations take the full
/// target path, minted by the path allocator.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquires the hardware resource.
    async fn open(&self) -> Result<(), CoreError>;

    /// Releases the hardware resource. Best-effort: failures are the
    /// implementation's to log, never the caller's to handle.
    async fn close(&self);

    /// Begins recording into a new file at `path`.
    async fn start_recording(&self, path: &Path) -> Result<(), CoreError>;

    /// Rolls the open recording over to a new file without dropping frames.
    async fn split_recording(&self, path: &Path) -> Result<(), CoreError>;

    /// Finishes the current recording.
    async fn stop_recording(&self) -> Result<(), CoreError>;

    /// Blocks for `duration` while the device keeps recording, surfacing
    /// any encoder error that happened in the meantime.
    async fn wait(&self, duration: Duration) -> Result<(), CoreError>;

    /// Burns `text` into the outgoing frames. Best-effort.
    async fn annotate(&self, text: &str) -> Result<(), CoreError>;

    /// Captures one encoded frame for the live feed.
    async fn capture_frame(&self) -> Result<Bytes, CoreError>;

    /// Whether this is real hardware rather than a stub.
    fn is_real_device(&self) -> bool;
}

#[derive(Default)]
struct MockCameraInner {
    recording_path: Option<PathBuf>,
    chunks: Vec<PathBuf>,
}

/// In-memory stand-in for the hardware driver.
///
/// Recording operations create empty chunk files on disk so the on-disk
/// layout can be asserted in tests; `capture_frame` emits small synthetic
/// JPEG-framed buffers with a running counter.
pub struct MockCamera {
    open: AtomicBool,
    inner: Mutex<MockCameraInner>,
    start_calls: AtomicU64,
    frame_counter: AtomicU64,
    fail_next_split: AtomicBool,
}

impl MockCamera {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            inner: Mutex::new(MockCameraInner::default()),
            start_calls: AtomicU64::new(0),
            frame_counter: AtomicU64::new(0),
            fail_next_split: AtomicBool::new(false),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// How many times `start_recording` succeeded.
    pub fn start_call_count(&self) -> u64 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Every chunk path a recording was started or split into.
    pub fn chunk_paths(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().chunks.clone()
    }

    /// Makes the next `split_recording` call fail once, imitating the
    /// transient encoder errors the real driver throws under load.
    pub fn fail_next_split(&self) {
        self.fail_next_split.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::Camera("device is not open".into()))
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for MockCamera {
    async fn open(&self) -> Result<(), CoreError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.inner.lock().unwrap().recording_path = None;
    }

    async fn start_recording(&self, path: &Path) -> Result<(), CoreError> {
        self.ensure_open()?;
        fs::write(path, b"")?;
        let mut inner = self.inner.lock().unwrap();
        inner.recording_path = Some(path.to_path_buf());
        inner.chunks.push(path.to_path_buf());
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn split_recording(&self, path: &Path) -> Result<(), CoreError> {
        self.ensure_open()?;
        if self.fail_next_split.swap(false, Ordering::SeqCst) {
            return Err(CoreError::Camera("injected split failure".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.recording_path.is_none() {
            return Err(CoreError::Camera("split without active recording".into()));
        }
        fs::write(path, b"")?;
        inner.recording_path = Some(path.to_path_buf());
        inner.chunks.push(path.to_path_buf());
        Ok(())
    }

    async fn stop_recording(&self) -> Result<(), CoreError> {
        self.inner.lock().unwrap().recording_path = None;
        Ok(())
    }

    async fn wait(&self, duration: Duration) -> Result<(), CoreError> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn annotate(&self, text: &str) -> Result<(), CoreError> {
        debug!("mock annotate: {}", text);
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Bytes, CoreError> {
        self.ensure_open()?;
        let n = self.frame_counter.fetch_add(1, Ordering::SeqCst);
        // JPEG start/end markers around a counter payload, enough for the
        // multipart framing and for tests to tell frames apart.
        let mut frame = Vec::with_capacity(12);
        frame.extend_from_slice(&[0xff, 0xd8]);
        frame.extend_from_slice(&n.to_be_bytes());
        frame.extend_from_slice(&[0xff, 0xd9]);
        Ok(Bytes::from(frame))
    }

    fn is_real_device(&self) -> bool {
        false
    }
}
