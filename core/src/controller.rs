use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcast::{FrameBroadcaster, FrameReceiver, FrameSlot};
use crate::camera::CaptureDevice;
use crate::error::CoreError;
use crate::observer::{CameraEvent, Observer, ObserverHub};
use crate::paths::{annotation_timestamp, dir_is_writable, ChunkPathAllocator};
use crate::state::CameraState;

/// Slice the recording loop waits on the device between state checks.
pub const WAIT_SLICE: Duration = Duration::from_millis(200);
/// Pace of the live-feed capture task.
const FRAME_INTERVAL: Duration = Duration::from_millis(40);
/// Consecutive device failures tolerated before the loop gives up.
const MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Owns the lifecycle state machine, the background recording loop and the
/// live-feed capture task for one capture device.
///
/// Constructed once at startup and shared via `Arc`; HTTP handlers, the
/// indicator panel and the physical buttons all act through it.
pub struct CameraController {
    device: Arc<dyn CaptureDevice>,
    allocator: Arc<ChunkPathAllocator>,
    chunk_length: Duration,
    hub: ObserverHub,
    broadcaster: FrameBroadcaster,
    state: Mutex<CameraState>,
    output_allowed: AtomicBool,
    record_task: Mutex<Option<JoinHandle<()>>>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    // Handle to self for spawning the background loops.
    weak_self: Weak<CameraController>,
}

impl CameraController {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        allocator: Arc<ChunkPathAllocator>,
        chunk_length: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            device,
            allocator,
            chunk_length,
            hub: ObserverHub::new(),
            broadcaster: FrameBroadcaster::new(),
            state: Mutex::new(CameraState::Off),
            output_allowed: AtomicBool::new(true),
            record_task: Mutex::new(None),
            stream_task: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    pub fn state(&self) -> CameraState {
        *self.state.lock().unwrap()
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    pub fn is_real_device(&self) -> bool {
        self.device.is_real_device()
    }

    pub fn is_output_allowed(&self) -> bool {
        self.output_allowed.load(Ordering::SeqCst)
    }

    /// Sets the output-allowed gate directly, as the streaming buttons do.
    pub fn set_output_allowed(&self, allowed: bool) {
        self.output_allowed.store(allowed, Ordering::SeqCst);
        info!("output allowed set to {}", allowed);
    }

    /// Flips the output-allowed gate and returns the new value.
    pub fn toggle_output_allowed(&self) -> bool {
        let allowed = !self.output_allowed.fetch_xor(true, Ordering::SeqCst);
        info!("output allowed toggled to {}", allowed);
        allowed
    }

    pub fn recordings_base(&self) -> PathBuf {
        self.allocator.base()
    }

    pub fn can_write_recordings(&self) -> bool {
        dir_is_writable(&self.allocator.base())
    }

    /// Attaches an observer; it immediately receives the current state.
    pub fn attach_observer(&self, observer: Arc<dyn Observer>) {
        self.hub.attach(observer, self.state());
    }

    pub fn detach_observer(&self, observer: &Arc<dyn Observer>) {
        self.hub.detach(observer);
    }

    pub fn subscribe_frames(&self) -> FrameReceiver {
        self.broadcaster.subscribe()
    }

    pub fn latest_frame(&self) -> FrameSlot {
        self.broadcaster.latest()
    }

    /// Applies a transition if the table allows it, notifying observers
    /// while the state lock is held so notifications cannot reorder across
    /// transitions. Returns whether the transition was applied.
    fn transition_to(&self, next: CameraState) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.can_transition_to(next) {
            debug!("ignoring transition {:?} -> {:?}", *state, next);
            return false;
        }
        debug!("state {:?} -> {:?}", *state, next);
        *state = next;
        self.hub.notify(&CameraEvent::StateChanged(next));
        true
    }

    /// `Off -> Idle`: acquires the device and starts the live-feed capture
    /// task. No-op from any other state.
    pub async fn open(&self) -> Result<(), CoreError> {
        if self.state() != CameraState::Off {
            return Ok(());
        }
        self.device.open().await?;
        self.transition_to(CameraState::Idle);
        self.spawn_stream_task();
        Ok(())
    }

    /// `any -> Off`: best-effort stop of an outstanding recording, then
    /// releases the device. Never fails from the caller's perspective.
    pub async fn close(&self) {
        self.stop_recording();
        self.device.close().await;

        let mut state = self.state.lock().unwrap();
        if *state != CameraState::Off {
            // Forced release bypasses the table; the recording and
            // streaming loops exit on their next state check.
            debug!("state {:?} -> Off (close)", *state);
            *state = CameraState::Off;
            self.hub.notify(&CameraEvent::StateChanged(CameraState::Off));
        }
    }

    /// `Idle -> Recording`: spawns the recording loop. No-op from any
    /// other state, including when already recording.
    pub fn start_recording(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != CameraState::Idle {
                debug!("start_recording ignored in state {:?}", *state);
                return;
            }
            *state = CameraState::Recording;
            self.hub
                .notify(&CameraEvent::StateChanged(CameraState::Recording));
        }
        info!("start recording");

        let Some(controller) = self.weak_self.upgrade() else {
            return;
        };
        let handle = tokio::spawn(async move { controller.record_loop().await });
        *self.record_task.lock().unwrap() = Some(handle);
    }

    /// `Recording -> StoppingRecord`: signals the recording loop to finish
    /// its current chunk and exit; the loop itself completes the final
    /// transition to `Idle`. Returns whether a stop was actually initiated.
    pub fn stop_recording(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != CameraState::Recording {
            return false;
        }
        *state = CameraState::StoppingRecord;
        self.hub
            .notify(&CameraEvent::StateChanged(CameraState::StoppingRecord));
        drop(state);
        info!("stop recording requested");
        true
    }

    /// Whether the background recording loop is still running.
    pub fn recording_loop_active(&self) -> bool {
        self.record_task
            .lock()
            .unwrap()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn spawn_stream_task(&self) {
        let Some(controller) = self.weak_self.upgrade() else {
            return;
        };
        let handle = tokio::spawn(async move {
            loop {
                if controller.state() == CameraState::Off {
                    break;
                }
                match controller.device.capture_frame().await {
                    Ok(frame) => controller.broadcaster.publish(frame),
                    Err(e) => debug!("frame capture failed: {}", e),
                }
                tokio::time::sleep(FRAME_INTERVAL).await;
            }
            debug!("streaming task exited");
        });
        *self.stream_task.lock().unwrap() = Some(handle);
    }

    async fn record_loop(self: Arc<Self>) {
        let mut session = match self.allocator.new_session() {
            Ok(dir) => dir,
            Err(e) => {
                error!("cannot begin recording session: {}", e);
                self.finish_recording();
                return;
            }
        };
        let first_chunk = self.allocator.next_chunk_path(&session);
        if let Err(e) = self.device.start_recording(&first_chunk).await {
            error!("device failed to start recording: {}", e);
            self.finish_recording();
            return;
        }
        info!("recording into {}", first_chunk.display());

        let mut elapsed = Duration::ZERO;
        let mut recovery_attempts = 0u32;
        while self.state() == CameraState::Recording {
            match self.record_slice(&mut session, &mut elapsed).await {
                Ok(()) => recovery_attempts = 0,
                Err(e) if e.is_storage_unavailable() => {
                    error!("no writable recording location left: {}", e);
                    break;
                }
                Err(e) => {
                    recovery_attempts += 1;
                    warn!(
                        "device error while recording (attempt {}): {}",
                        recovery_attempts, e
                    );
                    if recovery_attempts > MAX_RECOVERY_ATTEMPTS {
                        error!("giving up after repeated device errors");
                        break;
                    }
                    // Transient driver faults: stop defensively, then pick
                    // the recording back up in a fresh chunk.
                    if let Err(e) = self.device.stop_recording().await {
                        debug!("defensive stop failed: {}", e);
                    }
                    let chunk = self.allocator.next_chunk_path(&session);
                    if let Err(e) = self.device.start_recording(&chunk).await {
                        warn!("recovery restart failed: {}", e);
                    }
                    elapsed = Duration::ZERO;
                }
            }
        }

        if let Err(e) = self.device.stop_recording().await {
            warn!("device stop failed: {}", e);
        }
        self.finish_recording();
        info!("recording loop exited");
    }

    /// One wait slice: keep the device recording, refresh the timestamp
    /// annotation and rotate to a new chunk once enough time accumulated.
    async fn record_slice(
        &self,
        session: &mut PathBuf,
        elapsed: &mut Duration,
    ) -> Result<(), CoreError> {
        self.device.wait(WAIT_SLICE).await?;
        if let Err(e) = self.device.annotate(&annotation_timestamp()).await {
            debug!("annotate failed: {}", e);
        }

        *elapsed += WAIT_SLICE;
        if *elapsed < self.chunk_length {
            return Ok(());
        }
        *elapsed = Duration::ZERO;

        if !dir_is_writable(session) {
            warn!(
                "session directory {} no longer writable, reselecting base",
                session.display()
            );
            self.allocator.reselect_base()?;
            *session = self.allocator.new_session()?;
        }

        let chunk = self.allocator.next_chunk_path(session);
        self.device.split_recording(&chunk).await?;
        debug!("rotated to chunk {}", chunk.display());
        // Self-transition so observers see each rotation.
        self.transition_to(CameraState::Recording);
        Ok(())
    }

    /// Tail of the state machine, owned by the recording loop: a stop (or
    /// loop abort) settles in `Idle`; after a close the device stays `Off`.
    fn finish_recording(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == CameraState::Recording {
            *state = CameraState::StoppingRecord;
            self.hub
                .notify(&CameraEvent::StateChanged(CameraState::StoppingRecord));
        }
        if *state == CameraState::StoppingRecord {
            *state = CameraState::Idle;
            self.hub.notify(&CameraEvent::StateChanged(CameraState::Idle));
        }
    }
}
