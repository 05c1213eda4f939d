use serde::{Deserialize, Serialize};

/// Lifecycle state of the capture device.
///
/// The only legal transitions are:
/// `Off -> Idle`, `Idle -> Recording`, `Idle -> Off`,
/// `Recording -> Recording` (chunk rotation), `Recording -> StoppingRecord`
/// and `StoppingRecord -> Idle`. Anything else is silently ignored by the
/// controller rather than reported as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraState {
    Off,
    Idle,
    Recording,
    StoppingRecord,
}

impl CameraState {
    pub fn can_transition_to(self, next: CameraState) -> bool {
        use CameraState::*;
        matches!(
            (self, next),
            (Off, Idle)
                | (Idle, Recording)
                | (Idle, Off)
                | (Recording, Recording)
                | (Recording, StoppingRecord)
                | (StoppingRecord, Idle)
        )
    }

    pub fn is_recording(self) -> bool {
        self == CameraState::Recording
    }

    pub fn is_idle(self) -> bool {
        self == CameraState::Idle
    }
}
