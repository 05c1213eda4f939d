pub mod broadcast;
pub mod camera;
pub mod controller;
pub mod error;
pub mod observer;
pub mod panel;
pub mod paths;
pub mod state;

// Re-export commonly used types
pub use broadcast::{FrameBroadcaster, FrameReceiver, FrameSlot};
pub use camera::{CaptureDevice, MockCamera};
pub use controller::CameraController;
pub use error::CoreError;
pub use observer::{CameraEvent, Observer, ObserverHub};
pub use panel::{ButtonHandler, MockPanel, PanelButton, PanelObserver, SensorPanel};
pub use paths::ChunkPathAllocator;
pub use state::CameraState;

#[cfg(test)]
mod controller_test;
