pub mod pages;
pub mod server;

// Re-export commonly used types
pub use server::create_app;

use std::sync::Arc;

use campi_core::{CameraController, SensorPanel};

/// Image served on the MJPEG endpoint while the output-allowed gate is off.
pub const PLACEHOLDER_JPEG: &[u8] = include_bytes!("../assets/placeholder.jpg");

/// Obscurity-based default for the output-allowed toggle path.
pub const DEFAULT_TOGGLE_TOKEN: &str =
    "/96LTVesGktcbD7QfB8w74huCWdQQCeyHJhDAD9VHEhWnLuWDzc7aEQjeseuMe4pG";

pub type AppState = Arc<AppContext>;

/// Everything the HTTP handlers need, constructed once at startup.
pub struct AppContext {
    pub controller: Arc<CameraController>,
    pub panel: Arc<dyn SensorPanel>,
    /// Request path that toggles the output-allowed gate.
    pub toggle_token: String,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("state", &self.controller.state())
            .field("panel", &"<dyn SensorPanel>")
            .finish()
    }
}
