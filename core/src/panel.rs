use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::error::CoreError;
use crate::observer::{CameraEvent, Observer};
use crate::state::CameraState;

/// Measurement name to value, as read from the sensor panel.
pub type Measurements = BTreeMap<String, Value>;

/// An RGB color on the indicator matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Indicator color for each lifecycle state.
pub fn state_color(state: CameraState) -> Rgb {
    match state {
        CameraState::Off => Rgb(0, 0, 0),
        CameraState::Idle => Rgb(0, 0, 25),
        CameraState::Recording => Rgb(0, 25, 0),
        CameraState::StoppingRecord => Rgb(25, 25, 0),
    }
}

/// Actions bound to the panel's physical buttons. On the real hardware
/// the joystick directions map to these, one direction per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelButton {
    StartRecording,
    StopRecording,
    StartStreaming,
    StopStreaming,
}

/// Callback invoked by the panel whenever a button fires.
pub type ButtonHandler = Box<dyn Fn(PanelButton) + Send + Sync>;

/// Interface to the physical indicator/sensor panel. The actual hardware
/// wrapper lives outside this crate.
pub trait SensorPanel: Send + Sync {
    /// Paints the indicator matrix in one color.
    fn display(&self, color: Rgb);

    /// Reads the current sensor measurements.
    fn read_measurements(&self) -> Measurements;

    /// Binds the physical buttons to `handler`. Replaces any previously
    /// registered handler.
    fn register_buttons(&self, handler: ButtonHandler);
}

/// Panel stub: remembers the last displayed color and serves a canned CPU
/// temperature reading, like the fallback used on machines without the
/// sensor hat. Button presses are simulated through [`MockPanel::press`].
pub struct MockPanel {
    last_color: Mutex<Option<Rgb>>,
    buttons: Mutex<Option<ButtonHandler>>,
}

impl MockPanel {
    pub fn new() -> Self {
        Self {
            last_color: Mutex::new(None),
            buttons: Mutex::new(None),
        }
    }

    pub fn last_color(&self) -> Option<Rgb> {
        *self.last_color.lock().unwrap()
    }

    /// Fires a button press at the registered handler. Presses before
    /// registration are dropped, as on the real hardware.
    pub fn press(&self, button: PanelButton) {
        if let Some(handler) = self.buttons.lock().unwrap().as_ref() {
            handler(button);
        }
    }
}

impl Default for MockPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPanel for MockPanel {
    fn display(&self, color: Rgb) {
        debug!("panel color set to {:?}", color);
        *self.last_color.lock().unwrap() = Some(color);
    }

    fn read_measurements(&self) -> Measurements {
        let mut values = Measurements::new();
        values.insert("Temperature (Chip)".into(), Value::from("42.0 'C"));
        values
    }

    fn register_buttons(&self, handler: ButtonHandler) {
        *self.buttons.lock().unwrap() = Some(handler);
    }
}

/// Observer keeping the indicator in sync with the camera state.
pub struct PanelObserver {
    panel: Arc<dyn SensorPanel>,
}

impl PanelObserver {
    pub fn new(panel: Arc<dyn SensorPanel>) -> Self {
        Self { panel }
    }
}

impl Observer for PanelObserver {
    fn update(&self, event: &CameraEvent) -> Result<(), CoreError> {
        match event {
            CameraEvent::StateChanged(state) | CameraEvent::Attached(state) => {
                self.panel.display(state_color(*state));
            }
            CameraEvent::Detached => self.panel.display(state_color(CameraState::Off)),
        }
        Ok(())
    }
}
