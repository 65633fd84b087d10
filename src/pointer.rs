//! Live pointer position for calibration

use std::sync::{Arc, Mutex};
use std::thread;

use rdev::{listen, Event, EventType};
use tracing::{debug, error, info};

use crate::config::InputBackend;
use crate::x11::X11PointerSource;
use crate::AutoLoginError;

/// Reads the current pointer position in absolute screen pixels
pub trait PointerSource: Send + Sync {
    fn cursor_position(&self) -> Result<(i32, i32), AutoLoginError>;
}

/// Create the pointer source for the configured backend
pub fn create_pointer_source(
    backend: InputBackend,
) -> Result<Box<dyn PointerSource>, AutoLoginError> {
    match backend {
        InputBackend::X11 => Ok(Box::new(X11PointerSource::connect()?)),
        InputBackend::Rdev => Ok(Box::new(PointerTracker::start())),
    }
}

/// Tracks the pointer by listening to global mouse-move events.
///
/// rdev has no direct position query, so the last reported position is
/// kept. Nothing is known until the pointer moves once after start.
pub struct PointerTracker {
    last: Arc<Mutex<Option<(f64, f64)>>>,
}

impl PointerTracker {
    /// Start listening in a background thread
    pub fn start() -> Self {
        let last = Arc::new(Mutex::new(None));
        let shared = Arc::clone(&last);

        thread::spawn(move || {
            info!("Pointer tracker started");

            let callback = move |event: Event| {
                if let EventType::MouseMove { x, y } = event.event_type {
                    let mut slot = shared.lock().unwrap_or_else(|p| p.into_inner());
                    *slot = Some((x, y));
                }
            };

            if let Err(e) = listen(callback) {
                error!("Error in pointer listener: {:?}", e);
            }
        });

        Self { last }
    }
}

impl PointerSource for PointerTracker {
    fn cursor_position(&self) -> Result<(i32, i32), AutoLoginError> {
        let last = *self.last.lock().unwrap_or_else(|p| p.into_inner());
        match last {
            Some((x, y)) => {
                debug!("Tracked pointer at ({}, {})", x, y);
                Ok((x.round() as i32, y.round() as i32))
            }
            None => Err(AutoLoginError::PointerQuery(
                "pointer has not moved since tracking started".to_string(),
            )),
        }
    }
}
