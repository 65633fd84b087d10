//! In-memory stand-ins for the OS seams.
//!
//! The real injectors move the cursor and press keys on the machine running
//! the tests, and the real pointer sources need a desktop session. These
//! types record what they are asked to do instead, so the login script,
//! the automation lock and the calibration countdown can be checked without
//! a display.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::clock::Clock;
use crate::input_simulator::{InputEvent, InputInjector};
use crate::pointer::PointerSource;
use crate::AutoLoginError;

/// Records every injected event in order.
///
/// With [`RecordingInjector::failing_at`] the n-th call (0-based) is
/// refused and nothing is recorded for it.
#[derive(Debug, Default)]
pub struct RecordingInjector {
    events: Mutex<Vec<InputEvent>>,
    calls: AtomicUsize,
    fail_at: Option<usize>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::default()
        }
    }

    /// Events accepted so far
    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Calls made so far, including a refused one
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InputInjector for RecordingInjector {
    fn inject(&self, event: InputEvent) -> Result<(), AutoLoginError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(call) {
            return Err(AutoLoginError::Injection("mock failure".into()));
        }
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
        Ok(())
    }
}

/// Pointer parked at a settable position; counts how often it is read
#[derive(Debug)]
pub struct FixedPointer {
    position: Mutex<Option<(i32, i32)>>,
    queries: AtomicUsize,
}

impl FixedPointer {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            position: Mutex::new(Some((x, y))),
            queries: AtomicUsize::new(0),
        }
    }

    /// A pointer whose position can never be read
    pub fn unavailable() -> Self {
        Self {
            position: Mutex::new(None),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn move_to(&self, x: i32, y: i32) {
        *self.position.lock().unwrap_or_else(|p| p.into_inner()) = Some((x, y));
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl PointerSource for FixedPointer {
    fn cursor_position(&self) -> Result<(i32, i32), AutoLoginError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.position
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .ok_or_else(|| AutoLoginError::PointerQuery("mock pointer unavailable".into()))
    }
}

/// Clock that returns immediately and remembers every requested sleep
#[derive(Debug, Default)]
pub struct VirtualClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Total virtual time that has passed
    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for VirtualClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(duration);
    }
}
