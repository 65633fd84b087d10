//! Calibration of login field positions
//!
//! The operator arms a field, moves the pointer over it during a short
//! countdown, and the pointer position at zero becomes that field's
//! coordinate. A session owns the coordinate set it edits and never saves
//! it; the caller decides whether to persist the result.
//!
//! ```text
//! Idle --arm(F)--> Arming(F) --> CountingDown(N) --tick--> ... --tick--> Captured(F) --> Idle
//! ```
//!
//! Once armed, a countdown always runs to the capture.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::coordinates::{Coordinate, CoordinateField, LoginCoordinateSet};
use crate::pointer::PointerSource;
use crate::AutoLoginError;

/// Ticks before the capture when nothing else is configured
pub const DEFAULT_COUNTDOWN_TICKS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    Arming(CoordinateField),
    CountingDown {
        field: CoordinateField,
        remaining: u32,
    },
    Captured(CoordinateField),
}

/// Result of advancing the countdown by one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Still counting; this many ticks remain
    Remaining(u32),
    /// The pointer was sampled and written to the field
    Captured {
        field: CoordinateField,
        coordinate: Coordinate,
    },
}

/// One operator calibration session over a coordinate set
#[derive(Debug)]
pub struct CalibrationSession {
    coords: LoginCoordinateSet,
    state: CalibrationState,
    countdown_ticks: u32,
}

impl CalibrationSession {
    pub fn new(coords: LoginCoordinateSet) -> Self {
        Self {
            coords,
            state: CalibrationState::Idle,
            countdown_ticks: DEFAULT_COUNTDOWN_TICKS,
        }
    }

    /// Use a different countdown length (at least one tick)
    pub fn with_countdown(mut self, ticks: u32) -> Self {
        self.countdown_ticks = ticks.max(1);
        self
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn coordinates(&self) -> &LoginCoordinateSet {
        &self.coords
    }

    /// End the session and hand back the (possibly updated) set
    pub fn into_coordinates(self) -> LoginCoordinateSet {
        self.coords
    }

    /// Arm `field` and start the countdown.
    ///
    /// Rejected while another countdown is running.
    pub fn arm(&mut self, field: CoordinateField) -> Result<(), AutoLoginError> {
        if self.state != CalibrationState::Idle {
            return Err(AutoLoginError::CalibrationBusy);
        }

        self.state = CalibrationState::Arming(field);
        debug!("Armed {} field", field);
        self.state = CalibrationState::CountingDown {
            field,
            remaining: self.countdown_ticks,
        };
        Ok(())
    }

    /// Advance the countdown by one tick; the last tick samples the pointer.
    ///
    /// If the pointer cannot be read the field is left as it was and the
    /// session goes back to idle.
    pub fn tick(&mut self, pointer: &dyn PointerSource) -> Result<Tick, AutoLoginError> {
        let CalibrationState::CountingDown { field, remaining } = self.state else {
            return Err(AutoLoginError::NotArmed);
        };

        let remaining = remaining.saturating_sub(1);
        if remaining > 0 {
            self.state = CalibrationState::CountingDown { field, remaining };
            return Ok(Tick::Remaining(remaining));
        }

        let (x, y) = match pointer.cursor_position() {
            Ok(position) => position,
            Err(e) => {
                error!("Failed to capture {} position: {}", field, e);
                self.state = CalibrationState::Idle;
                return Err(e);
            }
        };

        self.coords.set_position(field, x, y);
        self.state = CalibrationState::Captured(field);
        let coordinate = self.coords.get(field).clone();
        info!("Captured {}", coordinate);

        self.state = CalibrationState::Idle;
        Ok(Tick::Captured { field, coordinate })
    }

    /// Arm `field` and run its countdown to the capture, waiting `interval`
    /// on `clock` before each tick.
    ///
    /// `on_tick` sees the number of ticks left, starting with the full count.
    pub fn run_countdown(
        &mut self,
        field: CoordinateField,
        clock: &dyn Clock,
        interval: Duration,
        pointer: &dyn PointerSource,
        mut on_tick: impl FnMut(u32),
    ) -> Result<Coordinate, AutoLoginError> {
        self.arm(field)?;
        on_tick(self.countdown_ticks);

        loop {
            clock.sleep(interval);
            match self.tick(pointer)? {
                Tick::Remaining(n) => on_tick(n),
                Tick::Captured { coordinate, .. } => return Ok(coordinate),
            }
        }
    }
}
