//! Time source for countdowns and replay delays

use std::thread;
use std::time::Duration;

/// Something that can suspend the current thread for a while.
///
/// Every fixed delay in the crate goes through this trait so tests can run
/// a full countdown or login script without sleeping in real time.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}
