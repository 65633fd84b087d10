//! Configuration management for autologin

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::calibration::DEFAULT_COUNTDOWN_TICKS;

/// Which OS mechanism injects events and reads the pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputBackend {
    /// XTest fake input and QueryPointer over an X11 connection
    X11,
    /// rdev event simulation, pointer position tracked with a global listener
    Rdev,
}

impl Default for InputBackend {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            InputBackend::X11
        } else {
            InputBackend::Rdev
        }
    }
}

impl FromStr for InputBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x11" | "xtest" => Ok(InputBackend::X11),
            "rdev" => Ok(InputBackend::Rdev),
            other => Err(format!("unknown input backend '{}'", other)),
        }
    }
}

impl fmt::Display for InputBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputBackend::X11 => f.write_str("x11"),
            InputBackend::Rdev => f.write_str("rdev"),
        }
    }
}

/// Fixed delays of the login replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayTimings {
    /// Wait before the first event, while the game window comes up
    pub settle: Duration,
    /// Wait after every typed character
    pub keystroke: Duration,
    /// Wait between finishing the username and clicking the password field
    pub between_fields: Duration,
    /// Wait before pressing Enter
    pub before_submit: Duration,
}

impl Default for ReplayTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            keystroke: Duration::from_millis(50),
            between_fields: Duration::from_millis(500),
            before_submit: Duration::from_millis(500),
        }
    }
}

impl ReplayTimings {
    /// All delays zero, for tests that only care about event order
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            keystroke: Duration::ZERO,
            between_fields: Duration::ZERO,
            before_submit: Duration::ZERO,
        }
    }
}

/// Configuration for the launcher
#[derive(Debug, Clone)]
pub struct Config {
    /// Delays used while typing the credentials
    pub timings: ReplayTimings,

    /// Number of one-tick steps before a calibration capture
    pub countdown_ticks: u32,

    /// Length of one calibration tick
    pub tick_interval: Duration,

    /// Input injection and pointer query mechanism
    pub backend: InputBackend,

    /// Directory holding `login_coords_*` files
    pub coords_dir: PathBuf,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timings: ReplayTimings::default(),
            countdown_ticks: DEFAULT_COUNTDOWN_TICKS,
            tick_interval: Duration::from_secs(1),
            backend: InputBackend::default(),
            coords_dir: PathBuf::from("."),
            verbose: false,
        }
    }
}

impl Config {
    /// Replace the replay delays
    pub fn with_timings(mut self, timings: ReplayTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Use a different input backend
    pub fn with_backend(mut self, backend: InputBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Read and write coordinate files in `dir`
    pub fn with_coords_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.coords_dir = dir.into();
        self
    }

    /// Enable verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("X11".parse::<InputBackend>(), Ok(InputBackend::X11));
        assert_eq!("xtest".parse::<InputBackend>(), Ok(InputBackend::X11));
        assert_eq!("rdev".parse::<InputBackend>(), Ok(InputBackend::Rdev));
        assert!("wayland".parse::<InputBackend>().is_err());
    }

    #[test]
    fn default_countdown_is_three_one_second_ticks() {
        let config = Config::default();
        assert_eq!(config.countdown_ticks, 3);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn builder_overrides_fields() {
        let config = Config::default()
            .with_backend(InputBackend::Rdev)
            .with_timings(ReplayTimings::immediate())
            .with_coords_dir("/var/lib/autologin")
            .with_verbose(true);
        assert_eq!(config.backend, InputBackend::Rdev);
        assert_eq!(config.timings.settle, Duration::ZERO);
        assert_eq!(config.coords_dir, PathBuf::from("/var/lib/autologin"));
        assert!(config.verbose);
    }
}
