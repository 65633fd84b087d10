//! autologin - launch a game and type the login for you
//!
//! This library provides components for:
//! - Detached process launching with an optional post-spawn fault channel
//! - Calibrating the screen positions of the login form fields
//! - Replaying a timed, scripted login through synthetic input

pub mod auto_login;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod coordinates;
pub mod credential;
pub mod input_sequencer;
pub mod input_simulator;
pub mod mock;
pub mod pointer;
pub mod process_launcher;
pub mod x11;

pub use auto_login::{
    AutoLogin, CursorPosition, InjectorFactory, LaunchOutcome, LaunchRequest, LaunchResult,
};
pub use calibration::{CalibrationSession, CalibrationState, Tick};
pub use clock::{Clock, SystemClock};
pub use config::{Config, InputBackend, ReplayTimings};
pub use coordinates::{
    load_coordinates, save_coordinates, Coordinate, CoordinateField, CoordinateRecord,
    LoginCoordinateSet,
};
pub use credential::Credential;
pub use input_sequencer::{
    login_script, preview_script, AutomationGuard, AutomationLock, InputSequencer, ReplayHandle,
    ReplayReport, Step,
};
pub use input_simulator::{create_injector, InputEvent, InputInjector, RdevInjector};
pub use pointer::{create_pointer_source, PointerSource, PointerTracker};
pub use process_launcher::{LaunchFault, ProcessLauncher, ProcessSpawner, SpawnedProcess};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for autologin
#[derive(Error, Debug)]
pub enum AutoLoginError {
    #[error("Game executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Failed to start game process: {0}")]
    Spawn(String),

    #[error("Failed to inject input event: {0}")]
    Injection(String),

    #[error("Failed to query pointer position: {0}")]
    PointerQuery(String),

    #[error("Display unavailable: {0}")]
    Display(String),

    #[error("Login automation already in progress")]
    AutomationInProgress,

    #[error("A calibration countdown is already running")]
    CalibrationBusy,

    #[error("No calibration field is armed")]
    NotArmed,

    #[error("Coordinate file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid coordinate file: {0}")]
    Json(#[from] serde_json::Error),
}
