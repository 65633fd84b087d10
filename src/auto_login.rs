//! Entry points used by the surrounding application

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::calibration::CalibrationSession;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ReplayTimings};
use crate::coordinates::{Coordinate, CoordinateField, LoginCoordinateSet};
use crate::credential::Credential;
use crate::input_sequencer::{AutomationGuard, AutomationLock, InputSequencer, ReplayHandle};
use crate::input_simulator::{create_injector, InputInjector};
use crate::pointer::{create_pointer_source, PointerSource};
use crate::process_launcher::{LaunchFault, ProcessLauncher};
use crate::AutoLoginError;

/// Everything needed for one launch attempt
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub executable: PathBuf,
    pub args: Vec<OsString>,
    pub credential: Credential,
    /// Without coordinates the game is only launched, no login is typed
    pub coordinates: Option<LoginCoordinateSet>,
}

impl LaunchRequest {
    pub fn new(executable: impl Into<PathBuf>, credential: Credential) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            credential,
            coordinates: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: LoginCoordinateSet) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Whether the OS accepted the game process.
///
/// Says nothing about the login replay, which can still fail afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LaunchResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: &AutoLoginError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// A [`LaunchResult`] plus the handles for what happens after it
#[derive(Debug)]
pub struct LaunchOutcome {
    pub result: LaunchResult,
    pub pid: Option<u32>,
    /// The running login replay, if one was started
    pub replay: Option<ReplayHandle>,
    /// Post-spawn faults of the game process
    pub faults: Option<mpsc::Receiver<LaunchFault>>,
}

impl LaunchOutcome {
    fn failed(error: &AutoLoginError) -> Self {
        Self {
            result: LaunchResult::failed(error),
            pid: None,
            replay: None,
            faults: None,
        }
    }
}

/// Pointer position as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CursorPosition {
    pub x: i32,
    pub y: i32,
}

/// Opens the input backend on first use
pub type InjectorFactory =
    Box<dyn Fn() -> Result<Arc<dyn InputInjector>, AutoLoginError> + Send + Sync>;

/// Launcher, login replay and calibration wired together.
///
/// The input backend is only opened once a replay needs it, so launching
/// without coordinates works without a display.
pub struct AutoLogin {
    launcher: ProcessLauncher,
    make_injector: InjectorFactory,
    sequencer: OnceLock<InputSequencer>,
    lock: AutomationLock,
    timings: ReplayTimings,
    clock: Arc<dyn Clock>,
    pointer: Option<Arc<dyn PointerSource>>,
    countdown_ticks: u32,
    tick_interval: Duration,
}

impl AutoLogin {
    pub fn new(
        launcher: ProcessLauncher,
        injector: Arc<dyn InputInjector>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self::with_injector_factory(
            launcher,
            Box::new(move || -> Result<Arc<dyn InputInjector>, AutoLoginError> {
                Ok(Arc::clone(&injector))
            }),
            clock,
            config,
        )
    }

    pub fn with_injector_factory(
        launcher: ProcessLauncher,
        make_injector: InjectorFactory,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            launcher,
            make_injector,
            sequencer: OnceLock::new(),
            lock: AutomationLock::global(),
            timings: config.timings,
            clock,
            pointer: None,
            countdown_ticks: config.countdown_ticks,
            tick_interval: config.tick_interval,
        }
    }

    /// Real launcher and the configured input backend on the wall clock
    pub fn from_config(config: &Config) -> Self {
        let backend = config.backend;
        Self::with_injector_factory(
            ProcessLauncher::new(),
            Box::new(move || -> Result<Arc<dyn InputInjector>, AutoLoginError> {
                let injector = create_injector(backend)?;
                info!("Input backend: {}", backend);
                Ok(injector)
            }),
            Arc::new(SystemClock),
            config,
        )
    }

    /// Guard replays with `lock` instead of the process-wide one
    pub fn with_automation_lock(mut self, lock: AutomationLock) -> Self {
        self.lock = lock;
        self.sequencer = OnceLock::new();
        self
    }

    /// Attach the configured pointer source, needed for calibration
    pub fn with_pointer_from_config(self, config: &Config) -> Result<Self, AutoLoginError> {
        let pointer: Arc<dyn PointerSource> = Arc::from(create_pointer_source(config.backend)?);
        Ok(self.with_pointer_source(pointer))
    }

    pub fn with_pointer_source(mut self, pointer: Arc<dyn PointerSource>) -> Self {
        self.pointer = Some(pointer);
        self
    }

    pub fn automation_lock(&self) -> &AutomationLock {
        &self.lock
    }

    /// The login replay, opening the input backend on first call
    pub fn sequencer(&self) -> Result<&InputSequencer, AutoLoginError> {
        if let Some(sequencer) = self.sequencer.get() {
            return Ok(sequencer);
        }
        let injector = (self.make_injector)()?;
        let sequencer = InputSequencer::new(injector, Arc::clone(&self.clock), self.timings)
            .with_lock(self.lock.clone());
        Ok(self.sequencer.get_or_init(|| sequencer))
    }

    /// Launch the game and, when coordinates are given, type the login.
    ///
    /// `result.success` only reflects the launch. The replay runs in the
    /// background; join `replay` to find out how it went. With coordinates
    /// present, a launch while another replay is running is refused before
    /// anything is spawned, and so is one whose input backend cannot be
    /// opened. Without coordinates the input backend is never opened.
    pub fn launch_game(&self, request: LaunchRequest) -> LaunchOutcome {
        info!(
            "Launching game with account '{}'",
            request.credential.display_name()
        );

        let prepared = match request.coordinates {
            Some(_) => match self.prepare_replay() {
                Ok(prepared) => Some(prepared),
                Err(e) => {
                    warn!("Not launching: {}", e);
                    return LaunchOutcome::failed(&e);
                }
            },
            None => None,
        };

        let spawned = match self.launcher.launch(&request.executable, &request.args) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!("Failed to launch game: {}", e);
                return LaunchOutcome::failed(&e);
            }
        };

        let replay = match (prepared, request.coordinates) {
            (Some((guard, sequencer)), Some(coords)) => {
                Some(sequencer.start_with_guard(guard, coords, request.credential))
            }
            _ => {
                info!("No login coordinates, skipping login replay");
                None
            }
        };

        LaunchOutcome {
            result: LaunchResult::ok(),
            pid: Some(spawned.pid),
            replay,
            faults: Some(spawned.faults),
        }
    }

    /// Take the automation lock, then make sure input can be injected
    fn prepare_replay(&self) -> Result<(AutomationGuard, &InputSequencer), AutoLoginError> {
        let guard = self.lock.try_acquire()?;
        let sequencer = self.sequencer()?;
        Ok((guard, sequencer))
    }

    fn pointer(&self) -> Result<&dyn PointerSource, AutoLoginError> {
        self.pointer
            .as_deref()
            .ok_or_else(|| AutoLoginError::PointerQuery("no pointer source configured".into()))
    }

    /// Current pointer position
    pub fn capture_cursor_position(&self) -> Result<CursorPosition, AutoLoginError> {
        let (x, y) = self.pointer()?.cursor_position()?;
        Ok(CursorPosition { x, y })
    }

    /// New calibration session over `coords` with the configured countdown
    pub fn calibration_session(&self, coords: LoginCoordinateSet) -> CalibrationSession {
        CalibrationSession::new(coords).with_countdown(self.countdown_ticks)
    }

    /// Count down on the wall clock and capture `field` into `session`
    pub fn calibrate_field(
        &self,
        session: &mut CalibrationSession,
        field: CoordinateField,
        on_tick: impl FnMut(u32),
    ) -> Result<Coordinate, AutoLoginError> {
        let pointer = self.pointer()?;
        session.run_countdown(
            field,
            self.clock.as_ref(),
            self.tick_interval,
            pointer,
            on_tick,
        )
    }
}
