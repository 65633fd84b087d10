//! Scripted login replay
//!
//! The login is built as a plain list of [`Step`]s and then interpreted by
//! a single executor: inject, wait, inject, ... in order. The first refused
//! event ends the replay; nothing is retried.
//!
//! Only one replay may drive the desktop at a time, across every sequencer
//! in the process. Every run holds the [`AutomationLock`]; a second run while
//! one is in flight is rejected instead of interleaving keystrokes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::ReplayTimings;
use crate::coordinates::{Coordinate, LoginCoordinateSet};
use crate::credential::Credential;
use crate::input_simulator::{InputEvent, InputInjector};
use crate::AutoLoginError;

/// Pause between the two positions of a coordinate preview
const PREVIEW_PAUSE: Duration = Duration::from_secs(1);

/// One instruction of a replay script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Inject(InputEvent),
    Wait(Duration),
}

fn fill_field(steps: &mut Vec<Step>, at: &Coordinate, text: &str, keystroke: Duration) {
    steps.push(Step::Inject(InputEvent::MoveTo { x: at.x, y: at.y }));
    steps.push(Step::Inject(InputEvent::Click));
    steps.push(Step::Inject(InputEvent::SelectAll));
    steps.push(Step::Inject(InputEvent::Delete));
    for c in text.chars() {
        steps.push(Step::Inject(InputEvent::Key(c)));
        steps.push(Step::Wait(keystroke));
    }
}

/// The full login: settle, fill username, fill password, press Enter
pub fn login_script(
    coords: &LoginCoordinateSet,
    credential: &Credential,
    timings: &ReplayTimings,
) -> Vec<Step> {
    let mut steps = vec![Step::Wait(timings.settle)];
    fill_field(&mut steps, &coords.username, &credential.username, timings.keystroke);
    steps.push(Step::Wait(timings.between_fields));
    fill_field(&mut steps, &coords.password, &credential.password, timings.keystroke);
    steps.push(Step::Wait(timings.before_submit));
    steps.push(Step::Inject(InputEvent::Enter));
    steps
}

/// Pointer tour over both fields, without clicking or typing
pub fn preview_script(coords: &LoginCoordinateSet) -> Vec<Step> {
    let (ux, uy) = coords.username.position();
    let (px, py) = coords.password.position();
    vec![
        Step::Inject(InputEvent::MoveTo { x: ux, y: uy }),
        Step::Wait(PREVIEW_PAUSE),
        Step::Inject(InputEvent::MoveTo { x: px, y: py }),
    ]
}

/// What a finished replay did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Events the OS accepted
    pub events_injected: usize,
    /// Why the replay stopped early, if it did
    pub aborted: Option<String>,
}

impl ReplayReport {
    pub fn completed(&self) -> bool {
        self.aborted.is_none()
    }
}

fn global_flag() -> &'static Arc<AtomicBool> {
    static BUSY: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    BUSY.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

/// The "automation in progress" flag
#[derive(Debug, Clone)]
pub struct AutomationLock {
    busy: Arc<AtomicBool>,
}

impl Default for AutomationLock {
    fn default() -> Self {
        Self::global()
    }
}

impl AutomationLock {
    /// The process-wide lock shared by every sequencer
    pub fn global() -> Self {
        Self {
            busy: Arc::clone(global_flag()),
        }
    }

    /// A lock private to its holders. Only for tests that must not contend
    /// with other replays in the same process.
    pub fn isolated() -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the lock, or fail if a replay is already running
    pub fn try_acquire(&self) -> Result<AutomationGuard, AutoLoginError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AutoLoginError::AutomationInProgress)?;
        Ok(AutomationGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Held for the duration of one replay; releases the lock when dropped.
/// Can be moved to the thread that runs the replay.
#[derive(Debug)]
pub struct AutomationGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for AutomationGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// A replay running on a background thread
#[derive(Debug)]
pub struct ReplayHandle {
    handle: thread::JoinHandle<ReplayReport>,
}

impl ReplayHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the replay to end
    pub fn join(self) -> ReplayReport {
        self.handle.join().unwrap_or_else(|_| ReplayReport {
            events_injected: 0,
            aborted: Some("replay thread panicked".to_string()),
        })
    }
}

/// Types a credential into a two-field login form
#[derive(Clone)]
pub struct InputSequencer {
    injector: Arc<dyn InputInjector>,
    clock: Arc<dyn Clock>,
    timings: ReplayTimings,
    lock: AutomationLock,
}

impl InputSequencer {
    pub fn new(
        injector: Arc<dyn InputInjector>,
        clock: Arc<dyn Clock>,
        timings: ReplayTimings,
    ) -> Self {
        Self {
            injector,
            clock,
            timings,
            lock: AutomationLock::global(),
        }
    }

    /// Guard runs with `lock` instead of the process-wide one
    pub fn with_lock(mut self, lock: AutomationLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn lock(&self) -> &AutomationLock {
        &self.lock
    }

    pub fn timings(&self) -> &ReplayTimings {
        &self.timings
    }

    /// Interpret `steps` in order, stopping at the first refused event.
    /// The caller must hold the automation lock.
    fn execute(&self, steps: &[Step]) -> ReplayReport {
        let mut report = ReplayReport::default();

        for (index, step) in steps.iter().enumerate() {
            match *step {
                Step::Wait(duration) => self.clock.sleep(duration),
                Step::Inject(event) => {
                    if let Err(e) = self.injector.inject(event) {
                        error!(
                            "Step {}/{} ({}) failed, abandoning replay: {}",
                            index + 1,
                            steps.len(),
                            event.kind(),
                            e
                        );
                        report.aborted = Some(e.to_string());
                        return report;
                    }
                    report.events_injected += 1;
                }
            }
        }

        debug!("Replay finished: {} events", report.events_injected);
        report
    }

    /// Run the login replay on the calling thread
    pub fn run(
        &self,
        coords: &LoginCoordinateSet,
        credential: &Credential,
    ) -> Result<ReplayReport, AutoLoginError> {
        let _guard = self.lock.try_acquire()?;
        info!("Typing login for '{}'", credential.display_name());
        Ok(self.execute(&login_script(coords, credential, &self.timings)))
    }

    /// Take the lock here, then run the login replay on a background thread
    pub fn start(
        &self,
        coords: LoginCoordinateSet,
        credential: Credential,
    ) -> Result<ReplayHandle, AutoLoginError> {
        let guard = self.lock.try_acquire()?;
        Ok(self.start_with_guard(guard, coords, credential))
    }

    /// Run the login replay on a background thread under an already held lock
    pub fn start_with_guard(
        &self,
        guard: AutomationGuard,
        coords: LoginCoordinateSet,
        credential: Credential,
    ) -> ReplayHandle {
        let steps = login_script(&coords, &credential, &self.timings);
        let name = credential.display_name().to_string();
        let sequencer = self.clone();

        let handle = thread::spawn(move || {
            let _guard = guard;
            info!("Typing login for '{}'", name);
            let report = sequencer.execute(&steps);
            if report.completed() {
                info!("Login replay for '{}' complete", name);
            }
            report
        });

        ReplayHandle { handle }
    }

    /// Move the pointer over both fields so the operator can check them
    pub fn preview(&self, coords: &LoginCoordinateSet) -> Result<ReplayReport, AutoLoginError> {
        let _guard = self.lock.try_acquire()?;
        info!(
            "Previewing coordinates: username ({}, {}), password ({}, {})",
            coords.username.x, coords.username.y, coords.password.x, coords.password.y
        );
        Ok(self.execute(&preview_script(coords)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordingInjector, VirtualClock};

    fn sequencer(injector: Arc<RecordingInjector>, clock: Arc<VirtualClock>) -> InputSequencer {
        InputSequencer::new(injector, clock, ReplayTimings::default())
            .with_lock(AutomationLock::isolated())
    }

    fn injected(steps: &[Step]) -> Vec<InputEvent> {
        steps
            .iter()
            .filter_map(|s| match s {
                Step::Inject(e) => Some(*e),
                Step::Wait(_) => None,
            })
            .collect()
    }

    #[test]
    fn script_interleaves_fixed_delays() {
        let timings = ReplayTimings::default();
        let coords = LoginCoordinateSet::new((1, 2), (3, 4));
        let steps = login_script(&coords, &Credential::new("ab", "c"), &timings);

        let waits: Vec<Duration> = steps
            .iter()
            .filter_map(|s| match s {
                Step::Wait(d) => Some(*d),
                Step::Inject(_) => None,
            })
            .collect();
        assert_eq!(
            waits,
            vec![
                timings.settle,
                timings.keystroke,
                timings.keystroke,
                timings.between_fields,
                timings.keystroke,
                timings.before_submit,
            ]
        );
        assert_eq!(steps.first(), Some(&Step::Wait(timings.settle)));
        assert_eq!(steps.last(), Some(&Step::Inject(InputEvent::Enter)));
    }

    #[test]
    fn each_character_is_its_own_keystroke() {
        let coords = LoginCoordinateSet::default();
        let steps = login_script(
            &coords,
            &Credential::new("Zoë", "p w"),
            &ReplayTimings::immediate(),
        );
        let keys: Vec<char> = injected(&steps)
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Key(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!['Z', 'o', 'ë', 'p', ' ', 'w']);
    }

    #[test]
    fn empty_credential_still_clears_and_submits() {
        let coords = LoginCoordinateSet::new((5, 5), (6, 6));
        let steps = login_script(&coords, &Credential::new("", ""), &ReplayTimings::immediate());
        assert_eq!(
            injected(&steps),
            vec![
                InputEvent::MoveTo { x: 5, y: 5 },
                InputEvent::Click,
                InputEvent::SelectAll,
                InputEvent::Delete,
                InputEvent::MoveTo { x: 6, y: 6 },
                InputEvent::Click,
                InputEvent::SelectAll,
                InputEvent::Delete,
                InputEvent::Enter,
            ]
        );
    }

    #[test]
    fn run_sleeps_on_the_injected_clock() {
        let injector = Arc::new(RecordingInjector::new());
        let clock = Arc::new(VirtualClock::new());
        let seq = sequencer(injector.clone(), clock.clone());

        let report = seq
            .run(&LoginCoordinateSet::default(), &Credential::new("a", "b"))
            .unwrap();

        assert!(report.completed());
        assert_eq!(report.events_injected, 11);
        let t = ReplayTimings::default();
        assert_eq!(
            clock.elapsed(),
            t.settle + t.keystroke * 2 + t.between_fields + t.before_submit
        );
    }

    #[test]
    fn failure_stops_the_replay_and_releases_the_lock() {
        let injector = Arc::new(RecordingInjector::failing_at(2));
        let clock = Arc::new(VirtualClock::new());
        let seq = sequencer(injector.clone(), clock.clone());

        let report = seq
            .run(&LoginCoordinateSet::new((1, 1), (2, 2)), &Credential::new("joe", "x1"))
            .unwrap();

        assert_eq!(report.events_injected, 2);
        assert!(report.aborted.is_some());
        assert_eq!(injector.calls(), 3);
        assert_eq!(
            injector.events(),
            vec![InputEvent::MoveTo { x: 1, y: 1 }, InputEvent::Click]
        );
        assert!(!seq.lock().is_busy());
    }

    #[test]
    fn lock_is_exclusive_until_guard_drops() {
        let lock = AutomationLock::isolated();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_busy());
        assert!(matches!(
            lock.clone().try_acquire(),
            Err(AutoLoginError::AutomationInProgress)
        ));
        drop(guard);
        assert!(!lock.is_busy());
        assert!(lock.try_acquire().is_ok());
    }

    #[test]
    fn run_is_rejected_while_lock_is_held() {
        let injector = Arc::new(RecordingInjector::new());
        let seq = sequencer(injector.clone(), Arc::new(VirtualClock::new()));

        let _held = seq.lock().try_acquire().unwrap();
        let result = seq.run(&LoginCoordinateSet::default(), &Credential::new("a", "b"));

        assert!(matches!(result, Err(AutoLoginError::AutomationInProgress)));
        assert_eq!(injector.calls(), 0);
    }

    #[test]
    fn background_start_holds_lock_until_done() {
        let injector = Arc::new(RecordingInjector::new());
        let seq = sequencer(injector.clone(), Arc::new(VirtualClock::new()));

        let handle = seq
            .start(LoginCoordinateSet::default(), Credential::new("a", "b"))
            .unwrap();
        let report = handle.join();

        assert!(report.completed());
        assert_eq!(injector.events().len(), 11);
        assert!(!seq.lock().is_busy());
    }

    #[test]
    fn preview_only_moves_the_pointer() {
        let injector = Arc::new(RecordingInjector::new());
        let clock = Arc::new(VirtualClock::new());
        let seq = sequencer(injector.clone(), clock.clone());

        let report = seq
            .preview(&LoginCoordinateSet::new((10, 11), (12, 13)))
            .unwrap();

        assert!(report.completed());
        assert_eq!(
            injector.events(),
            vec![
                InputEvent::MoveTo { x: 10, y: 11 },
                InputEvent::MoveTo { x: 12, y: 13 },
            ]
        );
        assert_eq!(clock.sleeps(), vec![PREVIEW_PAUSE]);
    }

    // The only test in this binary that touches the process-wide lock
    #[test]
    fn separately_built_sequencers_share_one_lock() {
        let first_injector = Arc::new(RecordingInjector::new());
        let second_injector = Arc::new(RecordingInjector::new());
        let first = InputSequencer::new(
            first_injector.clone(),
            Arc::new(VirtualClock::new()),
            ReplayTimings::immediate(),
        );
        let second = InputSequencer::new(
            second_injector.clone(),
            Arc::new(VirtualClock::new()),
            ReplayTimings::immediate(),
        );

        let held = first.lock().try_acquire().unwrap();
        assert!(second.lock().is_busy());
        assert!(matches!(
            second.run(&LoginCoordinateSet::default(), &Credential::new("eve", "pw")),
            Err(AutoLoginError::AutomationInProgress)
        ));
        assert!(matches!(
            AutomationLock::default().try_acquire(),
            Err(AutoLoginError::AutomationInProgress)
        ));
        assert_eq!(second_injector.calls(), 0);

        drop(held);
        let report = second
            .run(&LoginCoordinateSet::default(), &Credential::new("eve", "pw"))
            .unwrap();
        assert!(report.completed());
        assert_eq!(first_injector.calls(), 0);
        assert!(!first.lock().is_busy());
    }
}
