//! Calibrate, save, reload, replay

use std::sync::Arc;
use std::time::Duration;

use autologin::mock::{FixedPointer, RecordingInjector, VirtualClock};
use autologin::{
    load_coordinates, save_coordinates, AutoLogin, AutoLoginError, AutomationLock,
    CalibrationState, Config, CoordinateField, Credential, CursorPosition, InputEvent,
    LoginCoordinateSet, ProcessLauncher,
};

fn app(clock: Arc<VirtualClock>) -> (AutoLogin, Arc<RecordingInjector>) {
    let injector = Arc::new(RecordingInjector::new());
    let app = AutoLogin::new(
        ProcessLauncher::new(),
        injector.clone(),
        clock,
        &Config::default(),
    )
    .with_automation_lock(AutomationLock::isolated());
    (app, injector)
}

#[test]
fn capture_requires_a_pointer_source() {
    let (app, _) = app(Arc::new(VirtualClock::new()));
    assert!(matches!(
        app.capture_cursor_position(),
        Err(AutoLoginError::PointerQuery(_))
    ));
}

#[test]
fn capture_reads_the_pointer() {
    let (app, _) = app(Arc::new(VirtualClock::new()));
    let app = app.with_pointer_source(Arc::new(FixedPointer::new(1920, -1)));
    assert_eq!(
        app.capture_cursor_position().unwrap(),
        CursorPosition { x: 1920, y: -1 }
    );
}

#[test]
fn armed_field_is_the_only_one_updated() {
    let clock = Arc::new(VirtualClock::new());
    let pointer = Arc::new(FixedPointer::new(300, 400));
    let (app, _) = app(clock.clone());
    let app = app.with_pointer_source(pointer.clone());

    let mut session = app.calibration_session(LoginCoordinateSet::default());
    let mut ticks = Vec::new();
    let captured = app
        .calibrate_field(&mut session, CoordinateField::Password, |n| ticks.push(n))
        .unwrap();

    assert_eq!(captured.position(), (300, 400));
    assert_eq!(ticks, vec![3, 2, 1]);
    assert_eq!(pointer.queries(), 1);
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
    assert_eq!(session.state(), CalibrationState::Idle);

    let coords = session.into_coordinates();
    assert_eq!(coords.username, LoginCoordinateSet::default().username);
    assert_eq!(coords.password.position(), (300, 400));
}

#[test]
fn calibrated_set_survives_save_and_drives_the_replay() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(VirtualClock::new());
    let pointer = Arc::new(FixedPointer::new(100, 100));
    let (app, injector) = app(clock);
    let app = app.with_pointer_source(pointer.clone());

    let mut session = app.calibration_session(
        load_coordinates(dir.path(), "realm_tbc.json").unwrap(),
    );
    app.calibrate_field(&mut session, CoordinateField::Username, |_| {})
        .unwrap();
    pointer.move_to(100, 200);
    app.calibrate_field(&mut session, CoordinateField::Password, |_| {})
        .unwrap();
    let coords = session.into_coordinates();

    // Nothing is written until the caller saves
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    save_coordinates(dir.path(), "realm_tbc.json", &coords).unwrap();

    let reloaded = load_coordinates(dir.path(), "realm_tbc.json").unwrap();
    assert_eq!(reloaded.to_record(), coords.to_record());

    let report = app
        .sequencer()
        .unwrap()
        .run(&reloaded, &Credential::new("a", "b"))
        .unwrap();
    assert!(report.completed());
    let moves: Vec<InputEvent> = injector
        .events()
        .into_iter()
        .filter(|e| matches!(e, InputEvent::MoveTo { .. }))
        .collect();
    assert_eq!(
        moves,
        vec![
            InputEvent::MoveTo { x: 100, y: 100 },
            InputEvent::MoveTo { x: 100, y: 200 },
        ]
    );
}

#[test]
fn stored_record_keeps_the_flat_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = save_coordinates(
        dir.path(),
        "eu.json",
        &LoginCoordinateSet::new((1692, 737), (1734, 854)),
    )
    .unwrap();

    assert_eq!(path.file_name().unwrap(), "login_coords_eu.json");
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "username_x": 1692,
            "username_y": 737,
            "password_x": 1734,
            "password_y": 854
        })
    );
}
