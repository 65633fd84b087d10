//! The game keeps running after the launcher exits
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for_pid(path: &Path) -> libc::pid_t {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(text) = fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        assert!(Instant::now() < deadline, "game never wrote its pid");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn game_outlives_the_launcher_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("game.pid");
    let script = format!(
        "echo $$ > '{0}.tmp' && mv '{0}.tmp' '{0}' && exec sleep 30",
        pid_file.display()
    );

    // Launch-only, so no display is needed
    let output = Command::new(env!("CARGO_BIN_EXE_autologin"))
        .args(["launch", "--exe", "/bin/sh", "--username", "joe", "--password", "x1"])
        .args(["--", "-c", &script])
        .env("AUTOLOGIN_COORDS_DIR", dir.path())
        .env_remove("DISPLAY")
        .output()
        .unwrap();

    assert!(output.status.success(), "{:?}", output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"{"success":true}"#
    );

    // The launcher is gone; its child must not have gone with it
    let pid = wait_for_pid(&pid_file);
    let alive = unsafe { libc::kill(pid, 0) } == 0;
    let session = unsafe { libc::getsid(pid) };
    unsafe { libc::kill(pid, libc::SIGTERM) };

    assert!(alive);
    assert_eq!(session, pid);
}
