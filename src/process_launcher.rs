//! Detached process launching
//!
//! A launch has two outcomes. The synchronous one says whether the OS
//! accepted the new process. Anything that goes wrong later (the game dies
//! with an error status, the wait itself fails) is only reported as a
//! [`LaunchFault`] on a channel, which the caller may keep or drop.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::AutoLoginError;

/// Something that went wrong after the process was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchFault {
    /// The process ended with a failure status (`None` when killed by a signal)
    Exited { code: Option<i32> },
    /// Waiting on the process failed
    Wait { message: String },
}

/// A process the OS accepted
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: u32,
    /// Post-spawn faults; closes without a message when the process exits cleanly
    pub faults: mpsc::Receiver<LaunchFault>,
}

/// OS process creation
pub trait ProcessSpawner: Send + Sync {
    fn spawn_detached(&self, program: &Path, args: &[OsString]) -> io::Result<SpawnedProcess>;
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // New session: no controlling terminal, not in our process group
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}

/// Spawns the real process, detached from ours, and reaps it on a
/// background thread
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSpawner;

impl ProcessSpawner for DetachedSpawner {
    fn spawn_detached(&self, program: &Path, args: &[OsString]) -> io::Result<SpawnedProcess> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Games usually load their data relative to their own directory
        if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        detach(&mut cmd);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            let fault = match child.wait() {
                Ok(status) if status.success() => {
                    debug!("Process {} exited cleanly", pid);
                    None
                }
                Ok(status) => Some(LaunchFault::Exited {
                    code: status.code(),
                }),
                Err(e) => Some(LaunchFault::Wait {
                    message: e.to_string(),
                }),
            };
            if let Some(fault) = fault {
                warn!("Process {} fault: {:?}", pid, fault);
                // Nobody listening is fine
                let _ = sender.send(fault);
            }
        });

        Ok(SpawnedProcess {
            pid,
            faults: receiver,
        })
    }
}

/// Starts the game executable
#[derive(Clone)]
pub struct ProcessLauncher {
    spawner: Arc<dyn ProcessSpawner>,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::with_spawner(Arc::new(DetachedSpawner))
    }

    pub fn with_spawner(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self { spawner }
    }

    /// Launch `program` detached.
    ///
    /// Returns as soon as the OS accepts the process. A missing executable
    /// fails before any spawn is attempted.
    pub fn launch(
        &self,
        program: &Path,
        args: &[OsString],
    ) -> Result<SpawnedProcess, AutoLoginError> {
        if !program.exists() {
            warn!("Game executable not found: {}", program.display());
            return Err(AutoLoginError::ExecutableNotFound(program.to_path_buf()));
        }

        info!("Launching {}", program.display());
        let spawned = self
            .spawner
            .spawn_detached(program, args)
            .map_err(|e| AutoLoginError::Spawn(format!("{}: {}", program.display(), e)))?;
        info!("Launched {} (pid {})", program.display(), spawned.pid);
        Ok(spawned)
    }
}
