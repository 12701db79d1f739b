use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use super::activity::ActivitySignal;
use super::error::PtyError;

/// Grace period between the initial hangup signal and the forced kill, on
/// Unix (§4.K `terminate(handle, force=true)`).
const TERMINATE_GRACE: Duration = Duration::from_secs(3);
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A spawned PTY-backed child process plus the master side needed to
/// resize, write to, and read from it.
pub struct PtyHandle {
    child: Box<dyn Child + Send + Sync>,
    master: Box<dyn MasterPty + Send>,
    pid: Option<u32>,
    #[cfg(unix)]
    pgid: Option<i32>,
}

impl PtyHandle {
    pub fn writer(&self) -> Result<Box<dyn Write + Send>, PtyError> {
        self.master
            .take_writer()
            .map_err(|e| PtyError::Spawn(format!("failed to take PTY writer: {e}")))
    }

    pub fn reader(&self) -> Result<Box<dyn Read + Send>, PtyError> {
        self.master
            .try_clone_reader()
            .map_err(|e| PtyError::Spawn(format!("failed to clone PTY reader: {e}")))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Spawns `argv` under a freshly allocated PTY sized to (`rows`, `columns`),
/// with `env` as its complete environment.
pub fn spawn(
    argv: &[String],
    rows: u16,
    columns: u16,
    env: &HashMap<String, String>,
) -> Result<PtyHandle, PtyError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(PtyError::Spawn("argv must be non-empty".to_string()));
    };

    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows,
            cols: columns,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| PtyError::Spawn(format!("failed to open PTY: {e}")))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    cmd.env_clear();
    for (key, value) in env {
        cmd.env(key, value);
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| PtyError::Spawn(format!("failed to spawn {program}: {e}")))?;

    let pid = child.process_id();

    #[cfg(unix)]
    let pgid = pair.master.process_group_leader();

    // The slave side is only needed to spawn the child; the master keeps
    // the PTY alive on its own.
    drop(pair.slave);

    Ok(PtyHandle {
        child,
        master: pair.master,
        pid,
        #[cfg(unix)]
        pgid,
    })
}

/// Resizes the PTY, propagating SIGWINCH to the child.
pub fn resize(handle: &PtyHandle, rows: u16, columns: u16) -> Result<(), PtyError> {
    handle
        .master
        .resize(PtySize {
            rows,
            cols: columns,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| PtyError::Resize(e.to_string()))
}

/// Non-blocking liveness check.
pub fn is_alive(handle: &mut PtyHandle) -> bool {
    matches!(handle.child.try_wait(), Ok(None))
}

/// Terminates the child with graceful escalation: SIGHUP to the process
/// group, a grace period for it to exit on its own, then SIGKILL.
///
/// On platforms without process groups (Windows), this falls back to the
/// portable-pty `Child::kill()`, which is already forceful.
pub fn terminate(handle: &mut PtyHandle) -> Result<(), PtyError> {
    #[cfg(unix)]
    {
        if let Some(pgid) = handle.pgid {
            // SIGHUP the whole process group first, per §4.K.
            unsafe {
                libc::kill(-pgid, libc::SIGHUP);
            }

            let start = Instant::now();
            while start.elapsed() < TERMINATE_GRACE {
                if !is_alive(handle) {
                    return Ok(());
                }
                std::thread::sleep(TERMINATE_POLL_INTERVAL);
            }

            if is_alive(handle) {
                unsafe {
                    libc::kill(-pgid, libc::SIGKILL);
                }
            }
            return Ok(());
        }
    }

    handle
        .child
        .kill()
        .map_err(|e| PtyError::Terminate(e.to_string()))
}

/// On the POSIX-over-Windows-emulation platform, rewrites a native-style
/// `PATH` into a POSIX-style colon-separated one via the platform's own
/// `cygpath` utility. Not invoked on any other platform.
#[cfg(target_os = "cygwin")]
pub fn convert_path_variable(path: &str) -> Result<String, PtyError> {
    let output = std::process::Command::new("/usr/bin/cygpath")
        .args(["-p", path])
        .output()
        .map_err(|e| PtyError::Spawn(format!("cygpath failed: {e}")))?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(not(target_os = "cygwin"))]
pub fn convert_path_variable(path: &str) -> Result<String, PtyError> {
    Ok(path.to_string())
}

#[cfg(unix)]
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn request_shutdown(_signum: libc::c_int) {
    // Signal handlers may only touch async-signal-safe operations; an
    // atomic store is the entirety of what happens here. Everything else
    // (waking the supervisor, logging) happens on the watcher thread below.
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs SIGINT/SIGTERM handlers and returns a flag that flips to `true`
/// once either has been received. The server treats that the same as an
/// explicit `terminate` command (§4.L, §6).
///
/// On non-Unix platforms this is a no-op: the returned flag never flips, and
/// shutdown relies solely on the control channel's EOF or an explicit
/// `terminate` command.
pub fn install_shutdown_handler(activity: Arc<ActivitySignal>) -> Arc<AtomicBool> {
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGINT, request_shutdown as libc::sighandler_t);
            libc::signal(libc::SIGTERM, request_shutdown as libc::sighandler_t);
        }

        let observed = Arc::new(AtomicBool::new(false));
        let watcher = observed.clone();
        std::thread::Builder::new()
            .name("pty-signal-watcher".to_string())
            .spawn(move || loop {
                if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
                    watcher.store(true, Ordering::SeqCst);
                    activity.signal();
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            })
            .expect("failed to spawn signal watcher thread");
        observed
    }

    #[cfg(not(unix))]
    {
        let _ = activity;
        Arc::new(AtomicBool::new(false))
    }
}
