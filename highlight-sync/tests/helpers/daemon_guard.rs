use super::polling::{wait_for_pid_file, WaitError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of the daemon binary cargo built for this test run.
pub fn daemon_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_highlight-syncd"))
}

/// Command for the daemon rooted at `data_dir`, with no token or API configured.
pub fn daemon_command(data_dir: &Path) -> Command {
    let mut cmd = Command::new(daemon_binary());
    cmd.env("HIGHLIGHT_SYNC_DIR", data_dir)
        .env_remove("HIGHLIGHT_SYNC_TOKEN")
        .env_remove("HIGHLIGHT_SYNC_CAPTURE_CMD")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

/// Kills the daemon on drop if it is still running.
pub struct DaemonGuard {
    child: Child,
    data_dir: PathBuf,
}

impl DaemonGuard {
    pub fn start(data_dir: &Path) -> Result<Self, DaemonError> {
        let child = daemon_command(data_dir)
            .spawn()
            .map_err(DaemonError::SpawnFailed)?;

        let guard = Self {
            child,
            data_dir: data_dir.to_path_buf(),
        };
        wait_for_pid_file(&guard.data_dir.join("daemon.pid"), READY_TIMEOUT)
            .map_err(DaemonError::ReadyTimeout)?;
        // The PID file is written just before the socket is bound
        super::polling::wait_for_path("socket", &guard.socket_path(), READY_TIMEOUT, |p| {
            p.exists()
        })
        .map_err(DaemonError::ReadyTimeout)?;

        Ok(guard)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join("daemon.sock")
    }

    /// Send SIGINT and wait for the process to exit.
    pub fn interrupt(&mut self, timeout: Duration) -> bool {
        unsafe {
            libc::kill(self.pid() as i32, libc::SIGINT);
        }

        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(_)) = self.child.try_wait() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(err) = self.child.kill() {
            eprintln!("Failed to kill highlight-syncd pid {}: {}", self.pid(), err);
            return;
        }
        let _ = self.child.wait();
    }
}

#[derive(Debug)]
pub enum DaemonError {
    SpawnFailed(std::io::Error),
    ReadyTimeout(WaitError),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(err) => write!(f, "failed to spawn daemon: {}", err),
            Self::ReadyTimeout(err) => write!(f, "daemon never became ready: {}", err),
        }
    }
}

impl std::error::Error for DaemonError {}
