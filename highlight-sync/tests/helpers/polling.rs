use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const INITIAL_DELAY: Duration = Duration::from_millis(25);
const MAX_DELAY: Duration = Duration::from_millis(500);

/// A filesystem condition that never held within the timeout.
#[derive(Debug)]
pub struct WaitError {
    what: String,
    path: PathBuf,
    attempts: u32,
    waited: Duration,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timed out after {} attempts over {:?} waiting for {} ({})",
            self.attempts,
            self.waited,
            self.what,
            self.path.display()
        )
    }
}

impl std::error::Error for WaitError {}

/// Poll `check` with exponential backoff until it holds or `timeout` passes.
pub fn wait_for_path<F>(
    what: &str,
    path: &Path,
    timeout: Duration,
    check: F,
) -> Result<(), WaitError>
where
    F: Fn(&Path) -> bool,
{
    let start = Instant::now();
    let mut delay = INITIAL_DELAY;
    let mut attempts = 0;

    loop {
        attempts += 1;
        if check(path) {
            return Ok(());
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(WaitError {
                what: what.to_string(),
                path: path.to_path_buf(),
                attempts,
                waited: start.elapsed(),
            });
        }

        thread::sleep(delay.min(remaining));
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Wait until `path` holds a parseable PID.
pub fn wait_for_pid_file(path: &Path, timeout: Duration) -> Result<(), WaitError> {
    wait_for_path("pid file", path, timeout, |p| {
        std::fs::read_to_string(p)
            .map(|s| s.trim().parse::<u32>().is_ok())
            .unwrap_or(false)
    })
}

pub fn wait_for_removal(path: &Path, timeout: Duration) -> Result<(), WaitError> {
    wait_for_path("removal", path, timeout, |p| !p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pid_file_with_garbage_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("daemon.pid");
        std::fs::write(&file, "starting").unwrap();

        let err = wait_for_pid_file(&file, Duration::from_millis(100)).unwrap_err();
        assert!(err.to_string().contains("pid file"));

        std::fs::write(&file, "4242\n").unwrap();
        wait_for_pid_file(&file, Duration::from_millis(100)).unwrap();
    }
}
