// Environment configuration for the background host
// Handles platform-specific paths for the socket, PID file and key-value store

use crate::background::queue::{QueueLimits, DEFAULT_MAX_ITEMS};
use crate::background::scheduler::DEFAULT_DRAIN_INTERVAL;
use crate::background::screenshot::DEFAULT_JPEG_QUALITY;
use log::warn;
use std::path::PathBuf;
use std::time::Duration;

pub const DIR_ENV_VAR: &str = "HIGHLIGHT_SYNC_DIR";
pub const DRAIN_SECS_ENV_VAR: &str = "HIGHLIGHT_SYNC_DRAIN_SECS";
pub const CAPTURE_CMD_ENV_VAR: &str = "HIGHLIGHT_SYNC_CAPTURE_CMD";
pub const MAX_QUEUE_ENV_VAR: &str = "HIGHLIGHT_SYNC_MAX_QUEUE";
pub const MAX_AGE_DAYS_ENV_VAR: &str = "HIGHLIGHT_SYNC_MAX_AGE_DAYS";
pub const JPEG_QUALITY_ENV_VAR: &str = "HIGHLIGHT_SYNC_JPEG_QUALITY";

/// Upper bound for HIGHLIGHT_SYNC_MAX_AGE_DAYS (ten years)
pub const MAX_AGE_DAYS_LIMIT: u64 = 3650;

/// Paths and tunables for the daemon
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory for runtime files (socket, PID)
    pub runtime_dir: PathBuf,
    /// Directory for durable state (store.json)
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_file: PathBuf,
    /// Period of the background queue drain
    pub drain_interval: Duration,
    /// External command that prints a PNG/JPEG of the visible tab to stdout
    pub capture_command: Option<Vec<String>>,
    /// JPEG quality (1-100) for preview screenshots
    pub jpeg_quality: u8,
    pub queue_limits: QueueLimits,
}

impl HostConfig {
    /// Configuration rooted at `base` for both runtime and state
    pub fn in_dir(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            socket_path: base.join("daemon.sock"),
            pid_file: base.join("daemon.pid"),
            runtime_dir: base.clone(),
            state_dir: base,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            capture_command: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            queue_limits: QueueLimits::default(),
        }
    }

    pub fn default_paths() -> Self {
        let runtime_dir = Self::default_runtime_dir();
        Self {
            socket_path: runtime_dir.join("daemon.sock"),
            pid_file: runtime_dir.join("daemon.pid"),
            runtime_dir,
            ..Self::in_dir(Self::default_state_dir())
        }
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        // HIGHLIGHT_SYNC_DIR overrides BOTH runtime_dir and state_dir
        let mut config = match std::env::var(DIR_ENV_VAR) {
            Ok(dir) if !dir.is_empty() => Self::in_dir(dir),
            _ => Self::default_paths(),
        };

        if let Some(secs) = env_number(DRAIN_SECS_ENV_VAR).filter(|s| *s > 0) {
            config.drain_interval = Duration::from_secs(secs);
        }
        if let Some(max) = env_number(MAX_QUEUE_ENV_VAR).filter(|m| *m > 0) {
            config.queue_limits.max_items = max as usize;
        }
        match env_number(MAX_AGE_DAYS_ENV_VAR) {
            Some(days) if days > MAX_AGE_DAYS_LIMIT => warn!(
                "Ignoring {}={}: more than {} days",
                MAX_AGE_DAYS_ENV_VAR, days, MAX_AGE_DAYS_LIMIT
            ),
            Some(days) if days > 0 => {
                config.queue_limits.max_age =
                    days.checked_mul(24 * 60 * 60).map(Duration::from_secs);
            }
            _ => {}
        }
        if let Some(quality) = env_number(JPEG_QUALITY_ENV_VAR).filter(|q| (1..=100).contains(q)) {
            config.jpeg_quality = quality as u8;
        }
        config.capture_command = std::env::var(CAPTURE_CMD_ENV_VAR)
            .ok()
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty());

        config
    }

    fn default_runtime_dir() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            // Linux: prefer XDG_RUNTIME_DIR if set, else fall back to state_dir
            if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
                return PathBuf::from(runtime_dir).join("highlight-sync");
            }
        }

        Self::default_state_dir()
    }

    fn default_state_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".highlight-sync"))
            .unwrap_or_else(|| PathBuf::from("/tmp/highlight-sync"))
    }

    /// Key-value store holding config and the offline queue
    pub fn store_file(&self) -> PathBuf {
        self.state_dir.join("store.json")
    }

    /// Ensure both directories exist; runtime is owner-only on Unix
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        std::fs::create_dir_all(&self.runtime_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.runtime_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }

    pub fn write_pid(&self) -> std::io::Result<()> {
        self.ensure_dirs()?;
        std::fs::write(&self.pid_file, std::process::id().to_string())
    }

    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.pid_file)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn remove_pid(&self) -> std::io::Result<()> {
        if self.pid_file.exists() {
            std::fs::remove_file(&self.pid_file)
        } else {
            Ok(())
        }
    }

    pub fn remove_socket(&self) -> std::io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
        } else {
            Ok(())
        }
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Check if a process with the stored PID is still running
    #[cfg(unix)]
    pub fn is_daemon_running(&self) -> bool {
        match self.read_pid() {
            // Signal 0 only checks that the process exists
            Some(pid) => unsafe { libc::kill(pid as i32, 0) == 0 },
            None => false,
        }
    }

    #[cfg(not(unix))]
    pub fn is_daemon_running(&self) -> bool {
        self.socket_exists()
    }
}

fn env_number(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", var, raw);
            None
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}
