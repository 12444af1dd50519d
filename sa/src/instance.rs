//! Single-instance guard
//!
//! A PID file records the running instance. A second process checks the file
//! and the liveness of the recorded PID before doing anything else.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

/// PID-file based instance lock
#[derive(Debug)]
pub struct InstanceLock {
    pid_file: PathBuf,
    held: bool,
}

impl InstanceLock {
    pub fn new(pid_file: PathBuf) -> Self {
        debug!(?pid_file, "InstanceLock::new: called");
        Self { pid_file, held: false }
    }

    /// PID of another live instance, if one holds the lock
    pub fn running_pid(&self) -> Option<u32> {
        debug!("InstanceLock::running_pid: called");
        let own = std::process::id();
        let result = self
            .read_pid()
            .filter(|&pid| pid != own)
            .filter(|&pid| is_process_running(pid));
        debug!(?result, "InstanceLock::running_pid: returning");
        result
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// Claim the lock for this process
    ///
    /// A stale PID file left by a dead process is overwritten.
    pub fn acquire(&mut self) -> Result<()> {
        debug!(?self.pid_file, "InstanceLock::acquire: called");
        if let Some(pid) = self.running_pid() {
            return Err(eyre::eyre!("Another instance is already running (PID: {})", pid));
        }

        if self.pid_file.exists() {
            warn!(path = ?self.pid_file, "Removing stale PID file");
        }

        let pid = std::process::id();
        self.write_pid(pid)?;
        self.held = true;
        info!(pid, path = ?self.pid_file, "Instance lock acquired");
        Ok(())
    }

    /// Release the lock if this process holds it
    pub fn release(&mut self) -> Result<()> {
        debug!(held = self.held, "InstanceLock::release: called");
        if !self.held {
            return Ok(());
        }
        // Only remove the file if it still names us
        if self.read_pid() == Some(std::process::id()) {
            self.remove_pid_file()?;
        }
        self.held = false;
        info!(path = ?self.pid_file, "Instance lock released");
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    pub fn status(&self) -> InstanceStatus {
        debug!("InstanceLock::status: called");
        let pid = self.read_pid().filter(|&pid| is_process_running(pid));
        InstanceStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_file.clone(),
        }
    }

    /// PID recorded in the file; anything that cannot name a process reads as stale
    fn read_pid(&self) -> Option<u32> {
        let contents = fs::read_to_string(&self.pid_file).ok()?;
        let pid = parse_pid(&contents);
        if pid.is_none() {
            debug!(path = ?self.pid_file, contents = contents.trim(), "InstanceLock::read_pid: not a usable PID");
        }
        pid
    }

    fn write_pid(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).context("Failed to create PID file directory")?;
        }

        let mut file = fs::File::create(&self.pid_file).context("Failed to create PID file")?;
        write!(file, "{}", pid).context("Failed to write PID")?;
        debug!(pid, path = ?self.pid_file, "Wrote PID file");
        Ok(())
    }

    fn remove_pid_file(&self) -> Result<()> {
        if self.pid_file.exists() {
            fs::remove_file(&self.pid_file).context("Failed to remove PID file")?;
            debug!(path = ?self.pid_file, "Removed PID file");
        }
        Ok(())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if self.held
            && let Err(e) = self.release()
        {
            warn!(error = %e, "InstanceLock::drop: failed to release");
        }
    }
}

/// Positive and within `pid_t`; 0 and negative values address process groups
fn parse_pid(contents: &str) -> Option<u32> {
    let pid: u32 = contents.trim().parse().ok()?;
    let raw = i32::try_from(pid).ok()?;
    (raw > 0).then_some(pid)
}

/// Check `pid` with signal 0
#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Some(raw) = i32::try_from(pid).ok().filter(|&raw| raw > 0) else {
        return false;
    };
    let alive = match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists, owned by someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    };
    debug!(pid, alive, "is_process_running: checked");
    alive
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

/// Instance status information
#[derive(Debug, Serialize)]
pub struct InstanceStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_not_running_when_no_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let lock = InstanceLock::new(temp_dir.path().join("nonexistent.pid"));
        assert!(!lock.is_running());
        assert!(!lock.status().running);
    }

    #[test]
    fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("run").join("sa.pid");

        let mut lock = InstanceLock::new(pid_file.clone());
        lock.acquire().unwrap();
        assert!(lock.is_held());
        assert!(pid_file.exists());
        assert_eq!(lock.read_pid(), Some(std::process::id()));

        // Our own PID never counts as another instance
        assert!(!lock.is_running());

        lock.release().unwrap();
        assert!(!lock.is_held());
        assert!(!pid_file.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_live_foreign_pid_blocks_acquire() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("sa.pid");

        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        fs::write(&pid_file, child.id().to_string()).unwrap();

        let mut lock = InstanceLock::new(pid_file.clone());
        assert_eq!(lock.running_pid(), Some(child.id()));
        assert!(lock.acquire().is_err());
        assert!(!lock.is_held());
        assert_eq!(fs::read_to_string(&pid_file).unwrap(), child.id().to_string());

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_stale_pid_file_is_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("sa.pid");
        fs::write(&pid_file, "garbage").unwrap();

        let mut lock = InstanceLock::new(pid_file.clone());
        assert!(!lock.is_running());
        lock.acquire().unwrap();
        assert_eq!(fs::read_to_string(&pid_file).unwrap(), std::process::id().to_string());
    }

    #[test]
    fn test_parse_pid_rejects_group_and_overflow_values() {
        assert_eq!(parse_pid("4242\n"), Some(4242));
        assert_eq!(parse_pid("0"), None);
        assert_eq!(parse_pid("-1"), None);
        assert_eq!(parse_pid("2147483648"), None);
        assert_eq!(parse_pid("4294967295"), None);
        assert_eq!(parse_pid(""), None);
    }

    #[test]
    fn test_out_of_range_pid_file_is_stale() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("sa.pid");

        for contents in ["0", "-1", "4294967295", "2147483648"] {
            fs::write(&pid_file, contents).unwrap();
            let mut lock = InstanceLock::new(pid_file.clone());
            assert!(!lock.is_running(), "{contents} should read as stale");
            assert!(!lock.status().running, "{contents} should report stopped");
            lock.acquire().unwrap();
            assert_eq!(fs::read_to_string(&pid_file).unwrap(), std::process::id().to_string());
            lock.release().unwrap();
        }
    }

    #[test]
    fn test_release_without_acquire_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("sa.pid");
        fs::write(&pid_file, "12345").unwrap();

        let mut lock = InstanceLock::new(pid_file.clone());
        lock.release().unwrap();
        assert!(pid_file.exists());
    }

    #[test]
    fn test_drop_releases_held_lock() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("sa.pid");
        {
            let mut lock = InstanceLock::new(pid_file.clone());
            lock.acquire().unwrap();
        }
        assert!(!pid_file.exists());
    }
}
