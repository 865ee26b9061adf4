//! Worker Process Supervisor: launches the external program, binds it to
//! a kill-on-close job group / its own process group, tracks its PID,
//! and kills it on teardown unless it has already reported termination.
//!
//! Wraps `std::process::Command` with the platform-specific group/job
//! bookkeeping needed for clean teardown of an external process tree.

mod config;
mod error;
mod platform;

pub use config::LaunchConfig;
pub use error::SpawnError;

use std::process::{Child, Command};

#[cfg(unix)]
fn set_owner_executable(path: &std::path::Path) -> Result<(), SpawnError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)
        .map_err(|e| SpawnError::Permissions {
            path: path.display().to_string(),
            source: e,
        })?
        .permissions();
    perms.set_mode(perms.mode() | 0o700);
    std::fs::set_permissions(path, perms).map_err(|e| SpawnError::Permissions {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(windows)]
fn set_owner_executable(_path: &std::path::Path) -> Result<(), SpawnError> {
    // Windows has no execute bit to restore; archives extract executables
    // as runnable already.
    Ok(())
}

/// Owns the child process handle and whatever platform object keeps it
/// alive/killable (a process group on Unix, a job object on Windows).
pub struct WorkerSupervisor {
    child: Child,
    pid: u32,
    #[cfg(windows)]
    job: Option<platform::JobHandle>,
}

impl WorkerSupervisor {
    /// Launches the worker per `config`. Before launch, attempts to
    /// restore owner read/write/execute permissions on the executable —
    /// FMU archives routinely strip the execute bit on extraction.
    pub fn spawn(config: &LaunchConfig) -> Result<Self, SpawnError> {
        if config.executable.exists() {
            set_owner_executable(&config.executable)?;
        }

        let working_dir = config.resolve_working_dir();

        let mut command = Command::new(&config.executable);
        command.current_dir(&working_dir);

        if let Some(pre) = &config.pre_args {
            for arg in pre.split_whitespace() {
                command.arg(arg);
            }
        }
        if let Some(main) = config.main_argument() {
            command.arg(main);
        }
        if let Some(post) = &config.post_args {
            for arg in post.split_whitespace() {
                command.arg(arg);
            }
        }

        #[cfg(unix)]
        platform::place_in_new_group(&mut command);

        let child = command.spawn().map_err(|e| SpawnError::Launch {
            command: format!("{:?}", command),
            source: e,
        })?;
        let pid = child.id();

        #[cfg(windows)]
        let job = platform::JobHandle::create_and_assign(&child).map_err(|_| SpawnError::JobObject)?;

        Ok(WorkerSupervisor {
            child,
            pid,
            #[cfg(windows)]
            job: Some(job),
        })
    }

    /// Platform-native process identifier, embedded in the shared-segment
    /// name so one master can couple to multiple independent workers.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking check of whether the worker has exited on its own.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Teardown: if the back-end has not reported termination, kill the
    /// whole group/job; otherwise this is a no-op — the destructor does
    /// not re-kill a worker that already exited on its own.
    pub fn terminate(&mut self, slave_has_terminated: bool) {
        if slave_has_terminated || self.has_exited() {
            let _ = self.child.wait();
            return;
        }

        #[cfg(unix)]
        {
            let _ = platform::kill_group(self.pid);
        }
        #[cfg(windows)]
        {
            // Dropping the job handle kills every process assigned to it.
            self.job.take();
        }
        let _ = self.child.wait();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn spawns_and_reports_pid() {
        let config = LaunchConfig::new("/bin/sleep").with_main_args("5");
        let mut supervisor = WorkerSupervisor::spawn(&config).unwrap();
        assert!(supervisor.pid() > 0);
        assert!(!supervisor.has_exited());
        supervisor.terminate(false);
    }

    #[test]
    fn terminate_is_noop_after_self_exit() {
        let config = LaunchConfig::new("/bin/true");
        let mut supervisor = WorkerSupervisor::spawn(&config).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(supervisor.has_exited());
        supervisor.terminate(true);
    }
}
