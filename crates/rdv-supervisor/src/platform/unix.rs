//! Non-Windows path: the child is placed in its own process group
//! (`setpgid(0, 0)`) so teardown can signal the whole group at once.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Registers a `pre_exec` hook that moves the child into a new process
/// group before `exec`. Safety matches `std::os::unix::process::CommandExt`:
/// only async-signal-safe calls may run between `fork` and `exec`, and
/// `setpgid` is one of them.
pub fn place_in_new_group(command: &mut Command) {
    unsafe {
        command.pre_exec(|| {
            if libc::setpgid(0, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Sends `SIGTERM` to the whole process group rooted at `pid`, falling
/// back to `SIGKILL` if that fails (mirrors `killApplication`'s nice-then-
/// hard sequence).
pub fn kill_group(pid: u32) -> io::Result<()> {
    let group = Pid::from_raw(-(pid as i32));
    if signal::kill(group, Signal::SIGTERM).is_err() {
        signal::kill(group, Signal::SIGKILL).map_err(io::Error::from)?;
    }
    Ok(())
}
