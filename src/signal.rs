//! # Named OS signals used to stop the managed process.
//!
//! **Unix platforms:** [`Signal`] is the `nix` signal type; any POSIX signal name
//! (`"SIGTERM"`, `"SIGINT"`, `"SIGHUP"`, ...) parses through [`FromStr`](std::str::FromStr).
//!
//! **Other platforms:** a reduced [`Signal`] enum; every variant is delivered as a forced kill.
//!
//! Delivering a signal to a process that already exited is not an error.

use std::io;

use tokio::process::Child;

#[cfg(unix)]
pub use nix::sys::signal::Signal;

/// Signal names understood on platforms without POSIX signals.
#[cfg(not(unix))]
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    SIGINT,
    SIGTERM,
    SIGKILL,
}

#[cfg(not(unix))]
impl Signal {
    /// Returns the conventional name of the signal.
    pub const fn as_str(self) -> &'static str {
        match self {
            Signal::SIGINT => "SIGINT",
            Signal::SIGTERM => "SIGTERM",
            Signal::SIGKILL => "SIGKILL",
        }
    }
}

#[cfg(not(unix))]
impl std::str::FromStr for Signal {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIGINT" => Ok(Signal::SIGINT),
            "SIGTERM" => Ok(Signal::SIGTERM),
            "SIGKILL" => Ok(Signal::SIGKILL),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported signal {other}"),
            )),
        }
    }
}

/// Sends `signal` to a child that has not been reaped yet.
#[cfg(unix)]
pub(crate) fn deliver(child: &mut Child, signal: Signal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // `id()` is None once the child has been reaped.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Sends `signal` to a child that has not been reaped yet.
#[cfg(not(unix))]
pub(crate) fn deliver(child: &mut Child, _signal: Signal) -> io::Result<()> {
    match child.start_kill() {
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
        other => other,
    }
}
