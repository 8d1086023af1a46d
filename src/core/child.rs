//! # Managed child process.
//!
//! [`ManagedChild::spawn`] creates the OS process and hands the
//! [`tokio::process::Child`] to a **reaper task** that owns it for the rest of
//! its life. Everyone else holds a cloneable [`ManagedChild`] handle.
//!
//! ```text
//! ManagedChild (clone) ──signal request──► reaper task ──► kill(pid, sig)
//!                                             │
//!                                 child.wait()│
//!                                             ▼
//!                     exit watch ◄── Some(ExitInfo) ──► on_exit hook
//! ```
//!
//! ## Rules
//! - Signals are only delivered while the child is un-reaped, so a recycled pid is never hit.
//! - The exit watch moves from `None` to `Some` exactly once.
//! - The on-exit hook runs after the exit watch is set.
//! - Once every handle is dropped the reaper kills the process and exits.

use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::signal::{self, Signal};

/// How a managed process ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, if the process was killed by one (unix).
    pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

type SignalRequest = (Signal, oneshot::Sender<io::Result<()>>);

/// Output streams of a freshly spawned process, consumed by readiness detection.
pub(crate) struct ChildStreams {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Cloneable handle to a process owned by its reaper task.
#[derive(Clone)]
pub(crate) struct ManagedChild {
    pid: u32,
    generation: u64,
    signals: mpsc::UnboundedSender<SignalRequest>,
    exit: watch::Receiver<Option<ExitInfo>>,
    stopping: Arc<AtomicBool>,
}

impl ManagedChild {
    /// Spawns the configured process and its reaper task.
    ///
    /// `on_exit` runs on the reaper task once the process has been reaped.
    pub fn spawn<F>(
        cfg: &ServerConfig,
        generation: u64,
        on_exit: F,
    ) -> Result<(Self, ChildStreams), ServerError>
    where
        F: FnOnce(u32, ExitInfo) + Send + 'static,
    {
        let (program, argv) = cfg.command_line();
        let mut cmd = Command::new(&program);
        cmd.args(&argv)
            .envs(&cfg.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &cfg.exec.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            if let Some(uid) = cfg.exec.uid {
                cmd.uid(uid);
            }
            if let Some(gid) = cfg.exec.gid {
                cmd.gid(gid);
            }
        }

        let spawn_err = |source| ServerError::Spawn {
            path: program.clone(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_err)?;
        let pid = child
            .id()
            .ok_or_else(|| spawn_err(io::Error::other("process exited before reporting a pid")))?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(spawn_err(io::Error::other("process output was not captured")));
        };

        debug!(pid, program = %program.display(), args = ?argv, "spawned managed process");

        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(reap(child, pid, sig_rx, exit_tx, on_exit));

        let handle = Self {
            pid,
            generation,
            signals: sig_tx,
            exit: exit_rx,
            stopping: Arc::new(AtomicBool::new(false)),
        };
        Ok((handle, ChildStreams { stdout, stderr }))
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` until the process has been reaped.
    pub fn is_connected(&self) -> bool {
        self.exit.borrow().is_none()
    }

    /// Returns a fresh receiver for the exit watch.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit.clone()
    }

    /// Marks the process as being stopped on purpose.
    ///
    /// Returns `true` for the first caller only.
    pub fn begin_stop(&self) -> bool {
        !self.stopping.swap(true, Ordering::AcqRel)
    }

    /// Withdraws a stop whose signal could not be delivered.
    pub fn abort_stop(&self) {
        self.stopping.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Asks the reaper to deliver `sig` and waits for the outcome.
    ///
    /// A process that already exited is reported as success.
    pub async fn signal(&self, sig: Signal) -> Result<(), ServerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.signals.send((sig, reply_tx)).is_err() {
            return Ok(());
        }
        match reply_rx.await {
            Ok(Ok(())) | Err(_) => Ok(()),
            Ok(Err(source)) => Err(ServerError::Signal {
                pid: self.pid,
                source,
            }),
        }
    }

    /// Waits until the process has been reaped.
    pub async fn exited(&self) -> ExitInfo {
        let mut rx = self.exit.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(info) => (*info).unwrap_or_default(),
            Err(_) => ExitInfo::default(),
        }
    }
}

async fn reap<F>(
    mut child: Child,
    pid: u32,
    mut signals: mpsc::UnboundedReceiver<SignalRequest>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    on_exit: F,
) where
    F: FnOnce(u32, ExitInfo),
{
    let info = loop {
        tokio::select! {
            status = child.wait() => {
                break status.map(ExitInfo::from).unwrap_or_default();
            }
            req = signals.recv() => match req {
                Some((sig, reply)) => {
                    debug!(pid, signal = sig.as_str(), "delivering signal");
                    let _ = reply.send(signal::deliver(&mut child, sig));
                }
                None => {
                    debug!(pid, "all handles dropped, killing managed process");
                    // kill_on_drop: tokio reaps it in the background.
                    drop(child);
                    return;
                }
            },
        }
    };
    debug!(pid, status = %info, "managed process reaped");
    exit_tx.send_replace(Some(info));
    on_exit(pid, info);
}
