//! # Readiness detection for a freshly spawned process.
//!
//! Decides, exactly once per spawn, whether the process is ready to serve.
//! Four independent signals race; the first one to fire wins:
//!
//! ```text
//! delay timer ───────────────► Ready        (optimistic: silence means success)
//! stdout line ~ success ─────► Ready
//! stderr line ~ error ───────► Failed(line) (inspector noise is skipped)
//! process exit ──────────────► Failed(status)
//!                     │
//!                     ▼
//!          Resolver (one-shot cell) ──► cancel token ──► timer and exit watcher stop
//! ```
//!
//! ## Rules
//! - The outcome is written at most once; later signals are ignored.
//! - Output pumps forward stdout/stderr line by line for the life of the
//!   process, whether or not readiness has resolved.
//! - With `delay = 0` and no matching line, only an exit can resolve detection.
//! - An exit resolves only after both streams reached end-of-file (or
//!   [`DRAIN_GRACE`] passed), so lines written before the exit win.
//! - Chunks longer than [`MAX_LINE`] without a newline are handled as lines.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{MessagePattern, ServerConfig};
use crate::core::child::ExitInfo;

/// Longest chunk buffered before it is forwarded and matched without a newline.
const MAX_LINE: usize = 64 * 1024;

/// How long an exit waits for output written before it to be read.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Diagnostic lines printed by attached debuggers/inspectors; never failures.
const INSPECTOR_PREFIXES: &[&str] = &[
    "Debugger listening on",
    "Debugger attached.",
    "Waiting for the debugger to disconnect",
    "For help, see: https://nodejs.org/en/docs/inspector",
];

/// Outcome of readiness detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Readiness {
    Ready,
    Failed(String),
}

/// Readiness settings taken from the effective configuration.
#[derive(Clone, Debug)]
pub(crate) struct Criteria {
    pub delay: Option<Duration>,
    pub success: Option<MessagePattern>,
    pub error: Option<MessagePattern>,
}

impl From<&ServerConfig> for Criteria {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            delay: cfg.delay_timeout(),
            success: cfg.success_message.clone(),
            error: cfg.error_message.clone(),
        }
    }
}

/// Single-resolution cell shared by all signal handlers.
struct Resolver {
    tx: Mutex<Option<oneshot::Sender<Readiness>>>,
    done: CancellationToken,
}

impl Resolver {
    /// Writes the outcome if nobody did yet. Returns `true` for the winner.
    fn resolve(&self, outcome: Readiness) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            return false;
        };
        self.done.cancel();
        let _ = tx.send(outcome);
        true
    }

    fn is_pending(&self) -> bool {
        !self.done.is_cancelled()
    }
}

/// Which output stream a pump serves and what it looks for.
enum Watch {
    Success(Option<MessagePattern>),
    Error(Option<MessagePattern>),
}

impl Watch {
    fn check(&self, line: &str) -> Option<Readiness> {
        match self {
            Watch::Success(Some(p)) if p.is_match(line) => Some(Readiness::Ready),
            Watch::Error(Some(p)) if !is_inspector_line(line) && p.is_match(line) => {
                Some(Readiness::Failed(line.to_string()))
            }
            _ => None,
        }
    }
}

fn is_inspector_line(line: &str) -> bool {
    INSPECTOR_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Runs readiness detection for one spawn and returns its outcome.
///
/// `stdout`/`stderr` are forwarded to the supervisor's own streams.
pub(crate) async fn detect<O, E>(
    stdout: O,
    stderr: E,
    exit: watch::Receiver<Option<ExitInfo>>,
    criteria: Criteria,
) -> Readiness
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    detect_into(stdout, tokio::io::stdout(), stderr, tokio::io::stderr(), exit, criteria).await
}

/// Like [`detect`], forwarding output into the given sinks.
pub(crate) async fn detect_into<O, E, OW, EW>(
    stdout: O,
    stdout_sink: OW,
    stderr: E,
    stderr_sink: EW,
    mut exit: watch::Receiver<Option<ExitInfo>>,
    criteria: Criteria,
) -> Readiness
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
    OW: AsyncWrite + Unpin + Send + 'static,
    EW: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let done = CancellationToken::new();
    let resolver = Arc::new(Resolver {
        tx: Mutex::new(Some(tx)),
        done: done.clone(),
    });

    let stdout_eof = CancellationToken::new();
    let stderr_eof = CancellationToken::new();
    tokio::spawn(pump(
        stdout,
        stdout_sink,
        Watch::Success(criteria.success),
        Arc::clone(&resolver),
        stdout_eof.clone(),
    ));
    tokio::spawn(pump(
        stderr,
        stderr_sink,
        Watch::Error(criteria.error),
        Arc::clone(&resolver),
        stderr_eof.clone(),
    ));

    if let Some(delay) = criteria.delay {
        let resolver = Arc::clone(&resolver);
        let done = done.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = done.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if resolver.resolve(Readiness::Ready) {
                        debug!(?delay, "readiness assumed after silent delay");
                    }
                }
            }
        });
    }

    {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            tokio::select! {
                _ = done.cancelled() => {}
                status = async {
                    exit.wait_for(Option::is_some).await.ok().and_then(|info| *info).unwrap_or_default()
                } => {
                    let drained = async {
                        stdout_eof.cancelled().await;
                        stderr_eof.cancelled().await;
                    };
                    tokio::select! {
                        _ = done.cancelled() => return,
                        _ = drained => {}
                        _ = tokio::time::sleep(DRAIN_GRACE) => {
                            debug!(%status, "output still open after exit");
                        }
                    }
                    resolver.resolve(Readiness::Failed(format!(
                        "exited before becoming ready ({status})"
                    )));
                }
            }
        });
    }
    drop(resolver);

    rx.await.unwrap_or_else(|_| Readiness::Failed("readiness detection aborted".into()))
}

/// Forwards `src` into `sink` line by line, offering each line to `watch`
/// while the resolver is still pending. Cancels `eof` when `src` ends.
async fn pump<R, W>(
    src: R,
    mut sink: W,
    watch: Watch,
    resolver: Arc<Resolver>,
    eof: CancellationToken,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let _eof = eof.drop_guard();
    let mut reader = BufReader::new(src);
    let mut buf = Vec::with_capacity(256);
    let mut forwarding = true;
    loop {
        buf.clear();
        match (&mut reader).take(MAX_LINE as u64).read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        if forwarding {
            let forwarded = async {
                sink.write_all(&buf).await?;
                sink.flush().await
            };
            if let Err(e) = forwarded.await {
                debug!(error = %e, "output forwarding stopped");
                forwarding = false;
            }
        }

        if resolver.is_pending() {
            let text = String::from_utf8_lossy(&buf);
            if let Some(outcome) = watch.check(text.trim_end_matches(['\r', '\n'])) {
                resolver.resolve(outcome);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::io::{AsyncWriteExt, duplex, sink};

    use super::*;

    fn criteria(delay_ms: u64, success: Option<&str>, error: Option<&str>) -> Criteria {
        Criteria {
            delay: (delay_ms > 0).then(|| Duration::from_millis(delay_ms)),
            success: success.map(|s| MessagePattern::new(s).unwrap()),
            error: error.map(|s| MessagePattern::new(s).unwrap()),
        }
    }

    async fn run(
        out: &'static [u8],
        err: &'static [u8],
        exit: watch::Receiver<Option<ExitInfo>>,
        criteria: Criteria,
    ) -> Readiness {
        detect_into(out, sink(), err, sink(), exit, criteria).await
    }

    #[tokio::test]
    async fn success_line_resolves_ready_without_delay() {
        let (_tx, exit) = watch::channel(None);
        let out = run(
            b"booting\nserver listening\n",
            b"",
            exit,
            criteria(0, Some("^server listening$"), Some("Error:")),
        )
        .await;
        assert_eq!(out, Readiness::Ready);
    }

    #[tokio::test]
    async fn error_line_resolves_failed() {
        let (_tx, exit) = watch::channel(None);
        let out = run(
            b"",
            b"Error: cannot bind\n",
            exit,
            criteria(5_000, None, Some("Error:")),
        )
        .await;
        assert_eq!(out, Readiness::Failed("Error: cannot bind".into()));
    }

    #[tokio::test]
    async fn inspector_lines_are_not_errors() {
        let (_tx, exit) = watch::channel(None);
        let out = run(
            b"",
            b"Debugger listening on ws://127.0.0.1:9229/abc\n",
            exit,
            criteria(30, None, Some(".*")),
        )
        .await;
        assert_eq!(out, Readiness::Ready);
    }

    #[tokio::test]
    async fn silence_resolves_ready_after_delay() {
        let (_tx, exit) = watch::channel(None);
        let started = Instant::now();
        let out = run(b"", b"", exit, criteria(50, None, None)).await;
        assert_eq!(out, Readiness::Ready);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn exit_before_ready_is_failure() {
        let (tx, exit) = watch::channel(None);
        tx.send_replace(Some(ExitInfo {
            code: Some(1),
            signal: None,
        }));
        let out = run(b"", b"", exit, criteria(0, None, None)).await;
        assert_eq!(
            out,
            Readiness::Failed("exited before becoming ready (code 1)".into())
        );
    }

    #[tokio::test]
    async fn error_written_before_exit_beats_the_exit() {
        let (tx, exit) = watch::channel(None);
        tx.send_replace(Some(ExitInfo {
            code: Some(1),
            signal: None,
        }));
        let out = run(
            b"",
            b"Error: cannot bind\n",
            exit,
            criteria(0, None, Some("Error:")),
        )
        .await;
        assert_eq!(out, Readiness::Failed("Error: cannot bind".into()));
    }

    #[tokio::test]
    async fn exit_resolves_even_if_output_stays_open() {
        let (tx, exit) = watch::channel(None);
        let (_out_w, out_r) = duplex(64);
        tx.send_replace(Some(ExitInfo {
            code: Some(3),
            signal: None,
        }));
        let out = detect_into(out_r, sink(), &b""[..], sink(), exit, criteria(0, None, None)).await;
        assert_eq!(
            out,
            Readiness::Failed("exited before becoming ready (code 3)".into())
        );
    }

    #[tokio::test]
    async fn unterminated_output_is_matched_in_bounded_chunks() {
        let (_tx, exit) = watch::channel(None);
        let mut noise = vec![b'x'; MAX_LINE * 2];
        noise.extend_from_slice(b"Error: boom");
        let noise: &'static [u8] = Box::leak(noise.into_boxed_slice());

        let out = run(b"", noise, exit, criteria(0, None, Some("^Error: boom$"))).await;
        assert_eq!(out, Readiness::Failed("Error: boom".into()));
    }

    #[tokio::test]
    async fn broken_sink_stops_forwarding_but_not_matching() {
        let (_tx, exit) = watch::channel(None);
        let (sink_w, sink_r) = duplex(8);
        drop(sink_r);
        let out = detect_into(
            &b"noise\nserver listening\n"[..],
            sink_w,
            &b""[..],
            sink(),
            exit,
            criteria(0, Some("^server listening$"), None),
        )
        .await;
        assert_eq!(out, Readiness::Ready);
    }

    #[tokio::test]
    async fn first_signal_wins_and_later_ones_are_ignored() {
        let (_tx, exit) = watch::channel(None);
        let (mut out_w, out_r) = duplex(1024);
        let (mut err_w, err_r) = duplex(1024);

        let handle = tokio::spawn(detect_into(
            out_r,
            sink(),
            err_r,
            sink(),
            exit,
            criteria(0, Some("^server listening$"), Some("Error:")),
        ));

        out_w.write_all(b"server listening\n").await.unwrap();
        let outcome = handle.await.unwrap();
        err_w.write_all(b"Error: late\n").await.unwrap();

        assert_eq!(outcome, Readiness::Ready);
    }

    #[test]
    fn partial_lines_are_matched_without_terminator() {
        let w = Watch::Error(Some(MessagePattern::new("^Error: x$").unwrap()));
        assert_eq!(
            w.check("Error: x"),
            Some(Readiness::Failed("Error: x".into()))
        );
        assert!(is_inspector_line("Debugger attached."));
    }
}
