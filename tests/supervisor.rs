#![cfg(unix)]

use std::future::Future;
use std::time::{Duration, Instant};

use devvisor::{
    EventKind, MessagePattern, ServerConfig, ServerError, ServerOverrides, Signal, Supervisor,
};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::broadcast;

const READY_AND_WAIT: &str = "echo 'server listening'; exec sleep 30";

fn app(script: &str) -> ServerOverrides {
    ServerOverrides::new().path("sh").args(["-c", script])
}

async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("operation timed out")
}

fn drain(rx: &mut broadcast::Receiver<devvisor::Event>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        kinds.push(ev.kind);
    }
    kinds
}

async fn next_kind(rx: &mut broadcast::Receiver<devvisor::Event>, kind: EventKind) {
    within(async {
        loop {
            if rx.recv().await.unwrap().kind == kind {
                return;
            }
        }
    })
    .await;
}

#[tokio::test]
async fn listen_resolves_on_success_message_and_kill_stops() {
    let sup = Supervisor::new(ServerConfig::default());

    let pid = within(sup.listen(app(READY_AND_WAIT))).await.unwrap();
    assert!(sup.is_running());
    assert_eq!(sup.pid(), Some(pid));

    within(sup.kill(None)).await.unwrap();
    assert!(!sup.is_running());
    assert_eq!(sup.pid(), None);
}

#[tokio::test]
async fn second_listen_is_already_started_and_keeps_process() {
    let sup = Supervisor::new(ServerConfig::default());
    let pid = within(sup.listen(app(READY_AND_WAIT))).await.unwrap();

    let err = within(sup.listen(app("exit 0"))).await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyStarted));
    assert_eq!(sup.pid(), Some(pid));
    assert_eq!(sup.config().args[1], READY_AND_WAIT);

    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn listen_while_starting_is_already_started() {
    let sup = Supervisor::new(ServerConfig::default());
    let first = {
        let sup = sup.clone();
        let slow = app("sleep 0.2; echo 'server listening'; exec sleep 30");
        tokio::spawn(async move { sup.listen(slow).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = within(sup.listen(ServerOverrides::new())).await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyStarted));

    within(first).await.unwrap().unwrap();
    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn error_line_fails_readiness_and_leaves_slot_empty() {
    let sup = Supervisor::new(ServerConfig::default());

    let err = within(sup.listen(app("echo 'Error: cannot bind' >&2; exec sleep 30")))
        .await
        .unwrap_err();
    match err {
        ServerError::NotReady { reason } => assert_eq!(reason, "Error: cannot bind"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!sup.is_running());

    // The slot is free again.
    within(sup.listen(app(READY_AND_WAIT))).await.unwrap();
    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn error_then_exit_reports_the_error_line() {
    let sup = Supervisor::new(ServerConfig::default());

    for _ in 0..10 {
        let err = within(sup.listen(app("echo 'Error: cannot bind' >&2; exit 1")))
            .await
            .unwrap_err();
        match err {
            ServerError::NotReady { reason } => assert_eq!(reason, "Error: cannot bind"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!sup.is_running());
    }
}

#[tokio::test]
async fn silent_process_is_ready_after_delay() {
    let sup = Supervisor::new(ServerConfig::default());
    let started = Instant::now();

    within(sup.listen(app("exec sleep 30").delay_ms(50)))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(sup.is_running());

    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn exit_before_ready_is_not_ready() {
    let sup = Supervisor::new(ServerConfig::default());

    let err = within(sup.listen(app("exit 2").delay_ms(0)))
        .await
        .unwrap_err();
    match err {
        ServerError::NotReady { reason } => assert!(reason.contains("code 2"), "{reason}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!sup.is_running());
}

#[tokio::test]
async fn debugger_banner_is_not_an_error() {
    let sup = Supervisor::new(ServerConfig::default());
    let script = "echo 'Debugger listening on ws://127.0.0.1:9229/x' >&2; \
                  echo 'For help, see: https://nodejs.org/en/docs/inspector' >&2; \
                  sleep 0.1; echo 'server listening'; exec sleep 30";

    let overrides = app(script).error_message(Some(MessagePattern::new(".+").unwrap()));
    within(sup.listen(overrides)).await.unwrap();

    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn error_after_success_is_ignored() {
    let sup = Supervisor::new(ServerConfig::default());
    let script = "echo 'server listening'; sleep 0.1; echo 'Error: late' >&2; exec sleep 30";

    let pid = within(sup.listen(app(script))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(sup.pid(), Some(pid));

    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn development_marker_is_set() {
    let sup = Supervisor::new(ServerConfig::default());
    let script = "[ \"$APP_ENV\" = development ] || exit 1; echo 'server listening'; exec sleep 30";

    within(sup.listen(app(script).delay_ms(0))).await.unwrap();
    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn kill_with_nothing_running_is_already_stopped() {
    let sup = Supervisor::new(ServerConfig::default());
    let err = sup.kill(Some(Signal::SIGINT)).await.unwrap_err();
    assert!(err.is_already());
}

#[tokio::test]
async fn concurrent_kills_signal_and_report_once() {
    let sup = Supervisor::new(ServerConfig::default());
    within(sup.listen(app(READY_AND_WAIT))).await.unwrap();
    let mut rx = sup.subscribe();

    let (a, b) = within(async { tokio::join!(sup.kill(None), sup.kill(None)) }).await;
    assert!(a.is_ok());
    assert!(b.is_ok());

    let stopped = drain(&mut rx)
        .into_iter()
        .filter(|k| *k == EventKind::ServerStopped)
        .count();
    assert_eq!(stopped, 1);
    assert!(!sup.is_running());
}

#[tokio::test]
async fn unsolicited_exit_clears_the_slot() {
    let sup = Supervisor::new(ServerConfig::default());
    let mut rx = sup.subscribe();

    within(sup.listen(app("echo 'server listening'; sleep 0.1")))
        .await
        .unwrap();
    next_kind(&mut rx, EventKind::ServerExited).await;

    assert!(!sup.is_running());
    assert!(matches!(
        sup.kill(None).await.unwrap_err(),
        ServerError::AlreadyStopped
    ));
}

#[tokio::test]
async fn concurrent_restarts_are_single_flight() {
    let sup = Supervisor::new(ServerConfig::default());
    let pid = within(sup.listen(app(READY_AND_WAIT))).await.unwrap();

    let (a, b) = within(async { tokio::join!(sup.restart(), sup.restart()) }).await;
    let new_pid = a.unwrap();
    assert_ne!(new_pid, pid);
    assert!(matches!(b.unwrap_err(), ServerError::AlreadyRestarting));
    assert_eq!(sup.pid(), Some(new_pid));

    // Guard released.
    within(sup.changed()).await.unwrap();
    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn restart_reports_lifecycle_in_order() {
    let sup = Supervisor::new(ServerConfig::default());
    let mut rx = sup.subscribe();

    within(sup.listen(app(READY_AND_WAIT))).await.unwrap();
    within(sup.restart()).await.unwrap();
    within(sup.kill(None)).await.unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            EventKind::ServerSpawned,
            EventKind::ServerListening,
            EventKind::ServerStopped,
            EventKind::ServerSpawned,
            EventKind::ServerListening,
            EventKind::ServerRestarted,
            EventKind::ServerStopped,
        ]
    );
}

#[tokio::test]
async fn restart_cold_starts_configured_server() {
    let sup = Supervisor::new(ServerConfig::default());
    within(sup.listen(app(READY_AND_WAIT))).await.unwrap();
    within(sup.kill(None)).await.unwrap();

    let pid = within(sup.restart()).await.unwrap();
    assert_eq!(sup.pid(), Some(pid));

    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn restart_without_path_is_fatal() {
    let sup = Supervisor::new(ServerConfig::default());
    let err = sup.restart().await.unwrap_err();
    assert!(matches!(err, ServerError::NotStarted));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn failed_restart_releases_guard_and_empties_slot() {
    let marker = std::env::temp_dir().join(format!("devvisor-restart-{}", std::process::id()));
    let _ = std::fs::remove_file(&marker);
    let script = format!(
        "if [ -e '{m}' ]; then echo 'Error: second boot' >&2; exit 1; fi; touch '{m}'; {READY_AND_WAIT}",
        m = marker.display()
    );

    let sup = Supervisor::new(ServerConfig::default());
    within(sup.listen(app(&script))).await.unwrap();
    let mut rx = sup.subscribe();

    let err = within(sup.restart()).await.unwrap_err();
    match err {
        ServerError::NotReady { reason } => assert_eq!(reason, "Error: second boot"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!sup.is_running());
    assert_eq!(sup.pid(), None);
    assert!(!drain(&mut rx).contains(&EventKind::ServerRestarted));

    // The guard is free: a second attempt runs instead of being rejected.
    let again = within(sup.restart()).await.unwrap_err();
    assert!(matches!(again, ServerError::NotReady { .. }), "{again:?}");

    std::fs::remove_file(&marker).unwrap();
    let pid = within(sup.restart()).await.unwrap();
    assert_eq!(sup.pid(), Some(pid));

    within(sup.kill(None)).await.unwrap();
    let _ = std::fs::remove_file(&marker);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let defaults = ServerConfig::default();
    let sup = Supervisor::new(defaults.clone());
    within(sup.listen(app(READY_AND_WAIT).delay_ms(100)))
        .await
        .unwrap();

    within(sup.reset(None)).await.unwrap();
    let once = sup.config();
    let again = within(sup.reset(Some(Signal::SIGKILL))).await;

    assert!(matches!(again, Err(ServerError::AlreadyStopped)));
    assert_eq!(once, defaults);
    assert_eq!(sup.config(), defaults);
}

#[tokio::test]
async fn pipe_restarts_once_per_batch_and_forwards_items() {
    let sup = Supervisor::new(ServerConfig::default());
    let pid = within(sup.listen(app(READY_AND_WAIT))).await.unwrap();

    let batch = futures::stream::iter(["a.rs", "b.rs", "c.rs"]);
    let items: Vec<_> = within(sup.pipe(batch).try_collect()).await.unwrap();
    assert_eq!(items, ["a.rs", "b.rs", "c.rs"]);

    let restarted = sup.pid().unwrap();
    assert_ne!(restarted, pid);

    // An empty batch never restarts.
    let batch = futures::stream::iter(Vec::<&str>::new());
    let empty: Vec<&str> = within(sup.pipe(batch).try_collect()).await.unwrap();
    assert!(empty.is_empty());
    assert_eq!(sup.pid(), Some(restarted));

    within(sup.kill(None)).await.unwrap();
}

#[tokio::test]
async fn pipe_ends_with_fatal_restart_error() {
    let sup = Supervisor::new(ServerConfig::default());
    let items: Vec<Result<u32, ServerError>> =
        within(sup.pipe(futures::stream::iter([1, 2])).collect()).await;

    assert_eq!(items.len(), 1);
    match &items[0] {
        Err(e) => {
            assert!(matches!(e, ServerError::NotStarted));
            assert!(e.is_fatal());
        }
        Ok(item) => panic!("forwarded {item} after a fatal restart error"),
    }
}

#[tokio::test]
async fn pipe_forwards_when_restart_fails_at_runtime() {
    let sup = Supervisor::new(ServerConfig::default());
    let err = within(sup.listen(app("echo 'Error: cannot bind' >&2; exit 1")))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NotReady { .. }));

    let items: Vec<u32> = within(sup.pipe(futures::stream::iter([1, 2])).try_collect())
        .await
        .unwrap();
    assert_eq!(items, [1, 2]);
    assert!(!sup.is_running());
}
