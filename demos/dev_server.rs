//! # Example: dev_server
//!
//! Supervises a development server and restarts it whenever a line is typed.
//!
//! Shows how to:
//! - Attach the built-in [`LogWriter`] subscriber.
//! - Start a server with [`ServerOverrides`].
//! - Feed change notifications through [`Supervisor::pipe`].
//! - Return to a pristine state with [`Supervisor::reset`] on Ctrl-C.
//!
//! ## Flow
//! ```text
//! listen(cmd) ──► ServerSpawned ──► ServerListening
//!   stdin line ──► pipe([line]) ──► restart() ──► ServerStopped ──► ServerRestarted
//!   Ctrl-C     ──► reset() ──► ServerStopped ──► ConfigReset
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=devvisor=debug cargo run --example dev_server -- node server.js --port 1337
//! ```

use std::sync::Arc;

use devvisor::{LogWriter, ServerOverrides, Subscribe, Supervisor};
use futures::TryStreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devvisor=info")),
        )
        .init();

    let mut argv = std::env::args().skip(1);
    let Some(program) = argv.next() else {
        eprintln!("usage: dev_server <program> [args...]");
        std::process::exit(2);
    };

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder().with_subscribers(subs).build();

    if let Err(e) = sup.listen(ServerOverrides::new().path(program).args(argv)).await {
        if e.is_fatal() {
            return Err(e.into());
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(changed) => {
                    let forwarded: Vec<String> =
                        sup.pipe(futures::stream::iter([changed])).try_collect().await?;
                    println!("[demo] forwarded {forwarded:?}");
                }
                None => break,
            },
        }
    }

    let _ = sup.reset(None).await;
    Ok(())
}
