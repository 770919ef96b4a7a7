//! VFSX decision daemon
//!
//! Listens on the bridge socket and answers every request from a policy.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vfsx_daemon::{AllowAllPolicy, DecisionServer, PolicyFile, PolicyHandler};

/// VFSX decision daemon - answers bridge requests from a policy
#[derive(Parser, Debug)]
#[command(name = "vfsx-daemon")]
#[command(about = "Reference decision process for the VFSX filesystem bridge")]
struct Args {
    /// Socket to listen on
    #[arg(long, default_value = vfsx::DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// JSON policy file; everything is allowed without one
    #[arg(long)]
    policy: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let handler: Arc<dyn PolicyHandler> = match &args.policy {
        Some(path) => {
            let policy = PolicyFile::load(path)
                .and_then(PolicyFile::into_policy)
                .with_context(|| format!("load policy {}", path.display()))?;
            tracing::info!(path = %path.display(), rules = policy.len(), "policy loaded");
            Arc::new(policy)
        }
        None => {
            tracing::warn!("no policy given, allowing every operation");
            Arc::new(AllowAllPolicy)
        }
    };

    let server = DecisionServer::new(&args.socket, handler);
    tokio::select! {
        result = server.run() => result?,
        () = shutdown_signal() => tracing::info!(socket = %args.socket.display(), "decision process stopping"),
    }

    if let Err(err) = std::fs::remove_file(&args.socket) {
        tracing::debug!(error = %err, "socket already gone");
    }
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = async {
        match signal(SignalKind::interrupt()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot watch SIGINT, only SIGTERM stops the daemon");
                std::future::pending::<()>().await;
            }
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot watch SIGTERM, only SIGINT stops the daemon");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => tracing::debug!(signal = "SIGINT", "stop requested"),
        () = terminate => tracing::debug!(signal = "SIGTERM", "stop requested"),
    }
}
