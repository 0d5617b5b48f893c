use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::ratelimit::{Limiter, Sweeper, WindowStore};

/// Check rate limits for commands read from stdin.
///
/// Commands, one per line:
///   check <category> <key>
///   clear <key>
///   stats
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log as JSON lines regardless of configuration
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = TurnstileConfig::load(args.config.as_deref())?;

    init_tracing(&config.logging, args.json_logs);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(WindowStore::new());
    let limiter = Limiter::new(store.clone(), config.policy_table()?);
    let sweeper = Sweeper::start(store, config.sweep.interval());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = run_command(&limiter, &config.rejection.message, &line);
                println!("{}", reply);
            }
            _ = &mut shutdown => break,
        }
    }

    sweeper.stop().await;
    info!("Turnstile stopped");
    Ok(())
}

/// Execute one command line and describe the result as JSON.
fn run_command(limiter: &Limiter, limited_message: &str, line: &str) -> Value {
    let parts: Vec<&str> = line.split_whitespace().collect();

    match parts.as_slice() {
        ["check", category, key] => match limiter.check_named(key, category) {
            Ok(decision) if decision.is_limited => json!({
                "key": key,
                "decision": decision,
                "rejection": decision.rejection_payload(limited_message),
            }),
            Ok(decision) => json!({ "key": key, "decision": decision }),
            Err(e) => json!({ "error": e.to_string() }),
        },
        ["clear", key] => {
            limiter.clear(key);
            json!({ "cleared": key })
        }
        ["stats"] => json!({ "entries": limiter.store().len() }),
        _ => json!({ "error": format!("unrecognised command: {}", line.trim()) }),
    }
}

fn init_tracing(logging: &LoggingConfig, force_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json || force_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
