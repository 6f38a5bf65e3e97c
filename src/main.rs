//! ccdb server
//!
//! Replays the append-only file, starts the expiry sweeper and serves
//! clients until Ctrl+C.

use anyhow::Context;
use ccdb::commands::CommandHandler;
use ccdb::connection::handle_connection;
use ccdb::persistence::{replay, AppendOnlyFile, FsyncPolicy, NoPersistence, Persistence};
use ccdb::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// A Redis-compatible in-memory datastore
#[derive(Parser, Debug)]
#[command(name = "ccdb", version, about)]
struct ServerArgs {
    /// Host to bind to
    #[arg(long, default_value = ccdb::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = ccdb::DEFAULT_PORT)]
    port: u16,

    /// Path of the append-only file
    #[arg(long, default_value = ccdb::DEFAULT_AOF_FILE)]
    aof: PathBuf,

    /// Run without persistence
    #[arg(long)]
    no_aof: bool,

    /// When to fsync the append-only file: always or no
    #[arg(long, default_value = "no", value_parser = parse_fsync_policy)]
    appendfsync: FsyncPolicy,

    /// Milliseconds between active expiry cycles
    #[arg(long, default_value_t = 100)]
    expiry_interval_ms: u64,
}

impl ServerArgs {
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_fsync_policy(s: &str) -> Result<FsyncPolicy, String> {
    s.parse()
}

fn print_banner(args: &ServerArgs) {
    println!(
        r#"
  ccdb v{} - Redis-compatible in-memory datastore
──────────────────────────────────────────────────
Server started on {}
Persistence: {}

Use Ctrl+C to shutdown gracefully.
"#,
        ccdb::VERSION,
        args.bind_address(),
        if args.no_aof {
            "disabled".to_string()
        } else {
            format!("{} (appendfsync {})", args.aof.display(), args.appendfsync)
        }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ccdb=info")),
        )
        .with_target(false)
        .init();

    print_banner(&args);

    let storage = Arc::new(StorageEngine::new());

    // Rebuild state before accepting clients, then log new writes to the same file
    let persistence: Arc<dyn Persistence> = if args.no_aof {
        info!("Append-only file disabled");
        Arc::new(NoPersistence)
    } else {
        let replayed = replay(&args.aof, &storage)
            .with_context(|| format!("failed to replay {}", args.aof.display()))?;
        info!(applied = replayed, keys = storage.len(), "Dataset loaded");

        let aof = AppendOnlyFile::open(&args.aof, args.appendfsync)
            .with_context(|| format!("failed to open {}", args.aof.display()))?;
        Arc::new(aof)
    };

    let _sweeper = ExpirySweeper::start(
        Arc::clone(&storage),
        ExpiryConfig {
            interval: Duration::from_millis(args.expiry_interval_ms),
        },
    );

    let handler = CommandHandler::new(storage, persistence);

    let listener = TcpListener::bind(args.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", args.bind_address()))?;
    info!("Listening on {}", args.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, handler) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn accept_loop(listener: TcpListener, handler: CommandHandler) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, handler.clone()));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
