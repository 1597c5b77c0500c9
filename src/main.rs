//! frame-router server binary.
//!
//! Starts one server per configured endpoint, all sharing the built-in
//! dispatch table, and closes every connection on Ctrl-C.

use frame_router::codec::PacketCodec;
use frame_router::config::{Config, LogFormat};
use frame_router::handlers;
use frame_router::router::Router;
use frame_router::server::Server;
use std::sync::Arc;
use tracing::{debug, error, info, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Log files are named `frame-router.YYYY-MM-DD.log`.
const LOG_FILE_PREFIX: &str = "frame-router";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; the guard flushes the file writer on exit.
    let _log_guard = init_logging(&config)?;

    info!(
        servers = config.servers.len(),
        workers = ?config.workers,
        backlog = config.backlog,
        log_dir = ?config.log_dir,
        "Starting frame-router"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("frame-router-worker");
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    runtime.block_on(serve(config))
}

/// Console output always; a daily rolling file as well when `log_dir` is set.
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(format_layer(config.log_format, writer, false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(config.log_format, std::io::stdout, true))
        .with(file)
        .init();

    Ok(guard)
}

fn format_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(writer)
            .boxed(),
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let codec = PacketCodec::new(config.max_body_len);
    debug!(max_body_len = codec.max_body_len(), "Packet codec configured");
    let router = Arc::new(Router::new(
        Arc::new(handlers::default_table()),
        Arc::new(codec),
    ));

    let mut servers = Vec::with_capacity(config.servers.len());
    for entry in &config.servers {
        match Server::start(entry, config.backlog, Arc::clone(&router)).await {
            Ok(server) => servers.push(server),
            Err(e) => {
                error!(
                    server = %entry.name,
                    host = %entry.host,
                    port = entry.port,
                    error = %e,
                    "Failed to start server"
                );
            }
        }
    }

    if servers.is_empty() {
        return Err("no server could be started".into());
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    for server in &servers {
        if let Err(e) = server.stop().await {
            error!(server = %server.name(), error = %e, "Failed to stop server cleanly");
        }
    }

    Ok(())
}
