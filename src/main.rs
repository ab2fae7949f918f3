//! wetterochs: voice-assistant endpoint for the Wetterochs weather mail.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wetterochs::api::{self, ApiState};
use wetterochs::cache::FeedCache;
use wetterochs::config::Config;
use wetterochs::error::StoreError;
use wetterochs::feed::HttpFeedSource;
use wetterochs::refresh::RefreshLoop;
use wetterochs::store::CacheStore;

#[derive(Parser, Debug)]
#[command(name = "wetterochs", version, about = "Wetterochs weather mail for voice assistants")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IP to bind to
    #[arg(long)]
    ip: Option<String>,

    /// Port to use
    #[arg(short, long)]
    port: Option<u16>,

    /// Pid file to write
    #[arg(long)]
    pid: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

enum Exit {
    Signal,
    Server(Result<std::io::Result<()>, tokio::task::JoinError>),
    Refresh(Result<(), StoreError>),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=warn,reqwest=warn")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("wetterochs {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(args.config.as_deref());
    if let Some(ip) = args.ip {
        config.server.ip = ip;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.pid.is_some() {
        config.pid_file = args.pid;
    }

    if let Some(pid_file) = &config.pid_file {
        write_pid(pid_file)?;
    }

    let result = run(&config).await;
    if let Err(e) = &result {
        error!("{e}");
    }

    if let Some(pid_file) = &config.pid_file {
        if let Err(e) = std::fs::remove_file(pid_file) {
            warn!("Failed to remove pid file {}: {e}", pid_file.display());
        }
    }

    result
}

async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let cache = Arc::new(FeedCache::init(CacheStore::new(&config.cache.path))?);

    let source = Arc::new(HttpFeedSource::new(config.feed.timeout())?);
    let mut refresh = RefreshLoop::new(
        cache.clone(),
        source,
        config.feed.url.clone(),
        config.feed.refresh_interval(),
    )
    .start()
    .await?;

    let state = ApiState {
        cache,
        card_title: config.server.card_title.clone(),
    };
    let app = api::router(state, &config.server.route);
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr()).await?;

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(api::serve(listener, app, shutdown.clone()));

    let exit = tokio::select! {
        _ = shutdown_signal() => Exit::Signal,
        res = &mut server => Exit::Server(res),
        res = refresh.wait() => Exit::Refresh(res),
    };
    shutdown.cancel();

    match exit {
        Exit::Signal => {
            info!("Shutting down");
            refresh.stop().await?;
            server.await??;
            Ok(())
        }
        Exit::Server(res) => {
            refresh.stop().await?;
            res??;
            warn!("Server stopped unexpectedly");
            Ok(())
        }
        Exit::Refresh(res) => {
            match server.await {
                Ok(Err(e)) => warn!("Server error during shutdown: {e}"),
                Err(e) => warn!("Server task failed: {e}"),
                Ok(Ok(())) => {}
            }
            res?;
            Ok(())
        }
    }
}

fn write_pid(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, std::process::id().to_string())?;
    info!("Wrote pid file {}", path.display());
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
