use clap::Parser;
use log::{error, info};
use server::context::{ServerConfig, ServerContext};
use server::levels::LevelCatalog;
use server::{dispatcher, listener};
use std::path::PathBuf;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};

/// Main-method of the application.
/// Parses command-line arguments, binds the rendezvous channel, and spawns
/// the listener and dispatcher actors.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Directory containing the .lvl level files
        levels_dir: PathBuf,
        /// Maximum number of concurrent game sessions
        max_games: usize,
        /// Path of the rendezvous channel clients connect to
        registry_path: PathBuf,
    }

    // Parse command line arguments
    let args = Args::parse();
    if args.max_games == 0 {
        eprintln!("max_games must be greater than 0");
        std::process::exit(1);
    }
    if let Err(e) = LevelCatalog::new(&args.levels_dir).level_names() {
        eprintln!("invalid levels directory: {e}");
        std::process::exit(1);
    }

    // Bind the rendezvous channel; failure here is process-fatal
    let _ = std::fs::remove_file(&args.registry_path);
    let registry = UnixListener::bind(&args.registry_path)?;

    let ctx = ServerContext::new(ServerConfig {
        levels_dir: args.levels_dir,
        max_games: args.max_games,
        registry_path: args.registry_path.clone(),
    });
    info!(
        "server starting: levels={} max_games={} registry={}",
        ctx.config.levels_dir.display(),
        ctx.config.max_games,
        ctx.config.registry_path.display()
    );

    // Spawn the listener and the dispatcher pool
    let listener_handle = tokio::spawn(listener::run(ctx.clone(), registry));
    let dispatcher_handles: Vec<_> = (0..ctx.config.max_games)
        .map(|id| tokio::spawn(dispatcher::run(ctx.clone(), id)))
        .collect();

    // Wait for a termination signal
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down gracefully"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully"),
    }

    // Stop admissions first, then let in-flight sessions drain to completion
    ctx.shutdown.trigger();
    if let Err(e) = listener_handle.await {
        error!("listener task panicked: {e}");
    }
    for (id, handle) in dispatcher_handles.into_iter().enumerate() {
        if let Err(e) = handle.await {
            error!("dispatcher {id} task panicked: {e}");
        }
    }

    // Every actor referencing the rendezvous channel has exited; reclaim it
    let _ = std::fs::remove_file(&ctx.config.registry_path);
    info!("server stopped");

    Ok(())
}
