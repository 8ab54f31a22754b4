use std::sync::Arc;

use clap::Parser;
use devproxy::cli::Cli;
use devproxy::engine::InterceptionEngine;
use devproxy::logging;
use devproxy::platform::NoopPlatformAdapter;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(command) = &cli.command {
        std::process::exit(command.run());
    }

    let engine = match InterceptionEngine::from_cli(&cli, Arc::new(NoopPlatformAdapter)) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to start devproxy: {err}");
            std::process::exit(1);
        }
    };

    logging::init_env_logger(&engine.config.log_level);

    let cancellation = CancellationToken::new();
    let shutdown_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("ctrl-c received, shutting down");
            shutdown_token.cancel();
        }
    });

    let hotkeys_state = engine.state.clone();
    let hotkeys_urls = engine.urls.clone();
    let hotkeys_events = engine.events.clone();
    let hotkeys_token = cancellation.clone();
    tokio::spawn(devproxy::hotkeys::run(
        hotkeys_state,
        hotkeys_urls,
        hotkeys_events,
        hotkeys_token,
    ));

    if let Err(err) = engine.run(cancellation).await {
        eprintln!("devproxy exited with error: {err}");
        std::process::exit(1);
    }
}
