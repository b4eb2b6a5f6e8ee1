mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use broker_bus::{EventBus, FileRegistry};
use broker_config::Config;
use broker_dispatch::Dispatcher;
use broker_runtime::RequestRegistry;
use broker_signal::SignalManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    if cli.show_config {
        println!("{config:#?}");
        return Ok(());
    }

    init_logging(config.log_debug);

    let registry = Arc::new(RequestRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(config.clone(), Arc::clone(&registry)));

    let bus = EventBus::new(Duration::from_secs_f64(config.gui_grace_period_secs));
    bus.on_all_disconnected(|| {
        tracing::info!("dashboard has had no viewers past the grace period");
    });

    let mut dashboard_handle = None;
    if config.gui_enabled {
        let files = Arc::new(FileRegistry::new());
        match broker_bus::serve(&config.gui_host, config.gui_port, Arc::clone(&bus), files, config.gui_max_clients)
            .await
        {
            Ok(handle) => {
                let url = format!("http://{}", handle.local_addr);
                tracing::info!(%url, "dashboard bound");
                dispatcher.set_gui_url(Some(url));
                dashboard_handle = Some(handle);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to bind dashboard, continuing without it");
                dispatcher.set_gui_url(None);
            }
        }
    } else {
        dispatcher.set_gui_url(None);
    }

    let signals = SignalManager::new(Arc::clone(&registry), config.sigint_mode, config.sigint_double_tap_window);
    let signal_tasks = signals.install();

    let exit_code = tokio::select! {
        result = broker_mcp::serve_stdio(Arc::clone(&dispatcher), Some(Arc::clone(&bus))) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "MCP server exited with an error");
            }
            0
        }
        _ = signals.wait_for_shutdown() => {
            if signals.is_force_exit() {
                // 128 + signal number, the shell convention for a
                // signal-induced exit; SIGINT is always 2 on every
                // platform tokio::signal supports.
                128 + 2
            } else {
                0
            }
        }
    };

    for task in signal_tasks {
        task.abort();
    }
    if let Some(handle) = dashboard_handle {
        handle.abort();
    }

    std::process::exit(exit_code);
}

/// Redirects logging to a timestamped file under the OS temp directory
/// when `TASKBROKER_LOG_DEBUG` is set; otherwise logs to stderr, which is
/// always safe since the MCP transport owns stdout/stdin exclusively.
fn init_logging(log_debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_debug {
        let unix_ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!("taskbroker-{unix_ts}.log"));
        match std::fs::File::create(&path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(std::sync::Mutex::new(file)).with_ansi(false))
                    .init();
                tracing::info!(path = %path.display(), "logging to file");
                return;
            }
            Err(e) => {
                eprintln!("failed to open log file {}: {e}, falling back to stderr", path.display());
            }
        }
    }

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(std::io::stderr)).init();
}
