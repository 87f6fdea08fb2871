mod bus;
mod daemon;
mod dbus;
mod environment;
mod manager;
mod prefs;
mod session;
mod signals;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::daemon::{Daemon, DaemonOptions};
use crate::prefs::LocalePrefs;

/// Session-managed settings daemon: owns the org.gnome.SettingsDaemon bus
/// name, registers with the session manager, propagates session environment
/// variables, and sequences shutdown.
#[derive(Parser, Debug)]
#[command(name = "settingsd", version, about)]
struct Cli {
    /// Enable debugging output
    #[arg(long)]
    debug: bool,

    /// Replace an existing daemon holding the bus name
    #[arg(short = 'r', long)]
    replace: bool,

    /// Exit after 30 seconds (for debugging)
    #[arg(long)]
    timed_exit: bool,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);
    tracing::debug!("settings daemon starting");

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    if let Err(err) = signals::forward_termination_signals(events_tx.clone()) {
        tracing::error!(error = %err, "unable to install signal handlers");
        return ExitCode::FAILURE;
    }

    let link = match dbus::SessionBusLink::connect(events_tx.clone()).await {
        Ok(link) => link,
        Err(err) => {
            // Same terminal case as losing the name: nothing to serve without
            // a bus, and nothing was claimed yet.
            tracing::warn!(error = %err, "session bus unreachable, shutting down");
            return ExitCode::SUCCESS;
        }
    };

    let options = DaemonOptions {
        replace: cli.replace,
        timed_exit: cli.timed_exit,
        startup_token: session::startup_token(),
        prefs_path: LocalePrefs::default_path(),
    };
    let mut daemon = Daemon::new(Arc::new(link), events_tx, events_rx, options);
    daemon.run().await;

    ExitCode::SUCCESS
}
