/// Daemon controller: one task owning all mutable daemon state.
///
/// The controller claims the well-known bus name, runs the startup pipeline
/// when the claim is granted (environment propagation, settings manager,
/// session registration), then services lifecycle events until a terminal
/// shutdown trigger. Auxiliary tasks (bus watchers, the signal forwarder, the
/// timed-exit timer) communicate with it exclusively through the event
/// channel, so none of the fields below need locking.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::bus::{DaemonEvent, SessionBus, SessionSignal};
use crate::environment;
use crate::manager::SettingsManager;
use crate::prefs::LocalePrefs;
use crate::session;

/// Forced shutdown delay for `--timed-exit`.
const TIMED_EXIT_DELAY: Duration = Duration::from_secs(30);

/// The three independent shutdown triggers the coordinator reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownTrigger {
    /// `Stop` on the session client channel.
    StopRequested,
    /// SIGTERM/SIGINT, or the timed-exit timer.
    TerminationSignal,
    /// `NameLost` from the bus.
    NameLost,
}

/// What the coordinator does in response to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownOutcome {
    /// Release the bus name but keep the process resident.
    Dormant,
    /// Stop the event loop and exit.
    Terminal,
    /// Expected name loss after a voluntary release: clear the bookkeeping,
    /// change nothing else.
    Absorb,
}

/// The shutdown decision table.
///
/// `suppress_name_lost` distinguishes a name loss we caused from one
/// inflicted on us; it only matters for `NameLost`. Stop requests go dormant
/// rather than terminal: the session manager takes the name disappearing as
/// this client disconnecting (its disconnect detection keys on the name, not
/// the connection), while still-mapped clients keep the state they inherited
/// from us only as long as the process lives.
fn shutdown_outcome(trigger: ShutdownTrigger, suppress_name_lost: bool) -> ShutdownOutcome {
    match trigger {
        ShutdownTrigger::StopRequested => ShutdownOutcome::Dormant,
        ShutdownTrigger::TerminationSignal => ShutdownOutcome::Terminal,
        ShutdownTrigger::NameLost if suppress_name_lost => ShutdownOutcome::Absorb,
        ShutdownTrigger::NameLost => ShutdownOutcome::Terminal,
    }
}

/// Controller options resolved from the CLI and process environment.
pub struct DaemonOptions {
    pub replace: bool,
    pub timed_exit: bool,
    pub startup_token: String,
    pub prefs_path: PathBuf,
}

pub struct Daemon<B: SessionBus> {
    bus: Arc<B>,
    events_tx: UnboundedSender<DaemonEvent>,
    events: UnboundedReceiver<DaemonEvent>,
    options: DaemonOptions,
    manager: Option<SettingsManager>,
    /// Whether we currently hold the well-known name.
    name_held: bool,
    /// Set strictly before a voluntary release; see [`shutdown_outcome`].
    suppress_name_lost: bool,
}

impl<B: SessionBus> Daemon<B> {
    pub fn new(
        bus: Arc<B>,
        events_tx: UnboundedSender<DaemonEvent>,
        events: UnboundedReceiver<DaemonEvent>,
        options: DaemonOptions,
    ) -> Self {
        Self {
            bus,
            events_tx,
            events,
            options,
            manager: None,
            name_held: false,
            suppress_name_lost: false,
        }
    }

    /// Claim the bus name and service events until a terminal shutdown.
    pub async fn run(&mut self) {
        self.bus.request_name(self.options.replace).await;

        if self.options.timed_exit {
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(TIMED_EXIT_DELAY).await;
                debug!("timed exit");
                let _ = events.send(DaemonEvent::Terminate);
            });
        }

        while let Some(event) = self.events.recv().await {
            let trigger = match event {
                DaemonEvent::NameAcquired => {
                    if self.on_name_acquired().await {
                        continue;
                    }
                    break;
                }
                DaemonEvent::Session(SessionSignal::QueryEndSession)
                | DaemonEvent::Session(SessionSignal::EndSession) => {
                    debug!("answering end-session request");
                    session::respond_to_end_session(self.bus.as_ref()).await;
                    continue;
                }
                DaemonEvent::Session(SessionSignal::Stop) => {
                    debug!("got Stop signal");
                    ShutdownTrigger::StopRequested
                }
                DaemonEvent::NameLost => ShutdownTrigger::NameLost,
                DaemonEvent::Terminate => ShutdownTrigger::TerminationSignal,
            };

            match shutdown_outcome(trigger, self.suppress_name_lost) {
                ShutdownOutcome::Dormant => self.enter_dormant().await,
                ShutdownOutcome::Absorb => {
                    debug!("expected name loss after voluntary release");
                    self.suppress_name_lost = false;
                    self.name_held = false;
                }
                ShutdownOutcome::Terminal => {
                    if trigger == ShutdownTrigger::NameLost {
                        // The loss already destroyed our claim; nothing left
                        // to release during cleanup.
                        warn!("bus name taken or bus connection lost, shutting down");
                        self.name_held = false;
                    } else {
                        debug!("received termination request, shutting down");
                    }
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// Startup pipeline, in the order the session protocol demands:
    /// environment propagation must be issued before client registration
    /// because the session manager rejects Setenv once any client has
    /// registered. Returns false if the settings manager failed to start.
    async fn on_name_acquired(&mut self) -> bool {
        debug!("acquired bus name");
        self.name_held = true;

        let prefs = LocalePrefs::load(&self.options.prefs_path);
        environment::propagate_locale_overrides(self.bus.as_ref(), &prefs).await;
        environment::propagate_legacy_input_method_vars(self.bus.as_ref()).await;

        let mut manager = SettingsManager::new();
        if let Err(err) = manager.start() {
            warn!(error = %err, "unable to start the settings manager");
            return false;
        }
        self.manager = Some(manager);

        session::register(self.bus.as_ref(), &self.options.startup_token).await;
        true
    }

    /// Stop handling: release the name, keep running. Exiting here would
    /// strip inherited theming and state from clients that are still mapped,
    /// so the process stays resident until a termination signal arrives.
    async fn enter_dormant(&mut self) {
        debug!("session stop requested, releasing bus name and staying resident");
        if self.name_held {
            // Before the release, so the resulting NameLost reads as voluntary.
            self.suppress_name_lost = true;
            self.bus.release_name().await;
            self.name_held = false;
        }
    }

    /// Terminal cleanup. Guarded so a second invocation has nothing left to
    /// release or stop.
    async fn shutdown(&mut self) {
        debug!("shutting down");
        if self.name_held {
            self.suppress_name_lost = true;
            self.bus.release_name().await;
            self.name_held = false;
        }
        if let Some(mut manager) = self.manager.take() {
            manager.stop();
        }
        debug!("settings daemon finished");
    }
}
