use std::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::bus::DaemonEvent;

/// Forward SIGTERM and SIGINT to the controller as `Terminate` events.
///
/// The spawned task never touches daemon state; it only enqueues a loop
/// wakeup, so every shutdown decision happens on the controller task.
pub fn forward_termination_signals(events: UnboundedSender<DaemonEvent>) -> io::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = term.recv() => {
                    if received.is_none() {
                        break;
                    }
                    debug!("received SIGTERM");
                }
                received = int.recv() => {
                    if received.is_none() {
                        break;
                    }
                    debug!("received SIGINT");
                }
            }
            if events.send(DaemonEvent::Terminate).is_err() {
                break;
            }
        }
    });
    Ok(())
}
