/// Session manager registration handshake and end-of-session replies.
use tracing::{debug, warn};

use crate::bus::SessionBus;

/// Application id presented to the session manager.
pub const APP_ID: &str = "gnome-settings-daemon";

/// Startup token handed to this process by the launching session. Empty when
/// the daemon was started outside a managed session.
pub fn startup_token() -> String {
    std::env::var("DESKTOP_AUTOSTART_ID").unwrap_or_default()
}

/// Register with the session manager, then open the private client channel.
///
/// Neither step is retried. A failed registration leaves the daemon running
/// unmanaged; a failed channel open leaves it registered but deaf to session
/// signals. Both are logged and otherwise ignored.
pub async fn register<B: SessionBus>(bus: &B, startup_token: &str) {
    let client_path = match bus.register_client(APP_ID, startup_token).await {
        Ok(path) => path,
        Err(err) => {
            warn!(error = %err, "unable to register with the session manager");
            return;
        }
    };
    debug!(path = %client_path, "registered session client");

    if let Err(err) = bus.open_client_channel(&client_path).await {
        debug!(error = %err, "unable to open the session client channel");
    }
}

/// Answer `QueryEndSession`/`EndSession` affirmatively. The daemon never
/// vetoes or delays the end of the session and has no unsaved state to
/// report.
pub async fn respond_to_end_session<B: SessionBus>(bus: &B) {
    if let Err(err) = bus.end_session_response(true, "").await {
        debug!(error = %err, "unable to send EndSessionResponse");
    }
}
