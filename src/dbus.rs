/// zbus backend for the [`SessionBus`] seam.
///
/// Owns the session bus connection, the `org.gnome.SessionManager` proxy, and
/// (after registration) the private `ClientPrivate` proxy. Signal watchers run
/// as detached tasks whose only side effect is sending a [`DaemonEvent`]; a
/// send into a dropped channel means the controller is gone and the watcher
/// just stops.
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::debug;
use zbus::fdo::{DBusProxy, RequestNameFlags, RequestNameReply};
use zbus::zvariant::OwnedObjectPath;
use zbus::{Connection, Proxy};

use crate::bus::{BusError, DaemonEvent, SessionBus, SessionSignal};

/// Well-known name this daemon claims on the session bus.
pub const DAEMON_BUS_NAME: &str = "org.gnome.SettingsDaemon";

const SESSION_MANAGER_NAME: &str = "org.gnome.SessionManager";
const CLIENT_PRIVATE_INTERFACE: &str = "org.gnome.SessionManager.ClientPrivate";

#[zbus::proxy(
    interface = "org.gnome.SessionManager",
    default_service = "org.gnome.SessionManager",
    default_path = "/org/gnome/SessionManager",
    gen_blocking = false
)]
trait SessionManager {
    fn register_client(
        &self,
        app_id: &str,
        client_startup_id: &str,
    ) -> zbus::Result<OwnedObjectPath>;

    fn setenv(&self, name: &str, value: &str) -> zbus::Result<()>;
}

pub struct SessionBusLink {
    connection: Connection,
    session_manager: SessionManagerProxy<'static>,
    client: Mutex<Option<Proxy<'static>>>,
    events: UnboundedSender<DaemonEvent>,
}

impl SessionBusLink {
    /// Connect to the session bus and resolve the session manager proxy.
    pub async fn connect(events: UnboundedSender<DaemonEvent>) -> Result<Self, BusError> {
        let connection = Connection::session()
            .await
            .map_err(|source| BusError::Connect { source })?;
        let session_manager = SessionManagerProxy::new(&connection)
            .await
            .map_err(|source| BusError::Connect { source })?;
        Ok(Self {
            connection,
            session_manager,
            client: Mutex::new(None),
            events,
        })
    }

    /// Watch for `NameLost` on our well-known name. Fires both for voluntary
    /// release and for involuntary loss; the controller's suppress flag tells
    /// the two apart.
    async fn watch_name_lost(&self) -> Result<(), zbus::Error> {
        let dbus = DBusProxy::new(&self.connection).await?;
        let mut lost = dbus.receive_name_lost().await?;
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(signal) = lost.next().await {
                let args = match signal.args() {
                    Ok(args) => args,
                    Err(_) => continue,
                };
                if args.name().as_str() != DAEMON_BUS_NAME {
                    continue;
                }
                if events.send(DaemonEvent::NameLost).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionBus for SessionBusLink {
    async fn request_name(&self, replace_existing: bool) {
        if let Err(err) = self.watch_name_lost().await {
            debug!(error = %err, "unable to watch for bus name loss");
        }

        // Never queue: a refused claim must come back as an immediate loss.
        let mut flags = RequestNameFlags::AllowReplacement | RequestNameFlags::DoNotQueue;
        if replace_existing {
            flags |= RequestNameFlags::ReplaceExisting;
        }

        let event = match self
            .connection
            .request_name_with_flags(DAEMON_BUS_NAME, flags)
            .await
        {
            Ok(RequestNameReply::PrimaryOwner) | Ok(RequestNameReply::AlreadyOwner) => {
                DaemonEvent::NameAcquired
            }
            Ok(reply) => {
                debug!(?reply, "bus name claim refused");
                DaemonEvent::NameLost
            }
            Err(err) => {
                debug!(error = %err, "bus name claim failed");
                DaemonEvent::NameLost
            }
        };
        let _ = self.events.send(event);
    }

    async fn release_name(&self) {
        match self.connection.release_name(DAEMON_BUS_NAME).await {
            Ok(released) => debug!(released, "released bus name"),
            Err(err) => debug!(error = %err, "unable to release bus name"),
        }
    }

    async fn setenv(&self, name: &str, value: &str) -> Result<(), BusError> {
        self.session_manager
            .setenv(name, value)
            .await
            .map_err(|source| BusError::Call {
                method: "Setenv",
                source,
            })
    }

    async fn register_client(
        &self,
        app_id: &str,
        startup_id: &str,
    ) -> Result<OwnedObjectPath, BusError> {
        self.session_manager
            .register_client(app_id, startup_id)
            .await
            .map_err(|source| BusError::Call {
                method: "RegisterClient",
                source,
            })
    }

    async fn open_client_channel(&self, client_path: &OwnedObjectPath) -> Result<(), BusError> {
        let proxy = Proxy::new(
            &self.connection,
            SESSION_MANAGER_NAME,
            client_path.clone(),
            CLIENT_PRIVATE_INTERFACE,
        )
        .await
        .map_err(|source| BusError::ClientChannel { source })?;

        let mut signals = proxy
            .receive_all_signals()
            .await
            .map_err(|source| BusError::ClientChannel { source })?;

        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(message) = signals.next().await {
                let header = message.header();
                let signal = match header.member().map(|m| m.as_str()) {
                    Some("QueryEndSession") => SessionSignal::QueryEndSession,
                    Some("EndSession") => SessionSignal::EndSession,
                    Some("Stop") => SessionSignal::Stop,
                    // No other signals are meaningful on this channel.
                    _ => continue,
                };
                if events.send(DaemonEvent::Session(signal)).is_err() {
                    break;
                }
            }
        });

        *self.client.lock().await = Some(proxy);
        Ok(())
    }

    async fn end_session_response(&self, is_ok: bool, reason: &str) -> Result<(), BusError> {
        let client = self.client.lock().await.clone();
        let client = client.ok_or(BusError::NoClientChannel)?;
        client
            .call_method("EndSessionResponse", &(is_ok, reason))
            .await
            .map(|_| ())
            .map_err(|source| BusError::Call {
                method: "EndSessionResponse",
                source,
            })
    }
}
