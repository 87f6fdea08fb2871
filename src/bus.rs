/// Seam between the daemon controller and the session bus.
///
/// The controller never talks to the bus directly; it drives a [`SessionBus`]
/// implementation and consumes [`DaemonEvent`]s from a channel. Everything
/// that happens asynchronously on the bus (name grants, name loss, session
/// lifecycle signals) arrives as an event, so all daemon state lives on one
/// task and needs no locking.
use async_trait::async_trait;
use zbus::zvariant::OwnedObjectPath;

/// Session lifecycle signals delivered on the per-client control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    QueryEndSession,
    EndSession,
    Stop,
}

/// Events consumed by the daemon controller loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonEvent {
    /// Our claim on the well-known name was granted.
    NameAcquired,
    /// The well-known name is no longer ours (refused claim, voluntary
    /// release, replacement by another owner, or the bus going away).
    NameLost,
    /// A signal from the session manager's private client channel.
    Session(SessionSignal),
    /// SIGTERM/SIGINT, or the `--timed-exit` timer firing.
    Terminate,
}

/// Errors from session bus calls.
#[derive(Debug)]
pub enum BusError {
    /// Could not reach the session bus at all.
    Connect { source: zbus::Error },
    /// A method call on the session manager failed.
    Call {
        method: &'static str,
        source: zbus::Error,
    },
    /// The private client channel could not be opened.
    ClientChannel { source: zbus::Error },
    /// EndSessionResponse requested before a client channel exists.
    NoClientChannel,
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::Connect { source } => {
                write!(f, "failed to connect to the session bus: {}", source)
            }
            BusError::Call { method, source } => {
                write!(f, "{} call failed: {}", method, source)
            }
            BusError::ClientChannel { source } => {
                write!(f, "failed to open the session client channel: {}", source)
            }
            BusError::NoClientChannel => {
                write!(f, "no session client channel is open")
            }
        }
    }
}

impl std::error::Error for BusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BusError::Connect { source } => Some(source),
            BusError::Call { source, .. } => Some(source),
            BusError::ClientChannel { source } => Some(source),
            BusError::NoClientChannel => None,
        }
    }
}

/// The bus operations the daemon core needs.
///
/// `request_name` reports its outcome through the event channel rather than a
/// return value: exactly one of `NameAcquired`/`NameLost` follows every claim
/// attempt, and later involuntary losses surface as further `NameLost` events.
#[async_trait]
pub trait SessionBus: Send + Sync + 'static {
    /// Claim the well-known name, allowing a later instance to replace us and
    /// optionally replacing an existing owner.
    async fn request_name(&self, replace_existing: bool);

    /// Voluntarily relinquish the well-known name. Releasing a name we do not
    /// hold is a no-op.
    async fn release_name(&self);

    /// Push one variable into the session environment. Only valid before the
    /// first client registers.
    async fn setenv(&self, name: &str, value: &str) -> Result<(), BusError>;

    /// Register this process as a session client; returns the client's object
    /// path within the session manager.
    async fn register_client(
        &self,
        app_id: &str,
        startup_id: &str,
    ) -> Result<OwnedObjectPath, BusError>;

    /// Open the private control channel scoped to a registered client path.
    /// Lifecycle signals start flowing as `DaemonEvent::Session` afterwards.
    async fn open_client_channel(&self, client_path: &OwnedObjectPath) -> Result<(), BusError>;

    /// Answer an end-session query on the private channel.
    async fn end_session_response(&self, is_ok: bool, reason: &str) -> Result<(), BusError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// One recorded call against the fake bus, in issuance order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum BusCall {
        RequestName { replace_existing: bool },
        ReleaseName,
        Setenv { name: String, value: String },
        RegisterClient { app_id: String, startup_id: String },
        OpenClientChannel { client_path: String },
        EndSessionResponse { is_ok: bool, reason: String },
    }

    /// In-memory [`SessionBus`] that records calls. Tests inject
    /// `DaemonEvent`s directly instead of having the fake emit them.
    #[derive(Default)]
    pub struct RecordingBus {
        pub calls: Mutex<Vec<BusCall>>,
        pub fail_register: bool,
        pub fail_channel: bool,
    }

    impl RecordingBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<BusCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: BusCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl SessionBus for RecordingBus {
        async fn request_name(&self, replace_existing: bool) {
            self.record(BusCall::RequestName { replace_existing });
        }

        async fn release_name(&self) {
            self.record(BusCall::ReleaseName);
        }

        async fn setenv(&self, name: &str, value: &str) -> Result<(), BusError> {
            self.record(BusCall::Setenv {
                name: name.to_string(),
                value: value.to_string(),
            });
            Ok(())
        }

        async fn register_client(
            &self,
            app_id: &str,
            startup_id: &str,
        ) -> Result<OwnedObjectPath, BusError> {
            self.record(BusCall::RegisterClient {
                app_id: app_id.to_string(),
                startup_id: startup_id.to_string(),
            });
            if self.fail_register {
                return Err(BusError::Call {
                    method: "RegisterClient",
                    source: zbus::Error::Failure("no session manager".to_string()),
                });
            }
            Ok(OwnedObjectPath::try_from("/org/gnome/SessionManager/Client1").unwrap())
        }

        async fn open_client_channel(&self, client_path: &OwnedObjectPath) -> Result<(), BusError> {
            self.record(BusCall::OpenClientChannel {
                client_path: client_path.to_string(),
            });
            if self.fail_channel {
                return Err(BusError::ClientChannel {
                    source: zbus::Error::Failure("no such client".to_string()),
                });
            }
            Ok(())
        }

        async fn end_session_response(&self, is_ok: bool, reason: &str) -> Result<(), BusError> {
            self.record(BusCall::EndSessionResponse {
                is_ok,
                reason: reason.to_string(),
            });
            Ok(())
        }
    }
}
