use tracing::debug;

/// Handle to the settings plugin subsystem.
///
/// Plugin discovery and per-plugin lifecycle live behind this boundary; the
/// daemon core only starts and stops the subsystem as a whole, and treats a
/// start failure as fatal for its event loop.
pub struct SettingsManager {
    started: bool,
}

/// Subsystem startup failure.
#[derive(Debug)]
#[allow(dead_code)]
pub enum ManagerError {
    Start { reason: String },
}

impl std::fmt::Display for ManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerError::Start { reason } => {
                write!(f, "failed to start the settings manager: {}", reason)
            }
        }
    }
}

impl std::error::Error for ManagerError {}

impl SettingsManager {
    pub fn new() -> Self {
        Self { started: false }
    }

    /// Start the plugin subsystem.
    pub fn start(&mut self) -> Result<(), ManagerError> {
        debug!("starting settings manager");
        // TODO: drive the plugin loader from here and surface per-plugin
        // start failures as ManagerError::Start.
        self.started = true;
        Ok(())
    }

    /// Stop the plugin subsystem. Safe to call on a manager that never
    /// started or already stopped.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        debug!("stopping settings manager");
        self.started = false;
    }
}
