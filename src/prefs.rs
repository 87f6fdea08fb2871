use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locale preferences owned by an external configuration store.
///
/// The daemon only ever reads these; an empty region means the user never
/// customized their regional formats and no overrides are propagated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocalePrefs {
    /// Region override, e.g. `"en_US"`.
    pub region: String,
}

impl LocalePrefs {
    /// Load preferences from `path`. A missing or malformed file yields
    /// defaults; neither is an error for the daemon.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no locale preference file");
                return Self::default();
            }
        };
        match toml::from_str(&text) {
            Ok(prefs) => prefs,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "malformed locale preference file");
                Self::default()
            }
        }
    }

    /// Default preference file location: `$XDG_CONFIG_HOME/settingsd/locale.toml`.
    pub fn default_path() -> PathBuf {
        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|| PathBuf::from(".config"));
        config_home.join("settingsd").join("locale.toml")
    }
}
