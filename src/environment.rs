/// Session environment propagation.
///
/// Pushes locale and legacy input-method variables into the session
/// environment so later-started processes inherit them. The session manager
/// rejects `Setenv` once any client has registered, so everything here must be
/// issued before registration. Each push is best-effort: failures are logged
/// and never block startup.
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::bus::SessionBus;
use crate::prefs::LocalePrefs;

/// Locale categories derived from the single region override.
const LOCALE_VARIABLES: [&str; 5] = [
    "LC_TIME",
    "LC_NUMERIC",
    "LC_MONETARY",
    "LC_MEASUREMENT",
    "LC_PAPER",
];

const INPUT_METHOD_DAEMON: &str = "ibus-daemon";

/// Push the user's region override into the session environment, one variable
/// per call. Only set if the user has ever customized their region.
pub async fn propagate_locale_overrides<B: SessionBus>(bus: &B, prefs: &LocalePrefs) {
    if prefs.region.is_empty() {
        return;
    }
    for name in LOCALE_VARIABLES {
        set_session_env(bus, name, &prefs.region).await;
    }
}

/// Qt applications and legacy X clients pick their input method up from the
/// environment, so when ibus is installed its variables have to be in the
/// session environment before those clients start.
pub async fn propagate_legacy_input_method_vars<B: SessionBus>(bus: &B) {
    if !is_program_in_path(INPUT_METHOD_DAEMON) {
        return;
    }
    push_legacy_input_method_vars(bus).await;
}

async fn push_legacy_input_method_vars<B: SessionBus>(bus: &B) {
    set_session_env(bus, "QT_IM_MODULE", &env_or("QT_IM_MODULE", "ibus")).await;
    set_session_env(bus, "XMODIFIERS", &env_or("XMODIFIERS", "@im=ibus")).await;
}

async fn set_session_env<B: SessionBus>(bus: &B, name: &str, value: &str) {
    if let Err(err) = bus.setenv(name, value).await {
        debug!(variable = name, error = %err, "failed to set session environment variable");
    }
}

/// Current process environment value if non-empty, otherwise the fallback.
fn env_or(name: &str, fallback: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}

fn is_program_in_path(binary: &str) -> bool {
    match std::env::var_os("PATH") {
        Some(path) => search_path(binary, &path).is_some(),
        None => false,
    }
}

fn search_path(binary: &str, path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::{BusCall, RecordingBus};
    use std::os::unix::fs::PermissionsExt;

    fn region(value: &str) -> LocalePrefs {
        LocalePrefs {
            region: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_locale_overrides_set_all_five_categories() {
        let bus = RecordingBus::new();
        propagate_locale_overrides(&bus, &region("en_US")).await;

        let expected: Vec<BusCall> = LOCALE_VARIABLES
            .iter()
            .map(|name| BusCall::Setenv {
                name: name.to_string(),
                value: "en_US".to_string(),
            })
            .collect();
        assert_eq!(bus.calls(), expected);
    }

    #[tokio::test]
    async fn test_empty_region_sets_nothing() {
        let bus = RecordingBus::new();
        propagate_locale_overrides(&bus, &region("")).await;
        assert!(bus.calls().is_empty());
    }

    #[tokio::test]
    async fn test_input_method_vars_use_defaults() {
        // The inner push is exercised directly; whether ibus-daemon is
        // installed on the test machine must not matter.
        std::env::remove_var("QT_IM_MODULE");
        std::env::remove_var("XMODIFIERS");

        let bus = RecordingBus::new();
        push_legacy_input_method_vars(&bus).await;

        assert_eq!(
            bus.calls(),
            vec![
                BusCall::Setenv {
                    name: "QT_IM_MODULE".to_string(),
                    value: "ibus".to_string(),
                },
                BusCall::Setenv {
                    name: "XMODIFIERS".to_string(),
                    value: "@im=ibus".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_env_or_prefers_nonempty_value() {
        std::env::set_var("SETTINGSD_TEST_ENV_OR", "kime");
        assert_eq!(env_or("SETTINGSD_TEST_ENV_OR", "ibus"), "kime");

        std::env::set_var("SETTINGSD_TEST_ENV_OR", "");
        assert_eq!(env_or("SETTINGSD_TEST_ENV_OR", "ibus"), "ibus");

        std::env::remove_var("SETTINGSD_TEST_ENV_OR");
        assert_eq!(env_or("SETTINGSD_TEST_ENV_OR", "ibus"), "ibus");
    }

    #[test]
    fn test_search_path_finds_executable() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("ibus-daemon");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path = std::env::join_paths([dir.path()]).unwrap();
        assert_eq!(search_path("ibus-daemon", &path), Some(binary));
    }

    #[test]
    fn test_search_path_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("ibus-daemon");
        std::fs::write(&binary, "").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();

        let path = std::env::join_paths([dir.path()]).unwrap();
        assert_eq!(search_path("ibus-daemon", &path), None);
    }

    #[test]
    fn test_search_path_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = std::env::join_paths([dir.path()]).unwrap();
        assert_eq!(search_path("ibus-daemon", &path), None);
    }
}
