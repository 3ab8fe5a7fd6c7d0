//! Application root discovery.
//!
//! The root is the directory holding `app.yaml`, the App Engine deployment
//! descriptor. Its location cannot change while the process runs, so the
//! lookup is memoized.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::{APP_YAML_LOCATION, Environment};

pub const APP_YAML: &str = "app.yaml";

static APPLICATION_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Finds the application root without memoization.
///
/// Order: the `GAEKIT_APP_YAML_LOCATION` directory if it contains
/// `app.yaml`, then `start` and each of its ancestors, then `fallback`.
pub fn locate_application_root<E: Environment + ?Sized>(
    env: &E,
    start: &Path,
    fallback: &Path,
) -> PathBuf {
    if let Some(location) = env.get(APP_YAML_LOCATION) {
        let location = PathBuf::from(location);
        if location.join(APP_YAML).exists() {
            tracing::debug!(path = %location.display(), "app.yaml found via override");
            return location;
        }
        tracing::warn!(
            path = %location.display(),
            "{} does not contain {}",
            APP_YAML_LOCATION,
            APP_YAML
        );
    }

    if let Some(found) = start
        .ancestors()
        .find(|dir| dir.join(APP_YAML).exists())
    {
        tracing::debug!(path = %found.display(), "app.yaml found in ancestor directory");
        return found.to_path_buf();
    }

    tracing::debug!(path = %fallback.display(), "no app.yaml found, using base directory");
    fallback.to_path_buf()
}

/// Memoized application root, searched upwards from the running
/// executable's directory.
///
/// Only the first call's `env` and `fallback` are consulted.
pub fn get_application_root<E: Environment + ?Sized>(env: &E, fallback: &Path) -> &'static Path {
    APPLICATION_ROOT.get_or_init(|| {
        let start = executable_dir().unwrap_or_else(|| fallback.to_path_buf());
        locate_application_root(env, &start, fallback)
    })
    .as_path()
}

fn executable_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent().map(Path::to_path_buf)
}
