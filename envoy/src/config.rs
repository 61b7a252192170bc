//! Optional TOML+env config loader for example/test harnesses. The core
//! library types never read the environment themselves — this is strictly
//! for binaries that embed `envoy` and want a conventional config file.
//!
//! Loads TOML and overlays environment variables on top, using `dirs` to
//! locate the user config directory.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::EnvoyError;

const CONFIG_FILE_NAME: &str = "envoy.toml";

/// Harness-level settings: where the workspace root and sqlite file live,
/// plus free-form `[env]` overrides merged over `std::env::var`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HarnessConfig {
    pub workspace_root: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Path to `$XDG_CONFIG_HOME/envoy/envoy.toml` (or the platform equivalent
/// via `dirs::config_dir`), if it exists.
fn config_file_path() -> Option<PathBuf> {
    let dir = dirs::config_dir()?.join("envoy");
    let path = dir.join(CONFIG_FILE_NAME);
    path.exists().then_some(path)
}

/// Loads `envoy.toml` from the platform config directory, if present.
/// Missing file returns `HarnessConfig::default()`, not an error.
pub fn load() -> Result<HarnessConfig, EnvoyError> {
    let Some(path) = config_file_path() else {
        return Ok(HarnessConfig::default());
    };
    load_from_path(&path)
}

fn load_from_path(path: &std::path::Path) -> Result<HarnessConfig, EnvoyError> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| EnvoyError::input(format!("invalid config TOML: {e}")))
}

/// Resolves a setting, preferring an explicit environment variable over the
/// config file's `[env]` table.
pub fn resolve_env(config: &HarnessConfig, key: &str) -> Option<String> {
    std::env::var(key).ok().or_else(|| config.env.get(key).cloned())
}
