//! Tool Runner Environments (§4.2): one on-disk dependency project per
//! permission tier, rooted at `<workspace root>/.envoy/runners/<tier>/`.
//!
//! Static analysis plus a tier-limited import manifest is the only isolation
//! layer this system provides (§4.2 rationale, §1 non-goals): there is no
//! language-level sandbox. `ensure` is required to be idempotent so that
//! repeated `register_tool` calls for the same tier don't re-run dependency
//! resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EnvoyError;
use crate::permission::Permission;

const RUNNERS_DIR: &str = ".envoy/runners";
const MANIFEST_FILE: &str = "envoy_runner.toml";
const RESOLVED_MARKER: &str = ".resolved";
const TOOLS_SUBDIR: &str = "tools";

/// Import roots granted to a tier's dynamic-tool scripts. The static
/// analyzer (injected, see [`crate::tool::register`]) is expected to reject
/// any import outside this list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerManifest {
    pub tier: String,
    pub allowed_imports: Vec<String>,
}

/// Import roots granted per tier (§4.2: "compute -> none; readFile/writeFile
/// -> path-manipulation lib; network/process -> path + HTTP client").
fn allowed_imports(tier: Permission) -> Vec<String> {
    match tier {
        Permission::Compute => vec![],
        Permission::ReadFile | Permission::WriteFile => vec!["path".to_string()],
        Permission::Network | Permission::Process => {
            vec!["path".to_string(), "http".to_string()]
        }
    }
}

/// Directory layout for one tier's runner.
pub struct RunnerPaths {
    pub root: PathBuf,
}

impl RunnerPaths {
    pub fn for_tier(workspace_root: &Path, tier: Permission) -> Self {
        Self {
            root: workspace_root
                .join(RUNNERS_DIR)
                .join(tier.slug()),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn resolved_marker_path(&self) -> PathBuf {
        self.root.join(RESOLVED_MARKER)
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join(TOOLS_SUBDIR)
    }

    pub fn script_path(&self, tool_name: &str, extension: &str) -> PathBuf {
        self.tools_dir().join(format!("{tool_name}.{extension}"))
    }
}

/// Dependency resolution hook. Real implementations shell out to a package
/// manager for the script language; tests use a no-op that just touches the
/// resolved marker.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, runner_root: &Path) -> Result<(), EnvoyError>;
}

/// A resolver that does nothing beyond what `ensure` already guarantees.
/// Suitable when dynamic tool scripts have no third-party dependencies
/// beyond what the tier manifest grants.
pub struct NoopResolver;

impl DependencyResolver for NoopResolver {
    fn resolve(&self, _runner_root: &Path) -> Result<(), EnvoyError> {
        Ok(())
    }
}

/// Idempotently ensures the runner directory for `tier` exists under
/// `workspace_root`, with its manifest written and dependencies resolved.
///
/// Errors from `resolver.resolve` are surfaced verbatim and block
/// registration (§4.2).
pub fn ensure(
    workspace_root: &Path,
    tier: Permission,
    resolver: &dyn DependencyResolver,
) -> Result<RunnerPaths, EnvoyError> {
    let paths = RunnerPaths::for_tier(workspace_root, tier);

    std::fs::create_dir_all(paths.tools_dir())
        .map_err(|e| EnvoyError::runtime(format!("create runner dir: {e}")))?;

    let manifest_path = paths.manifest_path();
    if !manifest_path.exists() {
        let manifest = RunnerManifest {
            tier: tier.slug().to_string(),
            allowed_imports: allowed_imports(tier),
        };
        let text = toml::to_string_pretty(&manifest)
            .map_err(|e| EnvoyError::internal(format!("serialize manifest: {e}")))?;
        std::fs::write(&manifest_path, text)
            .map_err(|e| EnvoyError::runtime(format!("write manifest: {e}")))?;
    }

    let marker_path = paths.resolved_marker_path();
    if !marker_path.exists() {
        resolver.resolve(&paths.root)?;
        std::fs::write(&marker_path, "")
            .map_err(|e| EnvoyError::runtime(format!("write resolved marker: {e}")))?;
    }

    Ok(paths)
}

/// Reads back the manifest for a tier, if it has been `ensure`d.
pub fn read_manifest(workspace_root: &Path, tier: Permission) -> Option<RunnerManifest> {
    let paths = RunnerPaths::for_tier(workspace_root, tier);
    let text = std::fs::read_to_string(paths.manifest_path()).ok()?;
    toml::from_str(&text).ok()
}
