//! External process collaborators: the script interpreter that runs seed and
//! dynamic tool scripts, and the static analyzer that gates registration.
//!
//! The implementation language for dynamic tool scripts (and its analyzer)
//! is a configuration choice, not a compile-time dependency of this crate:
//! `RunScript` (§4.3, process tier) is parameterized by [`Interpreter`]
//! rather than hard-coded to one interpreter binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::error::EnvoyError;

/// File extension used for dynamic tool scripts written to a runner's
/// `tools/` directory. Configurable so the analyzer/interpreter pairing can
/// change without touching the rest of the crate.
#[derive(Debug, Clone)]
pub struct Interpreter {
    /// Path to (or name of) the interpreter binary, e.g. `dart`, `deno`,
    /// `python3`.
    pub command: PathBuf,
    /// Extra args inserted before the script path (e.g. `["run"]`).
    pub pre_args: Vec<String>,
    /// Extension used when writing scripts to disk (without the dot).
    pub extension: String,
}

impl Interpreter {
    pub fn new(command: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            pre_args: vec![],
            extension: extension.into(),
        }
    }

    /// Runs `script_path` with `arg` as a single positional argument and
    /// `cwd` as the working directory, enforcing `timeout`.
    ///
    /// Returns the captured stdout/stderr and exit status on any completion
    /// (success or failure); callers translate that into tool-specific
    /// `ToolResult`s. Only a timeout or spawn failure becomes an `EnvoyError`
    /// here.
    pub async fn run(
        &self,
        script_path: &Path,
        arg: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, EnvoyError> {
        let mut command = tokio::process::Command::new(&self.command);
        command
            .args(&self.pre_args)
            .arg(script_path)
            .arg(arg)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| EnvoyError::runtime(format!("spawn failed: {e}")))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| EnvoyError::runtime(format!("timed out after {:?}", timeout)))?
            .map_err(|e| EnvoyError::runtime(format!("process wait failed: {e}")))?;

        Ok(ProcessOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Raw process completion, before any tool-specific interpretation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of running the static analyzer against a dynamic tool script.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub passed: bool,
    /// Full analyzer output (diagnostics + warnings), attached to the error
    /// message verbatim when `passed` is false. Warnings alone MUST NOT set
    /// `passed = false` — only a non-zero analyzer exit does.
    pub output: String,
}

/// Static analyzer gate for dynamic tool scripts (§4.5 step 5). Exit
/// non-zero means `passed = false`; warnings must not block.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, script_path: &Path) -> Result<AnalysisOutcome, EnvoyError>;
}

/// Runs an external analyzer binary against a script path, treating a
/// non-zero exit code as a failed analysis and exit 0 as passed regardless
/// of stderr content (warnings go to stderr but don't block).
pub struct ExternalAnalyzer {
    pub command: PathBuf,
    pub args: Vec<String>,
}

#[async_trait::async_trait]
impl Analyzer for ExternalAnalyzer {
    async fn analyze(&self, script_path: &Path) -> Result<AnalysisOutcome, EnvoyError> {
        let output = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(script_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EnvoyError::runtime(format!("analyzer spawn failed: {e}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(AnalysisOutcome {
            passed: output.status.success(),
            output: combined,
        })
    }
}

/// Analyzer that always passes. Used in tests and for embeddings that don't
/// wire up a real static analyzer yet.
pub struct NoopAnalyzer;

#[async_trait::async_trait]
impl Analyzer for NoopAnalyzer {
    async fn analyze(&self, _script_path: &Path) -> Result<AnalysisOutcome, EnvoyError> {
        Ok(AnalysisOutcome {
            passed: true,
            output: String::new(),
        })
    }
}
