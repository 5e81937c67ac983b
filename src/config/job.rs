//! Job description loaded from TOML.
//!
//! ```toml
//! [job]
//! name = "grade-mp2"
//! command = "scripts/grade.sh"
//! work_dir = "report"
//! skip_commit_message = "Report Generated."
//!
//! [job.env]
//! MP = "2"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Commit message the job uses when publishing its own results. Pushes
/// carrying it are not re-dispatched.
pub const DEFAULT_SKIP_COMMIT_MESSAGE: &str = "Report Generated.";

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct JobFile {
    job: JobConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub name: String,
    /// Executable run once per accepted task.
    pub command: PathBuf,
    /// Per-task directories are created under `<work_dir>/<key>/`.
    pub work_dir: PathBuf,
    #[serde(default = "default_skip_commit_message")]
    pub skip_commit_message: String,
    /// Extra environment passed to the command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_skip_commit_message() -> String {
    DEFAULT_SKIP_COMMIT_MESSAGE.to_string()
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read job file {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("bad job file {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: JobFile =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        Ok(file.job)
    }
}
