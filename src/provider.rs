use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod diagnostics;
pub mod invocation;
pub mod output_parse;
pub mod process;
pub mod resolve;
pub mod runner;
pub mod version;

pub use diagnostics::{format_spawn_error, SpawnDiagnosticsInput, SpawnError, SpawnErrorCode};
pub use invocation::{BinarySpec, ClaudeProfile, CliProfile, CodexProfile, SessionMode};
pub use process::{LaunchSpec, ProcessLauncher, ProcessOutput, SystemLauncher};
pub use resolve::{BinaryResolution, BinaryResolver, ResolutionSource};
pub use runner::{build_adapter, locate_adapter_binary, AdapterOptions, CliAdapter};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("unknown adapter `{0}`")]
    UnknownAdapter(String),
    #[error("invalid spawn options for {adapter}: {reason}")]
    InvalidOptions { adapter: AdapterKind, reason: String },
    #[error(
        "{adapter} binary `{binary}` was not found on PATH, in known install locations or in the npm global bin; set {env_var} to its path"
    )]
    BinaryNotFound {
        adapter: AdapterKind,
        binary: String,
        env_var: String,
    },
    #[error("{0}")]
    Spawn(#[from] SpawnError),
    #[error("{adapter} exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        adapter: AdapterKind,
        exit_code: i32,
        stderr: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    #[default]
    Claude,
    Codex,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AdapterKind {
    type Error = AdapterError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            other => Err(AdapterError::UnknownAdapter(other.to_string())),
        }
    }
}

/// Input every adapter accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub prompt: String,
    pub session_id: String,
    pub resume: bool,
    pub working_dir: Option<PathBuf>,
    pub system_prompt: Option<String>,
}

/// Successful agent run. `session_id` is what the caller should persist to
/// continue the conversation later; it is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnResult {
    pub output: String,
    pub session_id: String,
}

/// One agent CLI family behind the common spawn contract.
pub trait AgentAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    fn spawn(&self, options: &SpawnOptions) -> Result<SpawnResult, AdapterError>;
}
