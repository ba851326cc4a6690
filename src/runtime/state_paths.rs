use super::RuntimeError;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_STATE_ROOT_DIR: &str = ".agentrelay";
pub const STATE_ROOT_ENV: &str = "AGENTRELAY_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![self.root.join("logs"), self.queue_root(), self.daemon_dir()]
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn queue_root(&self) -> PathBuf {
        self.root.join("queue")
    }

    pub fn daemon_dir(&self) -> PathBuf {
        self.root.join("daemon")
    }

    pub fn stop_signal_path(&self) -> PathBuf {
        self.daemon_dir().join("stop")
    }

    pub fn runtime_log_path(&self) -> PathBuf {
        self.root.join("logs/runtime.log")
    }
}

/// `$AGENTRELAY_HOME`, else `$HOME/.agentrelay`.
pub fn default_state_root_path() -> Result<PathBuf, RuntimeError> {
    if let Some(root) = std::env::var_os(STATE_ROOT_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    let home = std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .ok_or(RuntimeError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR))
}

pub fn bootstrap_state_root(paths: &StatePaths) -> Result<(), RuntimeError> {
    for path in paths.required_directories() {
        fs::create_dir_all(&path).map_err(|source| RuntimeError::CreateDir {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

pub fn signal_stop(paths: &StatePaths) -> Result<PathBuf, RuntimeError> {
    bootstrap_state_root(paths)?;
    let path = paths.stop_signal_path();
    fs::write(&path, b"stop").map_err(|source| RuntimeError::WriteStopSignal {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}
