use crate::config::{load_settings, ConfigError, Settings};
use crate::runtime::{bootstrap_state_root, default_state_root_path, StatePaths};
use crate::shared::logging::RuntimeLog;

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn ensure_runtime_root() -> Result<StatePaths, String> {
    let root = default_state_root_path().map_err(|e| e.to_string())?;
    let paths = StatePaths::new(root);
    bootstrap_state_root(&paths).map_err(|e| e.to_string())?;
    Ok(paths)
}

pub fn load_runtime_settings(paths: &StatePaths) -> Result<Settings, String> {
    load_settings(&paths.settings_file()).map_err(map_config_err)
}

pub fn runtime_log(paths: &StatePaths) -> RuntimeLog {
    RuntimeLog::new(paths.runtime_log_path())
}

/// Splits `--flag value` and bare `--switch` options from positional
/// arguments. Unknown flags are rejected.
pub struct ParsedArgs {
    pub positional: Vec<String>,
    pub switches: Vec<String>,
    pub values: Vec<(String, String)>,
}

impl ParsedArgs {
    pub fn has(&self, switch: &str) -> bool {
        self.switches.iter().any(|s| s == switch)
    }

    pub fn value(&self, flag: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(name, _)| name == flag)
            .map(|(_, value)| value.as_str())
    }
}

pub fn parse_args(
    args: &[String],
    switches: &[&str],
    valued: &[&str],
) -> Result<ParsedArgs, String> {
    let mut parsed = ParsedArgs {
        positional: Vec::new(),
        switches: Vec::new(),
        values: Vec::new(),
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if !arg.starts_with("--") {
            parsed.positional.push(arg.clone());
            continue;
        }
        if switches.contains(&arg.as_str()) {
            parsed.switches.push(arg.clone());
        } else if valued.contains(&arg.as_str()) {
            let value = iter
                .next()
                .ok_or_else(|| format!("{arg} requires a value"))?;
            parsed.values.push((arg.clone(), value.clone()));
        } else {
            return Err(format!("unknown option `{arg}`"));
        }
    }
    Ok(parsed)
}
