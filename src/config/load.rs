use super::{ConfigError, Settings};
use std::path::Path;

/// Loads settings from `path`, falling back to defaults when the file does
/// not exist yet, then applies environment overrides and validates.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let mut settings = if path.exists() {
        Settings::from_path(path)?
    } else {
        Settings::default()
    };
    settings.apply_env_overrides();
    settings.validate()?;
    Ok(settings)
}
