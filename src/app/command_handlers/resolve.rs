use crate::app::command_support::{ensure_runtime_root, load_runtime_settings, runtime_log};
use crate::provider::{locate_adapter_binary, AdapterKind, AdapterOptions, SystemLauncher};
use std::sync::Arc;

pub fn cmd_resolve(args: &[String]) -> Result<String, String> {
    if args.len() > 1 {
        return Err("usage: resolve [claude|codex]".to_string());
    }
    let paths = ensure_runtime_root()?;
    let kind = match args.first() {
        Some(name) => AdapterKind::try_from(name.as_str()).map_err(|e| e.to_string())?,
        None => load_runtime_settings(&paths)?.agent.adapter,
    };

    let options = AdapterOptions::new(Arc::new(SystemLauncher), runtime_log(&paths));
    let resolved = locate_adapter_binary(kind, options).map_err(|e| e.to_string())?;
    Ok(format!(
        "adapter={kind}\npath={}\nsource={}",
        resolved.path.display(),
        resolved.source
    ))
}
