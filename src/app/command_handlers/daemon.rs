use crate::app::command_support::{
    ensure_runtime_root, load_runtime_settings, parse_args, runtime_log,
};
use crate::runtime::{build_worker_pool, run_worker, signal_stop};
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const LOG_TAIL_LINES: usize = 20;

pub fn cmd_worker(args: &[String]) -> Result<String, String> {
    let parsed = parse_args(args, &["--once"], &[])?;
    if !parsed.positional.is_empty() {
        return Err("usage: worker [--once]".to_string());
    }
    let paths = ensure_runtime_root()?;
    let settings = load_runtime_settings(&paths)?;

    if parsed.has("--once") {
        let log = runtime_log(&paths);
        let pool = build_worker_pool(&paths, &settings, &log).map_err(|e| e.to_string())?;
        let handled = pool.drain_once().map_err(|e| e.to_string())?;
        return Ok(format!("drained\njobs={handled}"));
    }

    run_worker(&paths, &settings, Arc::new(AtomicBool::new(false))).map_err(|e| e.to_string())?;
    Ok("worker stopped".to_string())
}

pub fn cmd_stop() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let path = signal_stop(&paths).map_err(|e| e.to_string())?;
    Ok(format!("stop requested\nsignal={}", path.display()))
}

pub fn cmd_logs() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let path = paths.runtime_log_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok("no logs".to_string())
        }
        Err(err) => return Err(format!("failed to read {}: {err}", path.display())),
    };

    let mut recent = raw.lines().rev().take(LOG_TAIL_LINES).collect::<Vec<_>>();
    if recent.is_empty() {
        return Ok("no logs".to_string());
    }
    recent.reverse();
    Ok(recent
        .into_iter()
        .map(|line| format!("{}: {line}", path.display()))
        .collect::<Vec<_>>()
        .join("\n"))
}
