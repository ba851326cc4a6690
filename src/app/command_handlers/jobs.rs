use crate::app::command_support::{ensure_runtime_root, load_runtime_settings, parse_args};
use crate::queue::{open_queue, Job};
use std::path::PathBuf;

const USAGE: &str =
    "usage: enqueue <thread-id> <session-id> <prompt...> [--resume] [--user <name>] [--cwd <dir>]";

pub fn cmd_enqueue(args: &[String]) -> Result<String, String> {
    let parsed = parse_args(args, &["--resume"], &["--user", "--cwd"])?;
    if parsed.positional.len() < 3 {
        return Err(USAGE.to_string());
    }
    let job = Job {
        thread_id: parsed.positional[0].clone(),
        session_id: parsed.positional[1].clone(),
        prompt: parsed.positional[2..].join(" "),
        resume: parsed.has("--resume"),
        username: parsed.value("--user").unwrap_or("cli").to_string(),
        working_dir: parsed.value("--cwd").map(PathBuf::from),
    };

    let paths = ensure_runtime_root()?;
    let settings = load_runtime_settings(&paths)?;
    let queue = open_queue(&settings.queue, &paths.queue_root()).map_err(|e| e.to_string())?;
    let queued = queue.enqueue(job).map_err(|e| e.to_string())?;

    Ok(format!(
        "enqueued\njob_id={}\nbackend={}\ntopic={}\nthread_id={}\nresume={}",
        queued.id,
        queue.backend().as_str(),
        settings.queue.topic,
        queued.job.thread_id,
        queued.job.resume
    ))
}
