use crate::config::Settings;
use crate::delivery::ChatClient;
use crate::provider::{build_adapter, AdapterOptions, SystemLauncher};
use crate::queue::{open_queue, JobQueue};
use crate::shared::logging::RuntimeLog;
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod job_worker;
pub mod state_paths;
pub mod worker_primitives;

pub use crate::shared::errors::RuntimeError;
pub use job_worker::{
    failure_notice, Delivery, JobError, JobProcessor, JobStatus, WorkerPool,
    EMPTY_OUTPUT_PLACEHOLDER,
};
pub use state_paths::{
    bootstrap_state_root, default_state_root_path, signal_stop, StatePaths,
    DEFAULT_STATE_ROOT_DIR, STATE_ROOT_ENV,
};

/// Opens the configured queue and returns it to the wait state any jobs a
/// previous worker left in flight.
pub fn open_recovered_queue(
    paths: &StatePaths,
    settings: &Settings,
    log: &RuntimeLog,
) -> Result<Arc<dyn JobQueue>, RuntimeError> {
    let queue: Arc<dyn JobQueue> = Arc::from(open_queue(&settings.queue, &paths.queue_root())?);
    let recovered = queue.recover()?;
    if recovered > 0 {
        log.info(
            "queue.recovered",
            &format!("returned {recovered} in-flight jobs to {}", settings.queue.topic),
        );
    }
    Ok(queue)
}

/// Wires the configured queue, adapter and chat client into a pool.
pub fn build_worker_pool(
    paths: &StatePaths,
    settings: &Settings,
    log: &RuntimeLog,
) -> Result<WorkerPool, RuntimeError> {
    let queue = open_recovered_queue(paths, settings, log)?;
    let delivery = ChatClient::from_settings(&settings.delivery)?.with_log(log.clone());
    let adapter = build_adapter(
        settings.agent.adapter,
        AdapterOptions::new(Arc::new(SystemLauncher), log.clone()).with_settings(&settings.agent),
    );
    let processor = JobProcessor::new(Arc::from(adapter), Arc::new(delivery), log.clone())
        .with_system_prompt(settings.agent.system_prompt.clone());
    Ok(WorkerPool::new(
        queue,
        Arc::new(processor),
        &settings.queue,
        log.clone(),
    ))
}

/// Foreground worker: runs until `stop` is raised or `agentrelay stop`
/// writes the stop file.
pub fn run_worker(
    paths: &StatePaths,
    settings: &Settings,
    stop: Arc<AtomicBool>,
) -> Result<(), RuntimeError> {
    bootstrap_state_root(paths)?;
    let stop_path = paths.stop_signal_path();
    if stop_path.exists() {
        let _ = fs::remove_file(&stop_path);
    }

    let log = RuntimeLog::new(paths.runtime_log_path());
    let pool = build_worker_pool(paths, settings, &log)?;
    pool.run_until_stop(stop, Some(stop_path))
}
