use super::{
    failure_note, FailureOutcome, Job, JobQueue, QueueError, QueueRetryPolicy, QueuedJob,
    ReservedJob,
};
use crate::config::QueueBackend;
use crate::shared::fs_atomic::{atomic_write_file, is_temp_file};
use crate::shared::ids::is_valid_job_id;
use crate::shared::time::now_millis;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQueuePaths {
    pub root: PathBuf,
    pub incoming: PathBuf,
    pub processing: PathBuf,
    pub failed: PathBuf,
}

impl FileQueuePaths {
    pub fn new(queue_root: &Path, topic: &str) -> Self {
        let root = queue_root.join(topic);
        Self {
            incoming: root.join("incoming"),
            processing: root.join("processing"),
            failed: root.join("failed"),
            root,
        }
    }

    fn dirs(&self) -> [&Path; 3] {
        [&self.incoming, &self.processing, &self.failed]
    }
}

/// Directory-backed queue for single-host deployments without Redis.
///
/// A job is a JSON envelope named `<available_at_ms>-<id>.json`. Claiming is
/// an atomic rename from `incoming/` to `processing/`, so concurrent workers
/// never receive the same file. Names sort by due time, oldest first.
#[derive(Debug, Clone)]
pub struct FileJobQueue {
    paths: FileQueuePaths,
    policy: QueueRetryPolicy,
}

impl FileJobQueue {
    pub fn open(
        queue_root: &Path,
        topic: &str,
        policy: QueueRetryPolicy,
    ) -> Result<Self, QueueError> {
        let paths = FileQueuePaths::new(queue_root, topic);
        for dir in paths.dirs() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        Ok(Self { paths, policy })
    }

    pub fn paths(&self) -> &FileQueuePaths {
        &self.paths
    }

    /// Jobs parked after exhausting their attempts, oldest first.
    pub fn failed_jobs(&self) -> Result<Vec<QueuedJob>, QueueError> {
        sorted_job_files(&self.paths.failed)?
            .into_iter()
            .map(|path| read_envelope(&path))
            .collect()
    }

    fn write_envelope(&self, dir: &Path, queued: &QueuedJob) -> Result<PathBuf, QueueError> {
        let path = dir.join(job_filename(queued));
        let body = serde_json::to_vec_pretty(queued).map_err(|e| parse_err(&path, e))?;
        atomic_write_file(&path, &body).map_err(|e| io_err(&path, e))?;
        Ok(path)
    }

    fn claim_due(&self, now_ms: i64) -> Result<Option<ReservedJob>, QueueError> {
        for incoming_path in sorted_job_files(&self.paths.incoming)? {
            let Some(file_name) = incoming_path.file_name() else {
                continue;
            };
            if due_at_ms(&incoming_path).is_some_and(|due| due > now_ms) {
                break;
            }
            let processing_path = self.paths.processing.join(file_name);

            match fs::rename(&incoming_path, &processing_path) {
                Ok(()) => match read_envelope(&processing_path) {
                    Ok(queued) => {
                        return Ok(Some(ReservedJob {
                            queued,
                            receipt: processing_path.display().to_string(),
                        }))
                    }
                    Err(err) => {
                        // Unreadable envelopes would be claimed forever.
                        let parked = self.paths.failed.join(file_name);
                        let _ = fs::rename(&processing_path, &parked);
                        return Err(err);
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(&incoming_path, err)),
            }
        }
        Ok(None)
    }
}

impl JobQueue for FileJobQueue {
    fn backend(&self) -> QueueBackend {
        QueueBackend::File
    }

    fn enqueue(&self, job: Job) -> Result<QueuedJob, QueueError> {
        job.validate().map_err(QueueError::InvalidJob)?;
        let queued = QueuedJob::new(job);
        self.write_envelope(&self.paths.incoming, &queued)?;
        Ok(queued)
    }

    fn reserve(&self, wait: Duration) -> Result<Option<ReservedJob>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(reserved) = self.claim_due(now_millis())? {
                return Ok(Some(reserved));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn complete(&self, reserved: &ReservedJob) -> Result<(), QueueError> {
        let path = Path::new(&reserved.receipt);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn fail(&self, reserved: &ReservedJob, reason: &str) -> Result<FailureOutcome, QueueError> {
        let mut queued = reserved.queued.clone();
        queued.attempts_made = queued.attempts_made.saturating_add(1);
        queued.last_error = Some(failure_note(reason));

        let outcome = self.policy.outcome(queued.attempts_made);
        match outcome {
            FailureOutcome::Retry { delay, .. } => {
                queued.available_at_ms =
                    now_millis().saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
                self.write_envelope(&self.paths.incoming, &queued)?;
            }
            FailureOutcome::Exhausted { .. } => {
                self.write_envelope(&self.paths.failed, &queued)?;
            }
        }
        self.complete(reserved)?;
        Ok(outcome)
    }

    fn recover(&self) -> Result<usize, QueueError> {
        let mut recovered = 0;
        for processing_path in sorted_job_files(&self.paths.processing)? {
            let Some(file_name) = processing_path.file_name() else {
                continue;
            };
            let incoming_path = self.paths.incoming.join(file_name);
            fs::rename(&processing_path, &incoming_path).map_err(|e| io_err(&processing_path, e))?;
            recovered += 1;
        }
        Ok(recovered)
    }

    fn ping(&self) -> Result<(), QueueError> {
        for dir in self.paths.dirs() {
            fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
        }
        Ok(())
    }
}

fn job_filename(queued: &QueuedJob) -> String {
    let id = if is_valid_job_id(&queued.id) {
        queued.id.as_str()
    } else {
        "job"
    };
    format!("{:013}-{id}.json", queued.available_at_ms.max(0))
}

fn due_at_ms(path: &Path) -> Option<i64> {
    path.file_name()?
        .to_str()?
        .split_once('-')?
        .0
        .parse()
        .ok()
}

fn read_envelope(path: &Path) -> Result<QueuedJob, QueueError> {
    let raw = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&raw).map_err(|e| parse_err(path, e))
}

fn sorted_job_files(dir: &Path) -> Result<Vec<PathBuf>, QueueError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let path = entry.map_err(|e| io_err(dir, e))?.path();
        if !path.is_file() || is_temp_file(&path) {
            continue;
        }
        if path.extension().and_then(|v| v.to_str()) != Some("json") {
            continue;
        }
        entries.push(path);
    }
    entries.sort();
    Ok(entries)
}

fn io_err(path: &Path, source: std::io::Error) -> QueueError {
    QueueError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn parse_err(path: &Path, source: serde_json::Error) -> QueueError {
    QueueError::Parse {
        path: path.display().to_string(),
        source,
    }
}
