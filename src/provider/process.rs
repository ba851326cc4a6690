use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

/// A fully built command line: what to run, with which arguments, where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn command_form(&self) -> String {
        if self.args.is_empty() {
            return self.program.display().to_string();
        }
        format!("{} {}", self.program.display(), self.args.join(" "))
    }
}

/// Captured result of a finished process. `exit_code` is `None` when the
/// process was terminated by a signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Launches external processes. `Err` means the process could not be started
/// at all; a started process that fails is reported through `exit_code`.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<ProcessOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<ProcessOutput> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("missing stdout pipe"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("missing stderr pipe"))?;

        // Both pipes are drained concurrently so a chatty stderr cannot block
        // the child while stdout is being read.
        let stdout_reader = thread::spawn(move || read_lossy(stdout));
        let stderr_reader = thread::spawn(move || read_lossy(stderr));

        let status = child.wait()?;
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        })
    }
}

fn read_lossy(source: impl Read) -> String {
    let mut buf = Vec::new();
    let mut reader = BufReader::new(source);
    let _ = reader.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
