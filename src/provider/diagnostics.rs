//! Turns an opaque process-launch failure into an operator-facing report.
//!
//! The report names the adapter, the resolved binary and how it was found,
//! the argument vector, the working directory and the raw OS error, followed
//! by hints derived from the error code and from inspecting the binary on
//! disk. Nothing here retries.

use super::resolve::ResolutionSource;
use std::fs;
use std::io::Read;
use std::path::Path;

const MAX_ARG_CHARS: usize = 120;
const SHEBANG_PROBE_BYTES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnErrorCode {
    NotFound,
    AccessDenied,
    ExecFormat,
    NotADirectory,
    NotPermitted,
}

impl SpawnErrorCode {
    pub const ALL: [Self; 5] = [
        Self::NotFound,
        Self::AccessDenied,
        Self::ExecFormat,
        Self::NotADirectory,
        Self::NotPermitted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "ENOENT",
            Self::AccessDenied => "EACCES",
            Self::ExecFormat => "ENOEXEC",
            Self::NotADirectory => "ENOTDIR",
            Self::NotPermitted => "EPERM",
        }
    }

    #[cfg(not(windows))]
    pub fn from_raw_os_error(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::NotPermitted),
            2 => Some(Self::NotFound),
            8 => Some(Self::ExecFormat),
            13 => Some(Self::AccessDenied),
            20 => Some(Self::NotADirectory),
            _ => None,
        }
    }

    #[cfg(windows)]
    pub fn from_raw_os_error(code: i32) -> Option<Self> {
        match code {
            2 | 3 => Some(Self::NotFound),
            5 => Some(Self::AccessDenied),
            193 => Some(Self::ExecFormat),
            267 => Some(Self::NotADirectory),
            _ => None,
        }
    }

    /// Finds a known code name (e.g. `ENOENT`) embedded in free-form text.
    pub fn from_text(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| text.contains(code.as_str()))
    }

    pub fn classify(error: &std::io::Error) -> Option<Self> {
        error
            .raw_os_error()
            .and_then(Self::from_raw_os_error)
            .or_else(|| Self::from_text(&error.to_string()))
            .or_else(|| match error.kind() {
                std::io::ErrorKind::NotFound => Some(Self::NotFound),
                std::io::ErrorKind::PermissionDenied => Some(Self::AccessDenied),
                _ => None,
            })
    }
}

impl std::fmt::Display for SpawnErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about a failed launch. Built only on failure.
#[derive(Debug, Clone, Copy)]
pub struct SpawnDiagnosticsInput<'a> {
    pub adapter_name: &'a str,
    pub binary_path: &'a Path,
    pub binary_source: ResolutionSource,
    pub env_var: &'a str,
    pub working_dir: Option<&'a Path>,
    pub error: &'a std::io::Error,
    pub args: Option<&'a [String]>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SpawnError {
    pub adapter: String,
    pub code: Option<SpawnErrorCode>,
    pub hints: Vec<String>,
    pub message: String,
}

pub fn format_spawn_error(input: &SpawnDiagnosticsInput<'_>) -> SpawnError {
    let code = SpawnErrorCode::classify(input.error);
    let binary = input.binary_path.display().to_string();
    let working_dir_missing = input.working_dir.map(|dir| !dir.is_dir()).unwrap_or(false);

    let mut hints = Vec::new();
    match code {
        Some(SpawnErrorCode::NotFound) => {
            hints.extend(not_found_hints(input.binary_path));
            if let Some(dir) = input.working_dir.filter(|_| working_dir_missing) {
                hints.push(format!(
                    "working directory {} does not exist; the launch fails before the binary runs",
                    dir.display()
                ));
            }
        }
        Some(SpawnErrorCode::AccessDenied) | Some(SpawnErrorCode::NotPermitted) => {
            hints.push(format!(
                "permission denied launching {binary}; check its permissions and that the filesystem is not mounted noexec"
            ));
        }
        Some(SpawnErrorCode::ExecFormat) => {
            hints.push(format!(
                "{binary} is not a valid executable for this platform; scripts need a #! line"
            ));
        }
        Some(SpawnErrorCode::NotADirectory) => {
            let dir = input
                .working_dir
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "(inherited)".to_string());
            hints.push(format!(
                "a component of the working directory {dir} is not a directory"
            ));
        }
        None => {}
    }
    if input.binary_source == ResolutionSource::Path {
        hints.push(
            "the binary was resolved from PATH; the worker process may not see the same PATH as your shell"
                .to_string(),
        );
    }
    hints.push(format!(
        "set {} to the full path of a working {} binary and restart the worker",
        input.env_var, input.adapter_name
    ));

    let mut lines = vec![
        format!(
            "{} failed to start ({})",
            input.adapter_name,
            code.map(SpawnErrorCode::as_str).unwrap_or("unknown error")
        ),
        format!(
            "  binary: {binary} (source: {})",
            input.binary_source.as_str()
        ),
    ];
    if let Some(args) = input.args {
        lines.push(format!("  args: {}", render_args(args)));
    }
    lines.push(match input.working_dir {
        Some(dir) if working_dir_missing => {
            format!("  working directory: {} (missing)", dir.display())
        }
        Some(dir) => format!("  working directory: {}", dir.display()),
        None => "  working directory: (inherited)".to_string(),
    });
    lines.push(format!("  cause: {}", input.error));
    lines.push("hints:".to_string());
    lines.extend(hints.iter().map(|hint| format!("  - {hint}")));

    SpawnError {
        adapter: input.adapter_name.to_string(),
        code,
        hints,
        message: lines.join("\n"),
    }
}

fn not_found_hints(binary: &Path) -> Vec<String> {
    let Ok(metadata) = fs::metadata(binary) else {
        return vec![format!(
            "binary not found at the resolved path {}",
            binary.display()
        )];
    };
    if !has_execute_bit(&metadata) {
        return vec![format!(
            "{} exists but is not executable",
            binary.display()
        )];
    }
    interpreter_hints(binary)
}

#[cfg(unix)]
fn has_execute_bit(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_execute_bit(_metadata: &fs::Metadata) -> bool {
    false
}

/// An executable that still fails with ENOENT usually points at a broken
/// `#!` line: the interpreter it names is what cannot be found.
fn interpreter_hints(binary: &Path) -> Vec<String> {
    let Some(first_line) = read_first_line(binary) else {
        return vec![format!(
            "{} is executable but could not be read to inspect its interpreter",
            binary.display()
        )];
    };
    let Some(directive) = first_line.strip_prefix("#!") else {
        return vec![format!(
            "{} has no interpreter directive; a missing dynamic loader or a binary built for another architecture also fails this way",
            binary.display()
        )];
    };
    let directive = directive.trim();
    let mut hints = vec![format!("interpreter directive: #!{directive}")];

    let mut parts = directive.split_whitespace();
    let Some(interpreter) = parts.next() else {
        return hints;
    };
    let interpreter_path = Path::new(interpreter);
    let dispatches_via_env =
        interpreter_path.file_name().and_then(|v| v.to_str()) == Some("env");
    if dispatches_via_env {
        if let Some(target) = parts.find(|part| !part.starts_with('-') && !part.contains('=')) {
            hints.push(format!(
                "the script runs `{target}` through env; make sure `{target}` is on the PATH of the worker process"
            ));
        }
    } else if interpreter_path.is_absolute() && !interpreter_path.exists() {
        hints.push(format!("interpreter {interpreter} is missing"));
    }
    hints
}

fn read_first_line(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut buf = Vec::with_capacity(SHEBANG_PROBE_BYTES);
    file.take(SHEBANG_PROBE_BYTES as u64)
        .read_to_end(&mut buf)
        .ok()?;
    let text = String::from_utf8_lossy(&buf);
    let line = text.lines().next().unwrap_or("");
    Some(line.trim_end_matches('\r').to_string())
}

fn render_args(args: &[String]) -> String {
    let rendered = args
        .iter()
        .map(|arg| {
            if arg.chars().count() > MAX_ARG_CHARS {
                let head: String = arg.chars().take(MAX_ARG_CHARS).collect();
                format!("{head:?}...")
            } else {
                format!("{arg:?}")
            }
        })
        .collect::<Vec<_>>();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_read_from_os_error_number_or_text() {
        let raw = std::io::Error::from_raw_os_error(if cfg!(windows) { 5 } else { 13 });
        assert_eq!(
            SpawnErrorCode::classify(&raw),
            Some(SpawnErrorCode::AccessDenied)
        );

        let textual = std::io::Error::other("spawn failed: ENOTDIR while changing directory");
        assert_eq!(
            SpawnErrorCode::classify(&textual),
            Some(SpawnErrorCode::NotADirectory)
        );

        let unknown = std::io::Error::other("something else");
        assert_eq!(SpawnErrorCode::classify(&unknown), None);
    }

    #[test]
    fn long_arguments_are_shortened_in_the_report() {
        let long = "p".repeat(MAX_ARG_CHARS + 50);
        let rendered = render_args(&["-p".to_string(), long]);
        assert!(rendered.starts_with("[\"-p\", \""));
        assert!(rendered.ends_with("...]"));
    }

    #[test]
    fn report_always_ends_with_env_var_hint() {
        let error = std::io::Error::other("boom");
        let input = SpawnDiagnosticsInput {
            adapter_name: "codex",
            binary_path: Path::new("/opt/codex"),
            binary_source: ResolutionSource::Candidate,
            env_var: "CODEX_PATH",
            working_dir: None,
            error: &error,
            args: None,
        };
        let report = format_spawn_error(&input);
        assert_eq!(report.code, None);
        assert!(report
            .hints
            .last()
            .expect("hint")
            .starts_with("set CODEX_PATH to the full path"));
        assert!(report.message.contains("codex failed to start (unknown error)"));
        assert!(report.message.contains("working directory: (inherited)"));
    }
}
