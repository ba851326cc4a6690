use super::process::{LaunchSpec, ProcessLauncher};
use crate::shared::logging::RuntimeLog;
use std::path::{Path, PathBuf};

/// Where a binary path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionSource {
    Env,
    Path,
    Candidate,
    NpmGlobal,
}

impl ResolutionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Path => "path",
            Self::Candidate => "candidate",
            Self::NpmGlobal => "npmGlobal",
        }
    }
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResolution {
    pub path: PathBuf,
    pub source: ResolutionSource,
}

/// Locates agent executables on the host.
///
/// Nothing is cached: every call re-runs the lookup so a binary that moved
/// between jobs is picked up on the next one.
pub struct BinaryResolver<'a> {
    launcher: &'a dyn ProcessLauncher,
    log: &'a RuntimeLog,
}

impl<'a> BinaryResolver<'a> {
    pub fn new(launcher: &'a dyn ProcessLauncher, log: &'a RuntimeLog) -> Self {
        Self { launcher, log }
    }

    /// Search path first, then the static candidates for the current
    /// platform. `None` is an ordinary miss.
    pub fn resolve(
        &self,
        name: &str,
        unix_candidates: &[PathBuf],
        windows_candidates: &[PathBuf],
    ) -> Option<BinaryResolution> {
        if let Some(path) = self.search_path(name) {
            return Some(BinaryResolution {
                path,
                source: ResolutionSource::Path,
            });
        }

        let candidates = if cfg!(windows) {
            windows_candidates
        } else {
            unix_candidates
        };
        candidates
            .iter()
            .find(|candidate| candidate.exists())
            .map(|path| BinaryResolution {
                path: path.clone(),
                source: ResolutionSource::Candidate,
            })
    }

    /// Looks for `name` in npm's global bin directory.
    ///
    /// npm being absent and npm not having the binary both yield `None`; the
    /// former is logged so operators can tell the two apart.
    pub fn resolve_npm_global(&self, name: &str) -> Option<BinaryResolution> {
        let bin_dir = self.npm_global_bin_dir()?;
        npm_variants(name)
            .into_iter()
            .map(|variant| bin_dir.join(variant))
            .find(|path| path.is_file())
            .map(|path| BinaryResolution {
                path,
                source: ResolutionSource::NpmGlobal,
            })
    }

    fn search_path(&self, name: &str) -> Option<PathBuf> {
        let spec = LaunchSpec::new(search_program(), vec![name.to_string()]);
        let output = self.launcher.launch(&spec).ok()?;
        if !output.success() {
            return None;
        }
        let first = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())?;
        let path = PathBuf::from(first);
        // `which` can report entries whose file has since been removed.
        path.exists().then_some(path)
    }

    fn npm_global_bin_dir(&self) -> Option<PathBuf> {
        let spec = LaunchSpec::new(npm_program(), vec!["prefix".to_string(), "-g".to_string()]);
        let output = match self.launcher.launch(&spec) {
            Ok(output) => output,
            Err(err) => {
                self.log.info(
                    "resolver.npm_unavailable",
                    &format!("npm could not be started: {err}"),
                );
                return None;
            }
        };
        if !output.success() {
            self.log.info(
                "resolver.npm_unavailable",
                &format!(
                    "`npm prefix -g` exited with {:?}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            );
            return None;
        }
        let prefix = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())?;
        Some(global_bin_dir(Path::new(prefix)))
    }
}

fn search_program() -> &'static str {
    if cfg!(windows) {
        "where"
    } else {
        "which"
    }
}

fn npm_program() -> &'static str {
    if cfg!(windows) {
        "npm.cmd"
    } else {
        "npm"
    }
}

fn global_bin_dir(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.to_path_buf()
    } else {
        prefix.join("bin")
    }
}

/// File names to probe for `name`; Windows shims come before the bare name.
pub fn npm_variants(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![
            format!("{name}.exe"),
            format!("{name}.cmd"),
            name.to_string(),
        ]
    } else {
        vec![name.to_string()]
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::process::ProcessOutput;
    use std::fs;
    use tempfile::tempdir;

    struct FnLauncher<F>(F);

    impl<F> ProcessLauncher for FnLauncher<F>
    where
        F: Fn(&LaunchSpec) -> std::io::Result<ProcessOutput> + Send + Sync,
    {
        fn launch(&self, spec: &LaunchSpec) -> std::io::Result<ProcessOutput> {
            (self.0)(spec)
        }
    }

    fn found(stdout: &str) -> std::io::Result<ProcessOutput> {
        Ok(ProcessOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    #[test]
    fn search_path_hit_wins_over_candidates() {
        let dir = tempdir().expect("tempdir");
        let on_path = dir.path().join("claude");
        let candidate = dir.path().join("candidate-claude");
        fs::write(&on_path, "").expect("write");
        fs::write(&candidate, "").expect("write");
        let reported = format!("{}\n", on_path.display());
        let launcher = FnLauncher(move |_: &LaunchSpec| found(&reported));
        let log = RuntimeLog::disabled();

        let resolved = BinaryResolver::new(&launcher, &log)
            .resolve("claude", &[candidate.clone()], &[candidate])
            .expect("resolved");
        assert_eq!(resolved.source, ResolutionSource::Path);
        assert_eq!(resolved.path, on_path);
    }

    #[test]
    fn stale_search_path_entry_falls_through_to_first_existing_candidate() {
        let dir = tempdir().expect("tempdir");
        let stale = dir.path().join("removed-claude");
        let missing_candidate = dir.path().join("nope");
        let candidate = dir.path().join("installed-claude");
        fs::write(&candidate, "").expect("write");
        let reported = format!("{}\n", stale.display());
        let launcher = FnLauncher(move |_: &LaunchSpec| found(&reported));
        let log = RuntimeLog::disabled();

        let candidates = vec![missing_candidate, candidate.clone()];
        let resolved = BinaryResolver::new(&launcher, &log)
            .resolve("claude", &candidates, &candidates)
            .expect("resolved");
        assert_eq!(resolved.source, ResolutionSource::Candidate);
        assert_eq!(resolved.path, candidate);
    }

    #[test]
    fn failed_lookup_and_no_candidates_is_a_plain_miss() {
        let launcher = FnLauncher(|_: &LaunchSpec| -> std::io::Result<ProcessOutput> {
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: "claude not found".to_string(),
                exit_code: Some(1),
            })
        });
        let log = RuntimeLog::disabled();
        assert!(BinaryResolver::new(&launcher, &log)
            .resolve("claude", &[], &[])
            .is_none());
    }

    #[test]
    fn resolution_is_idempotent_for_unchanged_filesystem() {
        let dir = tempdir().expect("tempdir");
        let on_path = dir.path().join("codex");
        fs::write(&on_path, "").expect("write");
        let reported = on_path.display().to_string();
        let launcher = FnLauncher(move |_: &LaunchSpec| found(&reported));
        let log = RuntimeLog::disabled();
        let resolver = BinaryResolver::new(&launcher, &log);

        let first = resolver.resolve("codex", &[], &[]);
        let second = resolver.resolve("codex", &[], &[]);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn npm_global_lookup_uses_prefix_bin_dir() {
        let dir = tempdir().expect("tempdir");
        let bin_dir = global_bin_dir(dir.path());
        fs::create_dir_all(&bin_dir).expect("bin dir");
        let installed = bin_dir.join(&npm_variants("claude")[0]);
        fs::write(&installed, "").expect("write");
        let prefix = dir.path().display().to_string();
        let launcher = FnLauncher(move |spec: &LaunchSpec| {
            assert_eq!(spec.args, vec!["prefix".to_string(), "-g".to_string()]);
            found(&prefix)
        });
        let log = RuntimeLog::disabled();

        let resolved = BinaryResolver::new(&launcher, &log)
            .resolve_npm_global("claude")
            .expect("resolved");
        assert_eq!(resolved.source, ResolutionSource::NpmGlobal);
        assert_eq!(resolved.path, installed);
    }

    #[test]
    fn missing_npm_is_logged_and_returns_none() {
        let dir = tempdir().expect("tempdir");
        let log_path = dir.path().join("runtime.log");
        let log = RuntimeLog::new(&log_path);
        let launcher = FnLauncher(|_: &LaunchSpec| -> std::io::Result<ProcessOutput> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            ))
        });

        assert!(BinaryResolver::new(&launcher, &log)
            .resolve_npm_global("claude")
            .is_none());
        let events = crate::shared::logging::read_events(&log_path, "resolver.npm_unavailable");
        assert_eq!(events.len(), 1);
    }
}
