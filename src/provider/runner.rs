use crate::config::AgentSettings;
use crate::provider::diagnostics::{format_spawn_error, SpawnDiagnosticsInput};
use crate::provider::invocation::{ClaudeProfile, CliProfile, CodexProfile, SessionMode};
use crate::provider::process::{LaunchSpec, ProcessLauncher, ProcessOutput};
use crate::provider::resolve::{BinaryResolution, BinaryResolver, ResolutionSource};
use crate::provider::version::{is_known_bad, parse_version};
use crate::provider::{AdapterError, AdapterKind, AgentAdapter, SpawnOptions, SpawnResult};
use crate::shared::logging::RuntimeLog;
use std::path::PathBuf;
use std::sync::Arc;

/// Collaborators shared by every adapter.
#[derive(Clone)]
pub struct AdapterOptions {
    pub launcher: Arc<dyn ProcessLauncher>,
    pub log: RuntimeLog,
    /// Takes the place of the adapter's environment variable. Reported with
    /// source `env`.
    pub binary_override: Option<PathBuf>,
    pub known_bad_resume_versions: Vec<String>,
}

impl AdapterOptions {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, log: RuntimeLog) -> Self {
        Self {
            launcher,
            log,
            binary_override: None,
            known_bad_resume_versions: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: &AgentSettings) -> Self {
        self.known_bad_resume_versions = settings.known_bad_resume_versions.clone();
        self
    }
}

/// Runs one agent CLI family through the new/resume/continue state machine.
pub struct CliAdapter<P> {
    profile: P,
    options: AdapterOptions,
}

impl<P: CliProfile> CliAdapter<P> {
    pub fn new(profile: P, options: AdapterOptions) -> Self {
        Self { profile, options }
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    /// Environment override, then search path and known locations, then the
    /// npm global bin. Re-run on every call.
    pub fn locate_binary(&self) -> Result<BinaryResolution, AdapterError> {
        let spec = self.profile.binary();
        let env_path = self.options.binary_override.clone().or_else(|| {
            std::env::var_os(spec.env_var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });
        if let Some(path) = env_path {
            return Ok(BinaryResolution {
                path,
                source: ResolutionSource::Env,
            });
        }

        let resolver = BinaryResolver::new(self.options.launcher.as_ref(), &self.options.log);
        resolver
            .resolve(spec.name, &spec.unix_candidates, &spec.windows_candidates)
            .or_else(|| resolver.resolve_npm_global(spec.name))
            .ok_or_else(|| AdapterError::BinaryNotFound {
                adapter: self.profile.kind(),
                binary: spec.name.to_string(),
                env_var: spec.env_var.to_string(),
            })
    }

    /// Probes the installed version and warns when it is on the configured
    /// list of releases with a broken resume. Never fails the run.
    fn check_resume_version(&self, binary: &BinaryResolution) {
        if self.options.known_bad_resume_versions.is_empty() {
            return;
        }
        let spec = LaunchSpec::new(&binary.path, self.profile.version_args());
        let Ok(output) = self.options.launcher.launch(&spec) else {
            return;
        };
        let Some(version) = parse_version(&output.stdout).or_else(|| parse_version(&output.stderr))
        else {
            return;
        };
        if is_known_bad(&version, &self.options.known_bad_resume_versions) {
            self.options.log.warn(
                "adapter.version_warning",
                &format!(
                    "{} {} has a known --resume defect; expect session continuity failures",
                    self.profile.kind(),
                    version
                ),
            );
        }
    }

    fn run_attempt(
        &self,
        binary: &BinaryResolution,
        mode: SessionMode,
        options: &SpawnOptions,
    ) -> Result<ProcessOutput, AdapterError> {
        let args = self.profile.build_args(mode, options);
        let mut spec = LaunchSpec::new(&binary.path, args);
        spec.cwd = options.working_dir.clone();

        self.options.launcher.launch(&spec).map_err(|err| {
            let kind = self.profile.kind();
            let binary_spec = self.profile.binary();
            AdapterError::Spawn(format_spawn_error(&SpawnDiagnosticsInput {
                adapter_name: kind.as_str(),
                binary_path: &binary.path,
                binary_source: binary.source,
                env_var: binary_spec.env_var,
                working_dir: options.working_dir.as_deref(),
                error: &err,
                args: Some(&spec.args),
            }))
        })
    }
}

impl<P: CliProfile> AgentAdapter for CliAdapter<P> {
    fn kind(&self) -> AdapterKind {
        self.profile.kind()
    }

    fn spawn(&self, options: &SpawnOptions) -> Result<SpawnResult, AdapterError> {
        let kind = self.profile.kind();
        if options.session_id.trim().is_empty() {
            return Err(AdapterError::InvalidOptions {
                adapter: kind,
                reason: "session id must not be empty".to_string(),
            });
        }

        let binary = self.locate_binary()?;
        self.check_resume_version(&binary);

        let mut mode = SessionMode::initial(options.resume);
        loop {
            let output = self.run_attempt(&binary, mode, options)?;
            if output.success() {
                return Ok(self
                    .profile
                    .parse_output(&output.stdout, &options.session_id));
            }

            if self.profile.is_session_missing(&output.stderr) {
                if let Some(next) = mode.fallback() {
                    self.options.log.warn(
                        "adapter.resume_fallback",
                        &format!(
                            "{kind} has no session {}; continuing the most recent session instead",
                            options.session_id
                        ),
                    );
                    mode = next;
                    continue;
                }
            }

            let stderr = match output.stderr.trim() {
                "" => output.stdout.trim().to_string(),
                text => text.to_string(),
            };
            return Err(AdapterError::NonZeroExit {
                adapter: kind,
                exit_code: output.exit_code.unwrap_or(-1),
                stderr,
            });
        }
    }
}

pub fn build_adapter(kind: AdapterKind, options: AdapterOptions) -> Box<dyn AgentAdapter> {
    match kind {
        AdapterKind::Claude => Box::new(CliAdapter::new(ClaudeProfile, options)),
        AdapterKind::Codex => Box::new(CliAdapter::new(CodexProfile, options)),
    }
}

/// Runs only the binary lookup an adapter of `kind` would perform.
pub fn locate_adapter_binary(
    kind: AdapterKind,
    options: AdapterOptions,
) -> Result<BinaryResolution, AdapterError> {
    match kind {
        AdapterKind::Claude => CliAdapter::new(ClaudeProfile, options).locate_binary(),
        AdapterKind::Codex => CliAdapter::new(CodexProfile, options).locate_binary(),
    }
}
