use agentrelay::provider::{
    locate_adapter_binary, AdapterError, AdapterKind, AdapterOptions, BinaryResolver, LaunchSpec,
    ProcessLauncher, ProcessOutput, ResolutionSource,
};
use agentrelay::shared::logging::RuntimeLog;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Answers `which` with a fixed path and reports npm as absent.
struct FakeHost {
    which_hit: Option<PathBuf>,
    launched: Mutex<Vec<String>>,
}

impl ProcessLauncher for FakeHost {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<ProcessOutput> {
        self.launched
            .lock()
            .expect("launched")
            .push(spec.command_form());
        if spec.program.to_string_lossy().starts_with("npm") {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "npm missing",
            ));
        }
        Ok(match &self.which_hit {
            Some(path) => ProcessOutput {
                stdout: format!("{}\n", path.display()),
                stderr: String::new(),
                exit_code: Some(0),
            },
            None => ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(1),
            },
        })
    }
}

#[test]
fn override_short_circuits_lookup_with_env_source() {
    let dir = tempdir().expect("tempdir");
    let host = Arc::new(FakeHost {
        which_hit: None,
        launched: Mutex::new(Vec::new()),
    });
    let mut options = AdapterOptions::new(host.clone(), RuntimeLog::disabled());
    let wanted = dir.path().join("my-claude");
    options.binary_override = Some(wanted.clone());

    let resolved = locate_adapter_binary(AdapterKind::Claude, options).expect("resolved");
    assert_eq!(resolved.path, wanted);
    assert_eq!(resolved.source, ResolutionSource::Env);
    assert!(host.launched.lock().expect("launched").is_empty());
}

#[test]
fn env_var_is_honoured_for_codex() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    let dir = tempdir().expect("tempdir");
    let wanted = dir.path().join("codex-bin");
    std::env::set_var("CODEX_PATH", &wanted);

    let host = Arc::new(FakeHost {
        which_hit: None,
        launched: Mutex::new(Vec::new()),
    });
    let resolved = locate_adapter_binary(
        AdapterKind::Codex,
        AdapterOptions::new(host, RuntimeLog::disabled()),
    );
    std::env::remove_var("CODEX_PATH");

    let resolved = resolved.expect("resolved");
    assert_eq!(resolved.path, wanted);
    assert_eq!(resolved.source, ResolutionSource::Env);
}

#[test]
fn search_path_hit_is_reported_with_path_source() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    std::env::remove_var("CLAUDE_PATH");
    let dir = tempdir().expect("tempdir");
    let on_path = dir.path().join("claude");
    fs::write(&on_path, "").expect("write");

    let host = Arc::new(FakeHost {
        which_hit: Some(on_path.clone()),
        launched: Mutex::new(Vec::new()),
    });
    let resolved = locate_adapter_binary(
        AdapterKind::Claude,
        AdapterOptions::new(host.clone(), RuntimeLog::disabled()),
    )
    .expect("resolved");

    assert_eq!(resolved.source, ResolutionSource::Path);
    assert_eq!(resolved.path, on_path);
    let launched = host.launched.lock().expect("launched");
    assert_eq!(launched.len(), 1);
    assert!(launched[0].ends_with(" claude"));
}

#[test]
fn resolver_misses_cleanly_and_logs_missing_npm() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("runtime.log");
    let log = RuntimeLog::new(&log_path);
    let host = FakeHost {
        which_hit: None,
        launched: Mutex::new(Vec::new()),
    };
    let resolver = BinaryResolver::new(&host, &log);

    let candidates = vec![dir.path().join("not-installed")];
    assert!(resolver.resolve("agent", &candidates, &candidates).is_none());
    assert!(resolver.resolve_npm_global("agent").is_none());

    let raw = fs::read_to_string(&log_path).expect("log");
    assert!(raw.contains("resolver.npm_unavailable"));
}

#[test]
fn not_found_error_names_the_env_var() {
    let err = AdapterError::BinaryNotFound {
        adapter: AdapterKind::Codex,
        binary: "codex".to_string(),
        env_var: "CODEX_PATH".to_string(),
    };
    let text = err.to_string();
    assert!(text.starts_with("codex binary `codex` was not found"));
    assert!(text.ends_with("set CODEX_PATH to its path"));
}
