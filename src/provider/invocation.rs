use crate::provider::output_parse::{parse_claude_output, parse_codex_jsonl};
use crate::provider::resolve::home_dir;
use crate::provider::{AdapterKind, SpawnOptions, SpawnResult};
use std::path::PathBuf;

/// How an invocation relates to the agent's own session history.
///
/// `ContinueFallback` is only reachable from `Resume`, and has no successor,
/// so a run can fall back at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    New,
    Resume,
    ContinueFallback,
}

impl SessionMode {
    pub fn initial(resume: bool) -> Self {
        if resume {
            Self::Resume
        } else {
            Self::New
        }
    }

    pub fn fallback(self) -> Option<Self> {
        match self {
            Self::Resume => Some(Self::ContinueFallback),
            Self::New | Self::ContinueFallback => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Resume => "resume",
            Self::ContinueFallback => "continue",
        }
    }
}

/// Where to look for an agent executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySpec {
    pub name: &'static str,
    pub env_var: &'static str,
    pub unix_candidates: Vec<PathBuf>,
    pub windows_candidates: Vec<PathBuf>,
}

/// The CLI-specific half of an adapter: argument vectors, failure
/// signatures and output format.
pub trait CliProfile: Send + Sync {
    fn kind(&self) -> AdapterKind;

    fn binary(&self) -> BinarySpec;

    fn build_args(&self, mode: SessionMode, options: &SpawnOptions) -> Vec<String>;

    fn version_args(&self) -> Vec<String> {
        vec!["--version".to_string()]
    }

    /// True when stderr says the requested session does not exist.
    fn is_session_missing(&self, stderr: &str) -> bool;

    fn parse_output(&self, stdout: &str, requested_session: &str) -> SpawnResult;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeProfile;

impl CliProfile for ClaudeProfile {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Claude
    }

    fn binary(&self) -> BinarySpec {
        let home = home_dir();
        let in_home = |rel: &str| home.as_ref().map(|h| h.join(rel));
        let appdata = std::env::var_os("APPDATA").map(PathBuf::from);
        let local_appdata = std::env::var_os("LOCALAPPDATA").map(PathBuf::from);

        BinarySpec {
            name: "claude",
            env_var: "CLAUDE_PATH",
            unix_candidates: [
                in_home(".claude/local/claude"),
                Some(PathBuf::from("/usr/local/bin/claude")),
                Some(PathBuf::from("/opt/homebrew/bin/claude")),
                in_home(".local/bin/claude"),
                in_home(".npm-global/bin/claude"),
            ]
            .into_iter()
            .flatten()
            .collect(),
            windows_candidates: [
                appdata.map(|dir| dir.join("npm").join("claude.cmd")),
                local_appdata.map(|dir| dir.join("Programs").join("claude").join("claude.exe")),
                in_home(".local/bin/claude.exe"),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }

    fn build_args(&self, mode: SessionMode, options: &SpawnOptions) -> Vec<String> {
        let mut args = vec![
            "--dangerously-skip-permissions".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        match mode {
            SessionMode::New => {
                args.push("--session-id".to_string());
                args.push(options.session_id.clone());
            }
            SessionMode::Resume => {
                args.push("--resume".to_string());
                args.push(options.session_id.clone());
            }
            SessionMode::ContinueFallback => args.push("--continue".to_string()),
        }
        if let Some(system_prompt) = non_empty(options.system_prompt.as_deref()) {
            args.push("--append-system-prompt".to_string());
            args.push(system_prompt.to_string());
        }
        args.push("-p".to_string());
        args.push(options.prompt.clone());
        args
    }

    fn is_session_missing(&self, stderr: &str) -> bool {
        let lowered = stderr.to_ascii_lowercase();
        ["no conversation found", "no session found", "session not found"]
            .iter()
            .any(|needle| lowered.contains(needle))
    }

    fn parse_output(&self, stdout: &str, requested_session: &str) -> SpawnResult {
        let parsed = parse_claude_output(stdout);
        SpawnResult {
            output: parsed.response,
            session_id: parsed
                .session_id
                .unwrap_or_else(|| requested_session.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CodexProfile;

impl CliProfile for CodexProfile {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Codex
    }

    fn binary(&self) -> BinarySpec {
        let home = home_dir();
        let in_home = |rel: &str| home.as_ref().map(|h| h.join(rel));
        let appdata = std::env::var_os("APPDATA").map(PathBuf::from);

        BinarySpec {
            name: "codex",
            env_var: "CODEX_PATH",
            unix_candidates: [
                Some(PathBuf::from("/usr/local/bin/codex")),
                Some(PathBuf::from("/opt/homebrew/bin/codex")),
                in_home(".local/bin/codex"),
                in_home(".cargo/bin/codex"),
            ]
            .into_iter()
            .flatten()
            .collect(),
            windows_candidates: [
                appdata.map(|dir| dir.join("npm").join("codex.cmd")),
                in_home(".cargo/bin/codex.exe"),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }

    /// Codex assigns its own thread ids, so a new session carries no id flag;
    /// the id comes back in the `thread.started` event instead.
    fn build_args(&self, mode: SessionMode, options: &SpawnOptions) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        match mode {
            SessionMode::New => {}
            SessionMode::Resume => {
                args.push("resume".to_string());
                args.push(options.session_id.clone());
            }
            SessionMode::ContinueFallback => {
                args.push("resume".to_string());
                args.push("--last".to_string());
            }
        }
        args.push("--json".to_string());
        args.push("--skip-git-repo-check".to_string());
        args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        if let Some(system_prompt) = non_empty(options.system_prompt.as_deref()) {
            let quoted = serde_json::to_string(system_prompt)
                .unwrap_or_else(|_| format!("\"{}\"", system_prompt.replace('"', "'")));
            args.push("--config".to_string());
            args.push(format!("instructions={quoted}"));
        }
        args.push(options.prompt.clone());
        args
    }

    fn is_session_missing(&self, stderr: &str) -> bool {
        let lowered = stderr.to_ascii_lowercase();
        [
            "no session found",
            "session not found",
            "no rollout found",
            "no conversation found",
        ]
        .iter()
        .any(|needle| lowered.contains(needle))
    }

    fn parse_output(&self, stdout: &str, requested_session: &str) -> SpawnResult {
        match parse_codex_jsonl(stdout) {
            Some(parsed) => SpawnResult {
                output: parsed.response,
                session_id: parsed
                    .session_id
                    .unwrap_or_else(|| requested_session.to_string()),
            },
            None => SpawnResult {
                output: stdout.to_string(),
                session_id: requested_session.to_string(),
            },
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
