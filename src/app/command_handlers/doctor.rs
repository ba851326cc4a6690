use crate::app::command_support::{ensure_runtime_root, load_runtime_settings, runtime_log};
use crate::provider::{locate_adapter_binary, AdapterOptions, SystemLauncher};
use crate::queue::open_queue;
use crate::shared::time::now_millis;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct DoctorFinding {
    id: String,
    ok: bool,
    detail: String,
    remediation: String,
}

fn doctor_finding(
    id: impl Into<String>,
    ok: bool,
    detail: impl Into<String>,
    remediation: impl Into<String>,
) -> DoctorFinding {
    DoctorFinding {
        id: id.into(),
        ok,
        detail: detail.into(),
        remediation: remediation.into(),
    }
}

fn can_write_directory(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path).map_err(|e| format!("failed to create {}: {e}", path.display()))?;
    let probe = path.join(format!(".agentrelay-doctor-{}", now_millis()));
    fs::write(&probe, b"ok").map_err(|e| format!("failed to write {}: {e}", probe.display()))?;
    fs::remove_file(&probe).map_err(|e| format!("failed to remove {}: {e}", probe.display()))
}

pub fn cmd_doctor() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let mut findings = Vec::new();

    findings.push(match can_write_directory(&paths.root) {
        Ok(()) => doctor_finding(
            "state.root",
            true,
            format!("writable={}", paths.root.display()),
            "none",
        ),
        Err(err) => doctor_finding(
            "state.root",
            false,
            err,
            "grant write permission or point AGENTRELAY_HOME elsewhere",
        ),
    });

    let settings = match load_runtime_settings(&paths) {
        Ok(settings) => {
            findings.push(doctor_finding(
                "config.parse",
                true,
                format!("config={}", paths.settings_file().display()),
                "none",
            ));
            settings
        }
        Err(err) => {
            findings.push(doctor_finding(
                "config.parse",
                false,
                format!("settings load failed: {err}"),
                format!("fix {} and retry `agentrelay doctor`", paths.settings_file().display()),
            ));
            return Ok(render(findings));
        }
    };

    let token_env = settings.delivery.token_env.as_str();
    let token_ok = std::env::var(token_env)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);
    findings.push(doctor_finding(
        format!("env.{token_env}"),
        token_ok,
        "bot token used for chat delivery",
        format!("export {token_env} before starting the worker"),
    ));

    let kind = settings.agent.adapter;
    let options = AdapterOptions::new(Arc::new(SystemLauncher), runtime_log(&paths));
    findings.push(match locate_adapter_binary(kind, options) {
        Ok(resolved) => doctor_finding(
            format!("binary.{kind}"),
            true,
            format!("path={} source={}", resolved.path.display(), resolved.source),
            "none",
        ),
        Err(err) => doctor_finding(
            format!("binary.{kind}"),
            false,
            err.to_string(),
            format!("install the {kind} CLI or set its path override"),
        ),
    });

    let backend = settings.queue.backend.as_str();
    let queue_check = open_queue(&settings.queue, &paths.queue_root()).and_then(|q| q.ping());
    findings.push(match queue_check {
        Ok(()) => doctor_finding(
            format!("queue.{backend}"),
            true,
            format!("topic={}", settings.queue.topic),
            "none",
        ),
        Err(err) => doctor_finding(
            format!("queue.{backend}"),
            false,
            err.to_string(),
            "check queue.redis_url or AGENTRELAY_REDIS_URL and that the server is reachable",
        ),
    });

    Ok(render(findings))
}

fn render(findings: Vec<DoctorFinding>) -> String {
    let failed = findings.iter().filter(|f| !f.ok).count();
    let summary = if failed == 0 { "healthy" } else { "unhealthy" };
    let mut lines = vec![
        format!("summary={summary}"),
        format!("checks_total={}", findings.len()),
        format!("checks_failed={failed}"),
    ];
    for finding in findings {
        lines.push(format!(
            "check:{}={}",
            finding.id,
            if finding.ok { "ok" } else { "fail" }
        ));
        lines.push(format!("check:{}.detail={}", finding.id, finding.detail));
        if !finding.ok {
            lines.push(format!(
                "check:{}.remediation={}",
                finding.id, finding.remediation
            ));
        }
    }
    lines.join("\n")
}
