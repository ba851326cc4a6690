use serde_json::Value;

/// What an agent run printed, reduced to the reply text and, when the CLI
/// reports one, the session it ran in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub response: String,
    pub session_id: Option<String>,
}

/// Claude prints a single JSON object with `--output-format json`. Anything
/// that is not such an object, or lacks a reply field, is taken verbatim,
/// surrounding whitespace included.
pub fn parse_claude_output(stdout: &str) -> ParsedOutput {
    let verbatim = || ParsedOutput {
        response: stdout.to_string(),
        session_id: None,
    };

    let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) else {
        return verbatim();
    };
    let Some(response) = ["response", "result"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
    else {
        return verbatim();
    };

    ParsedOutput {
        response: response.trim().to_string(),
        session_id: string_field(&value, &["session_id", "sessionId"]),
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn extract_agent_message(item: &Value) -> Option<String> {
    for key in ["text", "message"] {
        if let Some(text) = item.get(key).and_then(Value::as_str) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    let content = item.get("content")?;
    if let Some(text) = content.as_str() {
        let trimmed = text.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    let lines = content
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Codex `exec --json` emits one event per line. The reply is the last
/// completed `agent_message` item; the thread id arrives in `thread.started`.
///
/// Returns `None` when the stream is not JSONL or carries no reply, in which
/// case callers fall back to the raw, untrimmed text.
pub fn parse_codex_jsonl(stdout: &str) -> Option<ParsedOutput> {
    let mut last_message = None;
    let mut thread_id = None;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).ok()?;

        match value.get("type").and_then(Value::as_str) {
            Some("thread.started") => {
                if let Some(id) = string_field(&value, &["thread_id", "threadId"]) {
                    thread_id = Some(id);
                }
            }
            Some("item.completed") => {
                let Some(item) = value.get("item") else {
                    continue;
                };
                if item.get("type").and_then(Value::as_str) != Some("agent_message") {
                    continue;
                }
                if let Some(message) = extract_agent_message(item) {
                    last_message = Some(message);
                }
            }
            _ => {}
        }
    }

    last_message.map(|response| ParsedOutput {
        response,
        session_id: thread_id,
    })
}
