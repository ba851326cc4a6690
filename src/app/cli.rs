#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Worker,
    Enqueue,
    Resolve,
    Doctor,
    Logs,
    Stop,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "worker" => CliVerb::Worker,
        "enqueue" => CliVerb::Enqueue,
        "resolve" => CliVerb::Resolve,
        "doctor" => CliVerb::Doctor,
        "logs" => CliVerb::Logs,
        "stop" => CliVerb::Stop,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  worker [--once]                      Consume queued jobs until stopped".to_string(),
        "  enqueue <thread-id> <session-id> <prompt...> [--resume] [--user <name>] [--cwd <dir>]"
            .to_string(),
        "                                       Queue a job for the worker".to_string(),
        "  resolve [claude|codex]               Show which agent binary would be launched"
            .to_string(),
        "  doctor                               Run local environment and config checks"
            .to_string(),
        "  logs                                 Print recent runtime log lines".to_string(),
        "  stop                                 Ask a running worker to finish and exit"
            .to_string(),
        "  help                                 Show this help".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_parse_and_unknown_falls_through() {
        assert_eq!(parse_cli_verb("worker"), CliVerb::Worker);
        assert_eq!(parse_cli_verb("enqueue"), CliVerb::Enqueue);
        assert_eq!(parse_cli_verb("-h"), CliVerb::Help);
        assert_eq!(parse_cli_verb("start"), CliVerb::Unknown);
    }

    #[test]
    fn help_lists_every_verb() {
        let help = help_text();
        for verb in ["worker", "enqueue", "resolve", "doctor", "logs", "stop"] {
            assert!(help.contains(&format!("  {verb}")), "missing {verb}");
        }
    }
}
