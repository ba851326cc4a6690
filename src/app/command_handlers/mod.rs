use crate::app::cli::{help_text, parse_cli_verb, CliVerb};

pub mod daemon;
pub mod doctor;
pub mod jobs;
pub mod resolve;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Worker => daemon::cmd_worker(&args[1..]),
        CliVerb::Enqueue => jobs::cmd_enqueue(&args[1..]),
        CliVerb::Resolve => resolve::cmd_resolve(&args[1..]),
        CliVerb::Doctor => doctor::cmd_doctor(),
        CliVerb::Logs => daemon::cmd_logs(),
        CliVerb::Stop => daemon::cmd_stop(),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
