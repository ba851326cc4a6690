/// Pulls the first dotted numeric version out of `--version` output, e.g.
/// `"1.0.51 (Claude Code)"` or `"codex-cli 0.46.0"`.
pub fn parse_version(output: &str) -> Option<String> {
    output.split_whitespace().find_map(|token| {
        let token = token.trim_start_matches(['v', 'V']).trim_end_matches([',', ')']);
        let mut parts = token.split('.');
        let looks_numeric = parts.clone().count() >= 2
            && parts.all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        looks_numeric.then(|| token.to_string())
    })
}

/// Matches a version against configured entries. An entry ending in `.*`
/// matches a whole release line; anything else must match exactly.
pub fn is_known_bad(version: &str, known_bad: &[String]) -> bool {
    known_bad.iter().map(|entry| entry.trim()).any(|entry| {
        match entry.strip_suffix(".*") {
            Some(prefix) => version
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => entry == version,
        }
    })
}
