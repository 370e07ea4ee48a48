//! Detection of a platform-managed decommission hook

use crate::constants::decommission::{DEFAULT_HOOK_TIMEOUT_SECS, HOOK_MARKERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookAnalysis {
    pub has_prestop_hook: bool,
    pub has_managed_hook: bool,
    pub hook_timeout_secs: u64,
}

/// Script text of a pre-stop command, unwrapping `/bin/sh -c "<script>"`
pub fn shell_command_text(command: &[String]) -> String {
    match command {
        [shell, flag, script, ..]
            if (shell == "/bin/sh" || shell == "/bin/bash" || shell == "sh" || shell == "bash")
                && flag == "-c" =>
        {
            script.clone()
        }
        _ => command.join(" "),
    }
}

pub fn analyze_hook(command: Option<&[String]>) -> HookAnalysis {
    match command {
        None => HookAnalysis {
            has_prestop_hook: false,
            has_managed_hook: false,
            hook_timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
        },
        Some(command) => {
            let (has_managed_hook, hook_timeout_secs) = analyze_script(&shell_command_text(command));
            HookAnalysis {
                has_prestop_hook: true,
                has_managed_hook,
                hook_timeout_secs,
            }
        }
    }
}

/// Whether the script runs the decommission utility, and its timeout
pub fn analyze_script(script: &str) -> (bool, u64) {
    if !HOOK_MARKERS.iter().any(|marker| script.contains(marker)) {
        return (false, DEFAULT_HOOK_TIMEOUT_SECS);
    }
    let timeout = parse_timeout_argument(script).unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS);
    (true, timeout)
}

/// Finds `-timeout 720`, `--timeout=12m`, `-t 1h` and similar forms
fn parse_timeout_argument(script: &str) -> Option<u64> {
    let tokens: Vec<&str> = script
        .split(|c: char| c.is_whitespace() || c == ';' || c == '"' || c == '\'')
        .filter(|t| !t.is_empty())
        .collect();

    for (idx, token) in tokens.iter().enumerate() {
        let Some(flag) = token.strip_prefix("--").or_else(|| token.strip_prefix('-')) else {
            continue;
        };

        let (name, inline_value) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (flag, None),
        };
        if name != "timeout" && name != "t" {
            continue;
        }

        let value = match inline_value {
            Some(value) => Some(value),
            None => tokens.get(idx + 1).copied(),
        };
        if let Some(seconds) = value.and_then(parse_duration_secs) {
            return Some(seconds);
        }
    }
    None
}

/// "720", "720s", "12m" or "1h" in seconds. Values that overflow are rejected.
pub fn parse_duration_secs(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last()? {
        's' => (&raw[..raw.len() - 1], 1),
        'm' => (&raw[..raw.len() - 1], 60),
        'h' => (&raw[..raw.len() - 1], 3600),
        c if c.is_ascii_digit() => (raw, 1),
        _ => return None,
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}
