//! Terminal escape-sequence filtering.

use once_cell::sync::Lazy;
use regex::Regex;

/// ANSI/VT100 escape sequences: OSC strings, CSI sequences and two-byte
/// ESC-prefixed (Fe) sequences. Anything else passes through.
static ANSI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)", // OSC ending with BEL or ST
        r"|\x1b\[[0-?]*[ -/]*[@-~]",          // CSI
        r"|\x1b[@-Z\x5c-_]",                  // Fe
    ))
    .unwrap()
});

/// Strip ANSI escape codes from text.
pub fn strip_ansi_codes(text: &str) -> String {
    ANSI_REGEX.replace_all(text, "").into_owned()
}
