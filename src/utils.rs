#![deny(missing_docs)]
//! Small shared constants and helpers used across the structuring pipeline.

use std::ascii::escape_default;

/// A type representing the address of a single IL statement or block.
pub type Addr = u64;

/// At what length a rendered operand or condition should be truncated in
/// debug output (graphviz labels, log lines) before being elided with `...`.
pub const OPERAND_TRUNCATE_LENGTH: usize = 100;

/// A constant representing the current version of the software, in semver format.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A constant representing the name of the software.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Debug-render color: sequence nodes.
pub const COLOR_SEQUENCE: &str = "#98ff64";
/// Debug-render color: condition nodes.
pub const COLOR_CONDITION: &str = "#ff6464";
/// Debug-render color: loop nodes.
pub const COLOR_LOOP: &str = "#64b2ff";
/// Debug-render color: switch/case nodes.
pub const COLOR_SWITCH: &str = "#ffd964";
/// Debug-render color: plain code/block nodes.
pub const COLOR_CODE: &str = "#cdcdcd";
/// Debug-render background color.
pub const COLOR_BACKGROUND: &str = "#1e1e1e";

/// Escapes a string using `std::ascii::escape_default`, for safe embedding
/// in a Graphviz HTML-like label.
pub fn escape_string<S>(input: S) -> String
where
    S: Into<String>,
{
    input
        .into()
        .bytes()
        .flat_map(escape_default)
        .map(char::from)
        .collect()
}

/// Truncates `s` to at most `OPERAND_TRUNCATE_LENGTH` characters, appending
/// an ellipsis if truncation occurred.
pub fn truncate_operand(s: &str) -> String {
    if s.chars().count() <= OPERAND_TRUNCATE_LENGTH {
        s.to_string()
    } else {
        let mut truncated: String = s.chars().take(OPERAND_TRUNCATE_LENGTH).collect();
        truncated.push_str("...");
        truncated
    }
}
