//! Presentation-free amount formatting used by status messages.

/// Renders minor units as a plain decimal string, e.g. `-1234` -> `-12.34`.
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let magnitude = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, magnitude / 100, magnitude % 100)
}
