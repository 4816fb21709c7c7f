//! Snippet cleanup on the way in, output capping on the way out.

use std::sync::LazyLock;

use regex::Regex;

/// A line holding nothing but an angle-bracket tag, such as `</code>`.
static TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*</?\w+>\s*$").expect("tag line pattern is valid"));

/// An inline tag fragment.
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?\w+>").expect("tag pattern is valid"));

/// Strip markup that leaked into a snippet from the calling protocol.
///
/// Lines that are only a tag are dropped, remaining tag fragments are removed,
/// leading blank lines and trailing whitespace are trimmed. Indentation of the
/// first code line is kept. Returns an empty string when nothing is left.
pub fn sanitize(code: &str) -> String {
    let kept: Vec<&str> = code.lines().filter(|line| !TAG_LINE.is_match(line)).collect();
    let joined = kept.join("\n");
    let stripped = TAG.replace_all(&joined, "");

    if stripped.trim().is_empty() {
        return String::new();
    }

    let mut lines: Vec<&str> = stripped.trim_end().lines().collect();
    let first_code = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(0);
    lines.drain(..first_code);
    lines.join("\n")
}

/// Cap `output` at `max_chars` characters.
///
/// When the output is longer, its tail is replaced with a marker giving the
/// original length; the marker counts towards `max_chars`.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }

    let marker = format!(
        "\n\n... [OUTPUT TRUNCATED - {} chars total]",
        group_thousands(total)
    );
    let marker_len = marker.chars().count();
    if marker_len >= max_chars {
        return marker.chars().take(max_chars).collect();
    }

    let keep = max_chars - marker_len;
    let cut = output
        .char_indices()
        .nth(keep)
        .map_or(output.len(), |(idx, _)| idx);
    format!("{}{}", &output[..cut], marker)
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
