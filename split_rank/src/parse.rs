//! Text extraction for result cells.
//!
//! Cells arrive as presentation text: a total time on the first line, the
//! segment time (with an optional placing in parentheses) on the second, and
//! an optional annotation on the third. Lines are separated either by HTML
//! break tags or by newlines; both are accepted everywhere in this module.

use std::sync::OnceLock;

use regex::Regex;

fn line_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>|\n").expect("valid regex"))
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+):(\d+)").expect("valid regex"))
}

fn int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

fn paren_int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\s*(\d+)\s*\)").expect("valid regex"))
}

/// Byte ranges of every line-break marker in `text`, in order.
pub fn line_breaks(text: &str) -> Vec<(usize, usize)> {
    line_break_re()
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect()
}

/// Text before the first line break (the whole text when there is none).
pub fn first_line(text: &str) -> &str {
    match line_break_re().find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

/// Text after the first line break, or `""` when there is no break.
pub fn after_first_line_break(text: &str) -> &str {
    match line_break_re().find(text) {
        Some(m) => &text[m.end()..],
        None => "",
    }
}

/// All logical lines of a cell.
pub fn split_lines(text: &str) -> Vec<&str> {
    line_break_re().split(text).collect()
}

/// First `minutes:seconds` occurrence, converted to seconds.
///
/// The seconds part is taken as written, so `"1:75"` yields 135.
pub fn parse_duration(text: &str) -> Option<u32> {
    let caps = duration_re().captures(text)?;
    let minutes: u32 = caps.get(1)?.as_str().parse().ok()?;
    let seconds: u32 = caps.get(2)?.as_str().parse().ok()?;
    minutes.checked_mul(60)?.checked_add(seconds)
}

/// First run of digits anywhere in the text.
pub fn parse_int(text: &str) -> Option<u32> {
    int_re().find(text)?.as_str().parse().ok()
}

/// First integer enclosed in parentheses, e.g. the `7` in `"1:02 (7)"`.
pub fn parse_parenthesized_int(text: &str) -> Option<u32> {
    let cleaned = normalize_spaces(text);
    let caps = paren_int_re().captures(&cleaned)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Replace non-breaking spaces (raw or as an entity) with plain spaces.
fn normalize_spaces(text: &str) -> String {
    text.replace("&nbsp;", " ").replace('\u{00A0}', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_takes_first_match() {
        assert_eq!(parse_duration("12:34 lap"), Some(754));
        assert_eq!(parse_duration("split 0:45, then 1:00"), Some(45));
        assert_eq!(parse_duration("no time"), None);
    }

    #[test]
    fn duration_overflow_is_absent() {
        assert_eq!(parse_duration("99999999999:00"), None);
    }

    #[test]
    fn line_splits_accept_html_and_newlines() {
        let cell = "1:02:03<br>10:15 (4)<BR />x";
        assert_eq!(first_line(cell), "1:02:03");
        assert_eq!(after_first_line_break(cell), "10:15 (4)<BR />x");
        assert_eq!(split_lines(cell), vec!["1:02:03", "10:15 (4)", "x"]);

        let plain = "5:00\n1:00 (2)";
        assert_eq!(first_line(plain), "5:00");
        assert_eq!(after_first_line_break(plain), "1:00 (2)");
    }

    #[test]
    fn no_break_means_empty_tail() {
        assert_eq!(first_line("5:00"), "5:00");
        assert_eq!(after_first_line_break("5:00"), "");
        assert_eq!(line_breaks("a<br/>b\nc"), vec![(1, 6), (7, 8)]);
    }

    #[test]
    fn integers() {
        assert_eq!(parse_int("47."), Some(47));
        assert_eq!(parse_int("DNF"), None);
        assert_eq!(parse_parenthesized_int("1:02 (7)"), Some(7));
        assert_eq!(parse_parenthesized_int("1:02 ( 12 )"), Some(12));
        assert_eq!(parse_parenthesized_int("1:02&nbsp;(&nbsp;3&nbsp;)"), Some(3));
        assert_eq!(parse_parenthesized_int("1:02 (\u{00A0}9)"), Some(9));
        assert_eq!(parse_parenthesized_int("1:02"), None);
        assert_eq!(parse_parenthesized_int("(x)"), None);
    }
}
