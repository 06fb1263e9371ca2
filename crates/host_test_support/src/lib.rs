mod driver;
mod manual_scheduler;
mod recording_host;

pub use crate::driver::{
    MAX_TURNS, TestReconciler, new_reconciler, run_microtasks, run_next_task, run_until_idle,
};
pub use crate::manual_scheduler::{ManualScheduler, ScheduledTask, YieldPolicy};
pub use crate::recording_host::{HostOp, HostOpError, RecordingHost};

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch < ' ' => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\u{{{:02X}}}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Report of the first differing line between two snapshots or op logs,
/// with two lines of context on each side.
pub fn diff_lines(expected: &[String], actual: &[String]) -> String {
    use std::fmt::Write;

    let max = expected.len().max(actual.len());
    let missing = "<missing>";
    let line = |lines: &[String], i: usize| lines.get(i).map(String::as_str).unwrap_or(missing).to_string();
    let mismatch = (0..max).find(|&i| line(expected, i) != line(actual, i));

    let mut out = String::new();
    if let Some(i) = mismatch {
        let start = i.saturating_sub(2);
        let end = (i + 3).min(max);
        let _ = writeln!(&mut out, "first mismatch at line {} (showing {}..={}):", i + 1, start + 1, end);
        for line_idx in start..end {
            let marker = if line_idx == i { ">" } else { " " };
            let _ = writeln!(&mut out, "{marker} {:>4}  expected: {}", line_idx + 1, line(expected, line_idx));
            let _ = writeln!(&mut out, "{marker} {:>4}    actual: {}", line_idx + 1, line(actual, line_idx));
        }
    }
    let _ = writeln!(&mut out, "expected {} lines, actual {} lines", expected.len(), actual.len());
    out
}

/// Asserts two line lists are equal, panicking with a `diff_lines` report.
pub fn assert_lines_eq(expected: &[&str], actual: &[String]) {
    let expected: Vec<String> = expected.iter().map(|line| line.to_string()).collect();
    if expected != actual {
        panic!("lines differ\n{}", diff_lines(&expected, actual));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diff_points_at_first_mismatch() {
        let expected = vec!["a".to_string(), "b".to_string()];
        let actual = vec!["a".to_string(), "c".to_string(), "d".to_string()];
        let report = diff_lines(&expected, &actual);
        assert!(report.starts_with("first mismatch at line 2"));
        assert!(report.contains(">    2  expected: b"));
        assert!(report.contains("     3    actual: d"));
    }

    #[test]
    fn escape_text_quotes_control_characters() {
        assert_eq!(escape_text("a\"b\n\u{1}"), "a\\\"b\\n\\u{01}");
    }
}
