pub mod corpus;
pub mod notation;

#[cfg(feature = "fixtures")]
pub mod fixtures;

pub use notation::{NotationError, TreeSpec, parse_tree};

/// Line diff used by tree and patch comparisons: reports the first
/// mismatching line with two lines of context on either side.
pub fn diff_lines(expected: &[String], actual: &[String]) -> String {
    use std::fmt::Write;

    let max = expected.len().max(actual.len());
    fn line<'a>(lines: &'a [String], i: usize) -> &'a str {
        lines.get(i).map(String::as_str).unwrap_or("<missing>")
    }
    let mismatch = (0..max).find(|&i| line(expected, i) != line(actual, i));

    let mut out = String::new();
    if let Some(i) = mismatch {
        let start = i.saturating_sub(2);
        let end = (i + 3).min(max);
        let _ = writeln!(
            &mut out,
            "first mismatch at line {} (showing {}..={}):",
            i + 1,
            start + 1,
            end
        );
        for idx in start..end {
            let marker = if idx == i { ">" } else { " " };
            let _ = writeln!(&mut out, "{marker} {:>4}  expected: {}", idx + 1, line(expected, idx));
            let _ = writeln!(&mut out, "{marker} {:>4}    actual: {}", idx + 1, line(actual, idx));
        }
    }
    let _ = writeln!(
        &mut out,
        "expected {} lines, actual {} lines",
        expected.len(),
        actual.len()
    );
    out
}

/// Panics with a line diff when `actual` differs from `expected`.
pub fn assert_lines_eq(context: &str, expected: &[String], actual: &[String]) {
    if expected != actual {
        panic!("{context}\n{}", diff_lines(expected, actual));
    }
}
