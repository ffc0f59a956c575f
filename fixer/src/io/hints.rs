//! Best-effort selector-usage hints for the proposal prompt.
//!
//! Extracts quoted selector strings from the error message and scans sibling
//! test files for lines using them. The scan is bounded (files, lines, hint
//! count) and sanitized (control characters stripped, lines truncated), and
//! any I/O failure degrades to an empty hint list.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

const MAX_FILES: usize = 20;
const MAX_LINES_PER_FILE: usize = 2_000;
const MAX_HINT_LEN: usize = 160;

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["'`]([^"'`\n]{2,80})["'`]"#).expect("quoted regex"));

/// Collect up to `limit` sanitized one-line hints showing how selectors named
/// in the error message are used by sibling test files.
pub fn selector_hints(test_path: &Path, error_message: &str, limit: usize) -> Vec<String> {
    let needles: Vec<String> = QUOTED_RE
        .captures_iter(error_message)
        .map(|caps| caps[1].to_string())
        .collect();
    if needles.is_empty() || limit == 0 {
        return Vec::new();
    }

    let Some(dir) = test_path.parent() else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut hints = Vec::new();
    for entry in entries.flatten().take(MAX_FILES) {
        let path = entry.path();
        if path == test_path || !path.is_file() {
            continue;
        }
        let Ok(contents) = fs::read_to_string(&path) else {
            continue;
        };
        let file_name = entry.file_name().to_string_lossy().into_owned();
        for line in contents.lines().take(MAX_LINES_PER_FILE) {
            if !needles.iter().any(|needle| line.contains(needle.as_str())) {
                continue;
            }
            hints.push(sanitize(&file_name, line));
            if hints.len() >= limit {
                debug!(hints = hints.len(), "hint limit reached");
                return hints;
            }
        }
    }
    debug!(hints = hints.len(), needles = needles.len(), "hints collected");
    hints
}

fn sanitize(file_name: &str, line: &str) -> String {
    let cleaned: String = line
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_HINT_LEN)
        .collect();
    format!("{file_name}: {cleaned}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_selector_usage_in_sibling_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let failing = temp.path().join("checkout.spec.ts");
        fs::write(&failing, "await page.click('#pay');\n").expect("write");
        fs::write(
            temp.path().join("cart.spec.ts"),
            "await page.click('#pay');\nawait page.fill('#qty', '2');\n",
        )
        .expect("write");

        let hints = selector_hints(&failing, "locator '#pay' not found", 5);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].starts_with("cart.spec.ts:"));
        assert!(hints[0].contains("#pay"));
    }

    #[test]
    fn failing_file_itself_is_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let failing = temp.path().join("only.spec.ts");
        fs::write(&failing, "await page.click('#pay');\n").expect("write");

        let hints = selector_hints(&failing, "locator '#pay' not found", 5);
        assert!(hints.is_empty());
    }

    #[test]
    fn respects_hint_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let failing = temp.path().join("a.spec.ts");
        fs::write(&failing, "").expect("write");
        let body = "page.click('#pay');\n".repeat(10);
        fs::write(temp.path().join("b.spec.ts"), body).expect("write");

        let hints = selector_hints(&failing, "missing '#pay'", 3);
        assert_eq!(hints.len(), 3);
    }

    #[test]
    fn no_quoted_strings_means_no_hints() {
        let temp = tempfile::tempdir().expect("tempdir");
        let failing = temp.path().join("a.spec.ts");
        fs::write(&failing, "").expect("write");
        assert!(selector_hints(&failing, "timeout exceeded", 5).is_empty());
    }

    #[test]
    fn hints_are_sanitized_and_truncated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let failing = temp.path().join("a.spec.ts");
        fs::write(&failing, "").expect("write");
        let long_line = format!("page.click('#pay'); // {}\n", "x".repeat(400));
        fs::write(temp.path().join("b.spec.ts"), long_line).expect("write");

        let hints = selector_hints(&failing, "missing '#pay'", 5);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].len() <= MAX_HINT_LEN + "b.spec.ts: ".len());
    }
}
