//! Reply cleanup before speech synthesis

use std::sync::LazyLock;

use regex::Regex;

/// `[...]` placeholder spans such as citations and link labels
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid regex"));

/// Markdown emphasis and code marker runs
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_`]+").expect("valid regex"));

/// Heading markers at the start of a line, along with surrounding blanks
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[\s#]+").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Turn raw model output into plain text a TTS voice can read
///
/// Strips markdown emphasis, headings and bracketed spans, then collapses
/// whitespace. Applying it twice gives the same result as applying it once.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let text = BRACKETED.replace_all(raw, "");
    let text = strip_emphasis(&text);
    let text = HEADING.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Drop marker runs unless they sit inside a word, as in `snake_case` or `2*3`
fn strip_emphasis(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for run in EMPHASIS.find_iter(text) {
        out.push_str(&text[last..run.start()]);

        let before = text[..run.start()].chars().next_back();
        let after = text[run.end()..].chars().next();
        if before.is_some_and(char::is_alphanumeric) && after.is_some_and(char::is_alphanumeric) {
            out.push_str(run.as_str());
        }
        last = run.end();
    }

    out.push_str(&text[last..]);
    out
}
