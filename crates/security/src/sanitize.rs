//! Input sanitation — neutralize script-like constructs in user text.
//!
//! The result is a fixpoint: removing one construct can splice together
//! another (`<scr<script></script>ipt>`), so passes repeat until nothing
//! changes. This makes `sanitize_input` idempotent.

use regex_lite::Regex;
use std::sync::LazyLock;

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("built-in pattern compiles")
});

/// Unpaired opening or closing tags left after block removal.
static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?script\b[^>]*>").expect("built-in pattern compiles"));

static SCRIPT_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:javascript|vbscript|livescript)\s*:").expect("built-in pattern compiles")
});

/// Inline event-handler attributes: `onclick="..."`, `onerror=alert(1)`.
static EVENT_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bon(?:abort|blur|change|click|dblclick|error|focus|input|key[a-z]*|load|mouse[a-z]*|pointer[a-z]*|submit|touch[a-z]*|unload|wheel|drag[a-z]*|animation[a-z]*|toggle|begin|end)\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#,
    )
    .expect("built-in pattern compiles")
});

/// Clean raw user text.
///
/// Truncates to `max_len` characters, removes `<script>` blocks and tags,
/// `javascript:` style URIs and inline event handlers, collapses whitespace
/// runs to a single space and trims.
pub fn sanitize_input(text: &str, max_len: usize) -> String {
    let mut current: String = text.chars().take(max_len).collect();
    loop {
        let next = strip_pass(&current);
        if next == current {
            return current;
        }
        tracing::debug!(
            before = current.len(),
            after = next.len(),
            "Sanitizer pass changed input"
        );
        current = next;
    }
}

fn strip_pass(text: &str) -> String {
    let mut out = text.to_string();
    for re in [&*SCRIPT_BLOCK, &*SCRIPT_TAG, &*SCRIPT_URI, &*EVENT_ATTR] {
        if re.is_match(&out) {
            out = re.replace_all(&out, " ").into_owned();
        }
    }
    collapse_whitespace(&out)
}

/// Single spaces between words, no leading or trailing whitespace.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
