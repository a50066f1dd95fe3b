//! Output validation — the content firewall applied to backend-generated text.
//!
//! Stages run in a fixed order and each may reject or rewrite:
//!
//! 1. empty → reject
//! 2. shorter than the minimum → reject
//! 3. leaked error text → reject with an apology
//! 4. strip code-execution fragments
//! 5. collapse whitespace
//! 6. cut at the first repeat of an N-token window
//! 7. cap length, preferring a sentence boundary
//! 8. unwrap one pair of enclosing quotes
//! 9. minimum length again
//!
//! A rejection carries a user-safe message. The raw text is logged, never
//! returned.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Shown when the reply is empty or too short to be useful.
pub const DIDNT_UNDERSTAND: &str = "Извините, я не совсем понял. Можете переформулировать?";

/// Shown when the reply leaked internal error details.
pub const APOLOGY: &str =
    "Извините, что-то пошло не так. Попробуйте, пожалуйста, ещё раз чуть позже.";

/// Matched against the lower-cased text.
static ERROR_LEAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"traceback|stack ?trace|stacktrace",
        r#"|file "[^"]*", line \d+"#,
        r"|\bat [a-z_$][\w$.]*\([\w$.]*:\d+\)",
        r"|\b[a-z_.]*(?:exception|error)\b:",
        r"|internal server error|bad gateway|service unavailable|gateway time-?out",
        r"|\bhttp(?:/\d(?:\.\d)?)?\s*[45]\d\d\b",
        r"|\bstatus(?: code)?\s*:?\s*[45]\d\d\b",
        r"|(?:ошибка|код ошибки)\s*:?\s*[45]\d\d\b",
        r"|\b(?:null|undefined|nan)\b",
    ))
    .expect("built-in pattern compiles")
});

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```|```.*$").expect("built-in pattern compiles"));

static EVAL_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:eval|exec|os\.system|os\.popen|subprocess\.[a-z_]+)\s*\([^)]*\)?")
        .expect("built-in pattern compiles")
});

static SHELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)^\s*\$\s+\S.*$",
        r"|\$\([^)]*\)",
        r"|\b(?:ba|z)?sh\s+-c\s+\S+",
        r"|\brm\s+-[rf]{1,2}\s+\S+",
        r"|\bsudo\s+\S+",
        r"|\bcurl\s+\S+\s*\|\s*(?:ba)?sh\b",
    ))
    .expect("built-in pattern compiles")
});

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("built-in pattern compiles"));

const SENTENCE_ENDS: [char; 4] = ['.', '!', '?', '…'];

const QUOTE_PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('«', '»'), ('“', '”')];

/// Tunables of the validator.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPolicy {
    /// Upper bound in characters.
    pub max_len: usize,
    /// Lower bound in characters.
    pub min_len: usize,
    /// Token window whose later repeat marks a looping generation.
    pub repetition_window: usize,
    /// Share of the length window searched backwards for a sentence end.
    pub sentence_tail_fraction: f32,
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            max_len: 1500,
            min_len: 3,
            repetition_window: 5,
            sentence_tail_fraction: 0.3,
        }
    }
}

/// Why a reply was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Empty,
    TooShort,
    ErrorLeak,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::TooShort => "too_short",
            Self::ErrorLeak => "error_leak",
        })
    }
}

/// Outcome of validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    Accepted(String),
    Rejected {
        reason: RejectReason,
        message: &'static str,
    },
}

impl Validated {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected { reason, .. } => Some(*reason),
        }
    }

    /// The text to show the user: the cleaned reply or the safe substitute.
    pub fn into_text(self) -> String {
        match self {
            Self::Accepted(text) => text,
            Self::Rejected { message, .. } => message.to_string(),
        }
    }

    fn reject(reason: RejectReason, raw: &str) -> Self {
        let message = match reason {
            RejectReason::ErrorLeak => APOLOGY,
            RejectReason::Empty | RejectReason::TooShort => DIDNT_UNDERSTAND,
        };
        warn!(%reason, raw = %raw, "Backend output rejected");
        Self::Rejected { reason, message }
    }
}

/// Runs the ordered validation stages. Stateless apart from its policy.
#[derive(Debug, Clone, Default)]
pub struct OutputValidator {
    policy: OutputPolicy,
}

impl OutputValidator {
    pub fn new(policy: OutputPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &OutputPolicy {
        &self.policy
    }

    pub fn validate(&self, raw: &str) -> Validated {
        if raw.trim().is_empty() {
            return Validated::reject(RejectReason::Empty, raw);
        }
        if char_len(raw.trim()) < self.policy.min_len {
            return Validated::reject(RejectReason::TooShort, raw);
        }
        if ERROR_LEAK.is_match(&raw.to_lowercase()) {
            return Validated::reject(RejectReason::ErrorLeak, raw);
        }

        let text = strip_code(raw);
        let text = collapse(&text);
        let text = cut_repetition(&text, self.policy.repetition_window);
        let text = cap_length(&text, self.policy.max_len, self.policy.sentence_tail_fraction);
        let text = unquote(&text);

        if char_len(&text) < self.policy.min_len {
            return Validated::reject(RejectReason::TooShort, raw);
        }
        Validated::Accepted(text)
    }
}

/// Validate with default tunables and an explicit length cap.
///
/// Returns `(true, cleaned)` or `(false, user-safe message)`.
pub fn validate_output(text: &str, max_len: usize) -> (bool, String) {
    let validator = OutputValidator::new(OutputPolicy {
        max_len,
        ..OutputPolicy::default()
    });
    let result = validator.validate(text);
    (result.is_accepted(), result.into_text())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn strip_code(text: &str) -> String {
    let mut out = text.to_string();
    for re in [&*CODE_FENCE, &*EVAL_CALL, &*SHELL] {
        if re.is_match(&out) {
            debug!(pattern = re.as_str(), "Stripping code fragment from reply");
            out = re.replace_all(&out, " ").into_owned();
        }
    }
    out
}

/// Spaces and tabs collapse to one space, every line is trimmed and at most
/// one blank line separates paragraphs.
fn collapse(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    let joined = lines.join("\n");
    BLANK_LINES.replace_all(&joined, "\n\n").trim().to_string()
}

/// Truncate where a `window`-token sequence first recurs without overlapping
/// its earlier occurrence.
fn cut_repetition(text: &str, window: usize) -> String {
    if window == 0 {
        return text.to_string();
    }
    let spans = token_spans(text);
    if spans.len() < window * 2 {
        return text.to_string();
    }
    let keys: Vec<String> = spans.iter().map(|&(s, e)| normalize_token(&text[s..e])).collect();

    let mut first_seen: HashMap<&[String], usize> = HashMap::new();
    for start in 0..=keys.len() - window {
        let key = &keys[start..start + window];
        match first_seen.get(key) {
            Some(&earlier) if earlier + window <= start => {
                let cut = spans[start].0;
                debug!(token = start, window, "Repetition detected, truncating reply");
                return text[..cut].trim_end().to_string();
            }
            Some(_) => {}
            None => {
                first_seen.insert(key, start);
            }
        }
    }
    text.to_string()
}

/// Byte spans of whitespace-separated tokens.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn normalize_token(token: &str) -> String {
    let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        token.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

fn cap_length(text: &str, max_len: usize, tail_fraction: f32) -> String {
    if char_len(text) <= max_len {
        return text.to_string();
    }
    let window: Vec<char> = text.chars().take(max_len).collect();
    let tail = (max_len as f32 * tail_fraction.clamp(0.0, 1.0)).round() as usize;
    let tail_start = max_len.saturating_sub(tail);

    if let Some(pos) = window
        .iter()
        .rposition(|c| SENTENCE_ENDS.contains(c))
        .filter(|&pos| pos >= tail_start)
    {
        return window[..=pos].iter().collect::<String>().trim_end().to_string();
    }

    let mut cut: String = window[..max_len.saturating_sub(1)].iter().collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

fn unquote(text: &str) -> String {
    let mut chars = text.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return text.to_string();
    };
    let inner = chars.as_str();
    let wrapped = QUOTE_PAIRS.iter().any(|&(open, close)| {
        first == open && last == close && !inner.contains(open) && !inner.contains(close)
    });
    if wrapped {
        inner.trim().to_string()
    } else {
        text.to_string()
    }
}
