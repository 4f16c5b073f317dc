//! Input sanitization for user-supplied text

use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"</?[A-Za-z!][^<>]*>").expect("valid regex"));

/// Truncate to `max_chars`, strip HTML tags and control characters, then trim.
///
/// Newlines and tabs survive; every other control character is dropped.
pub fn sanitize(text: &str, max_chars: usize) -> String {
  let truncated: String = text.chars().take(max_chars).collect();
  let untagged = HTML_TAG.replace_all(&truncated, "");
  untagged
    .chars()
    .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
    .collect::<String>()
    .trim()
    .to_string()
}
