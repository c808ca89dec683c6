//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Whitespace-separated word count. Drives the chunk-vs-single-pass decision.
pub fn word_count(text: &str) -> usize {
  text.split_whitespace().count()
}

/// Split text into chunks of at most `chunk_size` words, preserving order.
/// The last chunk may be shorter. Empty input yields no chunks.
pub fn split_word_chunks(text: &str, chunk_size: usize) -> Vec<String> {
  if chunk_size == 0 {
    return vec![text.to_string()];
  }
  let words: Vec<&str> = text.split_whitespace().collect();
  words
    .chunks(chunk_size)
    .map(|w| w.join(" "))
    .filter(|c| !c.is_empty())
    .collect()
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
/// Counts chars (not bytes) so multi-byte text never splits mid-codepoint.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_string();
  }
  let keep = max.saturating_sub(3);
  let mut out: String = s.chars().take(keep).collect();
  out.push_str("...");
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    s.to_string()
  } else {
    let cut: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", cut, s.len())
  }
}
