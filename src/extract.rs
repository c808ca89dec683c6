//! Recovering candidate question objects from raw oracle output.
//!
//! The oracle is untrusted: it may return a clean JSON array, the same array
//! wrapped in markdown fences, prose with JSON buried inside, or garbage.
//! Strategies run in order of decreasing trust; the first that yields
//! anything wins. Nothing here ever errors — malformed input degrades to an
//! empty list and the pass simply contributes no candidates.

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::util::trunc_for_log;

/// Raw oracle output: already-structured JSON (strict-JSON mode) or free text.
#[derive(Clone, Debug)]
pub enum OracleReply {
  Json(Value),
  Text(String),
}

/// Recover a list of loosely-typed question objects, or an empty list.
pub fn extract_candidates(reply: &OracleReply) -> Vec<Value> {
  match reply {
    OracleReply::Json(v) => from_structured(v),
    OracleReply::Text(s) => from_text(s),
  }
}

fn from_structured(v: &Value) -> Vec<Value> {
  match v {
    Value::Array(items) => items.clone(),
    Value::Object(map) => match map.get("questions") {
      Some(Value::Array(items)) => items.clone(),
      _ => vec![v.clone()],
    },
    // Double-encoded payloads show up now and then; unwrap and retry as text.
    Value::String(s) => from_text(s),
    _ => Vec::new(),
  }
}

fn from_text(raw: &str) -> Vec<Value> {
  let cleaned = raw.replace("```json", "").replace("```", "");
  let cleaned = cleaned.trim();
  if cleaned.is_empty() {
    return Vec::new();
  }

  // Full-document parse: the reply is exactly the JSON we asked for.
  if let Ok(v) = serde_json::from_str::<Value>(cleaned) {
    let items = from_structured(&v);
    if !items.is_empty() {
      return items;
    }
  }

  // Longest bracket-delimited array containing a question-shaped object.
  let mut arrays = delimited_spans(cleaned, b'[', b']');
  arrays.sort_by_key(|(s, e)| std::cmp::Reverse(e - s));
  for (s, e) in &arrays {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&cleaned[*s..*e]) {
      if !items.is_empty() && items.iter().any(is_question_shaped) {
        return items;
      }
    }
  }

  // An object wrapping a "questions" array somewhere in the prose.
  let objects = delimited_spans(cleaned, b'{', b'}');
  if let Some(key_re) = re(r#""questions"\s*:\s*\["#) {
    for (s, e) in &objects {
      let frag = &cleaned[*s..*e];
      if !key_re.is_match(frag) {
        continue;
      }
      if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(frag) {
        if let Some(Value::Array(items)) = map.get("questions") {
          if !items.is_empty() {
            return items.clone();
          }
        }
      }
    }
  }

  // Last resort: standalone `{...}` fragments carrying a type marker.
  let mut salvaged = Vec::new();
  if let Some(marker_re) = re(r#""type"\s*:\s*"(?:mcq|theory)""#) {
    for (s, e) in &objects {
      let frag = &cleaned[*s..*e];
      if !marker_re.is_match(frag) {
        continue;
      }
      if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(frag) {
        salvaged.push(v);
      }
    }
  }

  if salvaged.is_empty() {
    warn!(target: "pipeline", preview = %trunc_for_log(cleaned, 120), "Could not extract question JSON from oracle reply");
  }
  salvaged
}

fn is_question_shaped(v: &Value) -> bool {
  v.as_object()
    .map(|o| o.contains_key("type") || o.contains_key("question_text"))
    .unwrap_or(false)
}

/// Byte spans of balanced `open..close` regions at top level, skipping over
/// JSON string literals (so a bracket inside a quoted value never closes a
/// span). Intentionally a small scanner, not a full parser: serde does the
/// real validation on each span afterwards.
fn delimited_spans(text: &str, open: u8, close: u8) -> Vec<(usize, usize)> {
  let bytes = text.as_bytes();
  let mut spans = Vec::new();
  let mut depth = 0usize;
  let mut start = 0usize;
  let mut in_str = false;
  let mut escaped = false;

  for (i, &b) in bytes.iter().enumerate() {
    if in_str {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == b'"' {
        in_str = false;
      }
      continue;
    }
    if b == b'"' && depth > 0 {
      in_str = true;
    } else if b == open {
      if depth == 0 {
        start = i;
      }
      depth += 1;
    } else if b == close && depth > 0 {
      depth -= 1;
      if depth == 0 {
        spans.push((start, i + 1));
      }
    }
  }
  spans
}

fn re(pattern: &str) -> Option<Regex> {
  Regex::new(pattern).ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  const ARRAY: &str = r#"[
    {"type": "mcq", "question_text": "Q1?", "options": ["a", "b", "c", "d"], "correct_answer": "a"},
    {"type": "theory", "question_text": "Q2?", "answer_text": "A2"}
  ]"#;

  fn texts(items: &[Value]) -> Vec<String> {
    items
      .iter()
      .map(|v| v["question_text"].as_str().unwrap_or_default().to_string())
      .collect()
  }

  #[test]
  fn all_wrappings_yield_the_same_list() {
    let bare = extract_candidates(&OracleReply::Text(ARRAY.to_string()));
    let fenced = extract_candidates(&OracleReply::Text(format!("```json\n{ARRAY}\n```")));
    let prose = extract_candidates(&OracleReply::Text(format!(
      "Here are your questions:\n\n{ARRAY}\n\nLet me know if you need more."
    )));
    let keyed = extract_candidates(&OracleReply::Text(format!("{{\"questions\": {ARRAY}}}")));

    assert_eq!(bare.len(), 2);
    assert_eq!(texts(&bare), texts(&fenced));
    assert_eq!(texts(&bare), texts(&prose));
    assert_eq!(texts(&bare), texts(&keyed));
  }

  #[test]
  fn structured_values_short_circuit() {
    let v: Value = serde_json::from_str(ARRAY).unwrap();
    assert_eq!(extract_candidates(&OracleReply::Json(v.clone())).len(), 2);

    let wrapped = serde_json::json!({ "questions": v });
    assert_eq!(extract_candidates(&OracleReply::Json(wrapped)).len(), 2);

    let single = serde_json::json!({"type": "theory", "question_text": "Q?", "answer_text": "A"});
    let got = extract_candidates(&OracleReply::Json(single.clone()));
    assert_eq!(got, vec![single]);
  }

  #[test]
  fn garbage_degrades_to_empty() {
    assert!(extract_candidates(&OracleReply::Text("no json here at all".into())).is_empty());
    assert!(extract_candidates(&OracleReply::Text("{\"broken\": [".into())).is_empty());
    assert!(extract_candidates(&OracleReply::Text(String::new())).is_empty());
  }

  #[test]
  fn fragments_with_type_markers_are_salvaged() {
    let text = r#"Sure! First: {"type": "mcq", "question_text": "Q1?", "options": ["a","b","c","d"], "correct_answer": "b"}
      and also {"type": "theory", "question_text": "Q2?", "answer_text": "A2"} plus {"note": "not a question"}"#;
    let got = extract_candidates(&OracleReply::Text(text.into()));
    assert_eq!(got.len(), 2);
    assert_eq!(texts(&got), vec!["Q1?", "Q2?"]);
  }

  #[test]
  fn longest_array_wins_over_decoys() {
    let text = format!("Scores were [1, 2, 3] overall.\n{ARRAY}");
    let got = extract_candidates(&OracleReply::Text(text));
    assert_eq!(got.len(), 2);
  }

  #[test]
  fn brackets_inside_strings_do_not_break_spans() {
    let text = r#"[{"type": "theory", "question_text": "What does arr[0] mean?", "answer_text": "First [zeroth] element"}]"#;
    let got = extract_candidates(&OracleReply::Text(text.into()));
    assert_eq!(got.len(), 1);
    assert_eq!(got[0]["question_text"], "What does arr[0] mean?");
  }
}
