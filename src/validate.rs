//! Schema validation and self-healing for loosely-typed candidates.
//!
//! Each extracted object either becomes a `CandidateQuestion` or is dropped
//! (logged, never fatal). MCQ answers go through a resolution cascade because
//! the oracle frequently echoes a paraphrase of the chosen option rather than
//! its literal text; the final step assigns the first option and flags the
//! item instead of rejecting it. Yield over strictness — the flag keeps the
//! trade auditable downstream.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{CandidateQuestion, Difficulty, QuestionKind};
use crate::util::truncate_with_ellipsis;

/// Validate a batch from one pass. Applies per-batch case-insensitive
/// exact-text dedup, independent of the semantic filter downstream.
pub fn validate_batch(parsed: &[Value], max_text_len: usize) -> Vec<CandidateQuestion> {
  let mut seen: HashSet<String> = HashSet::new();
  let mut out = Vec::new();
  for item in parsed {
    let Some(c) = validate_candidate(item, max_text_len) else { continue };
    let key = c.question_text.to_lowercase();
    if !seen.insert(key) {
      debug!(target: "pipeline", "Dropping exact-duplicate question text within batch");
      continue;
    }
    out.push(c);
  }
  out
}

fn validate_candidate(v: &Value, max_text_len: usize) -> Option<CandidateQuestion> {
  let obj = v.as_object()?;

  let kind = match obj.get("type").and_then(Value::as_str) {
    Some("mcq") => QuestionKind::MultipleChoice,
    Some("theory") => QuestionKind::FreeResponse,
    other => {
      debug!(target: "pipeline", kind = ?other, "Dropping candidate with unknown type tag");
      return None;
    }
  };

  let question_text = obj
    .get("question_text")
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())?;
  let question_text = truncate_with_ellipsis(question_text, max_text_len);

  let difficulty = obj
    .get("difficulty")
    .and_then(Value::as_str)
    .map(Difficulty::parse_lenient)
    .unwrap_or_default();

  let worked_solution = obj
    .get("workings")
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from);

  match kind {
    QuestionKind::MultipleChoice => {
      let options: Vec<String> = obj
        .get("options")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
      if options.len() != 4 {
        debug!(target: "pipeline", got = options.len(), "Dropping MCQ without exactly 4 options");
        return None;
      }
      let distinct: HashSet<&str> = options.iter().map(String::as_str).collect();
      if distinct.len() != 4 {
        debug!(target: "pipeline", "Dropping MCQ with duplicate options");
        return None;
      }

      let raw_answer = obj.get("correct_answer").and_then(Value::as_str)?;
      let (idx, fallback) = resolve_correct_answer(&options, raw_answer);
      if fallback {
        warn!(
          target: "pipeline",
          answer = %truncate_with_ellipsis(raw_answer, 60),
          assigned = %options[idx],
          "Answer did not resolve to any option; assigned first option"
        );
      }
      let answer_text = truncate_with_ellipsis(&options[idx], max_text_len);
      let max_score = positive_int(obj.get("max_score")).unwrap_or(1);

      Some(CandidateQuestion {
        kind,
        question_text,
        answer_text,
        difficulty,
        max_score,
        options: Some(options),
        correct_index: Some(idx),
        worked_solution,
        answer_fallback: fallback,
      })
    }
    QuestionKind::FreeResponse => {
      let answer_text = obj
        .get("answer_text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
      let answer_text = truncate_with_ellipsis(answer_text, max_text_len);
      let max_score = positive_int(obj.get("max_score")).unwrap_or(3);

      Some(CandidateQuestion {
        kind,
        question_text,
        answer_text,
        difficulty,
        max_score,
        options: None,
        correct_index: None,
        worked_solution,
        answer_fallback: false,
      })
    }
  }
}

fn positive_int(v: Option<&Value>) -> Option<u32> {
  v.and_then(Value::as_u64)
    .filter(|&n| n > 0)
    .and_then(|n| u32::try_from(n).ok())
}

/// Resolve the oracle's claimed answer against the options, healing format
/// drift in escalating steps. Returns the winning index and whether the
/// first-option fallback was used.
pub fn resolve_correct_answer(options: &[String], answer: &str) -> (usize, bool) {
  // Exact match
  if let Some(i) = options.iter().position(|o| o == answer) {
    return (i, false);
  }

  // Case-insensitive, whitespace-trimmed
  let ans = answer.trim().to_lowercase();
  if !ans.is_empty() {
    if let Some(i) = options.iter().position(|o| o.trim().to_lowercase() == ans) {
      return (i, false);
    }

    // Substring in either direction
    if let Some(i) = options.iter().position(|o| {
      let oc = o.trim().to_lowercase();
      oc.contains(&ans) || ans.contains(&oc)
    }) {
      return (i, false);
    }

    // Punctuation-stripped
    let ans_np = strip_punct(&ans);
    if !ans_np.is_empty() {
      if let Some(i) = options
        .iter()
        .position(|o| strip_punct(&o.trim().to_lowercase()) == ans_np)
      {
        return (i, false);
      }
    }
  }

  // Nothing matched: assign the first option and flag it.
  (0, true)
}

fn strip_punct(s: &str) -> String {
  s.chars().filter(|c| !c.is_ascii_punctuation()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn capitals() -> Vec<String> {
    vec!["Paris".into(), "London".into(), "Rome".into(), "Berlin".into()]
  }

  #[test]
  fn cascade_resolves_case_and_whitespace_before_fallback() {
    let (i, fb) = resolve_correct_answer(&capitals(), "paris ");
    assert_eq!((i, fb), (0, false));
    let (i, fb) = resolve_correct_answer(&capitals(), "LONDON");
    assert_eq!((i, fb), (1, false));
  }

  #[test]
  fn cascade_resolves_substring_and_punctuation() {
    let opts = vec![
      "The mitochondria".to_string(),
      "The nucleus".to_string(),
      "The ribosome".to_string(),
      "The membrane".to_string(),
    ];
    // Paraphrase containing the option text
    let (i, fb) = resolve_correct_answer(&opts, "it is the nucleus of the cell");
    assert_eq!((i, fb), (1, false));

    // Differs only by interior punctuation, so substring cannot match
    let laws = vec![
      "Newton's first law".to_string(),
      "Newton's second law".to_string(),
      "Newton's third law".to_string(),
      "Hooke's law".to_string(),
    ];
    let (i, fb) = resolve_correct_answer(&laws, "Newtons third law");
    assert_eq!((i, fb), (2, false));
  }

  #[test]
  fn unresolvable_answer_falls_back_flagged() {
    let (i, fb) = resolve_correct_answer(&capitals(), "Unrelated text");
    assert_eq!((i, fb), (0, true));
    let (i, fb) = resolve_correct_answer(&capitals(), "");
    assert_eq!((i, fb), (0, true));
  }

  #[test]
  fn mcq_needs_exactly_four_distinct_options() {
    let three = json!({
      "type": "mcq", "question_text": "Q?", "correct_answer": "a",
      "options": ["a", "b", "c"]
    });
    assert!(validate_batch(&[three], 250).is_empty());

    let dup = json!({
      "type": "mcq", "question_text": "Q?", "correct_answer": "a",
      "options": ["a", "a", "b", "c"]
    });
    assert!(validate_batch(&[dup], 250).is_empty());
  }

  #[test]
  fn defaults_and_required_fields() {
    let items = vec![
      json!({"type": "mcq", "question_text": "Q1?", "options": ["a","b","c","d"], "correct_answer": "b"}),
      json!({"type": "theory", "question_text": "Q2?", "answer_text": "A2"}),
      json!({"type": "theory", "question_text": "Q3?"}), // no answer -> dropped
      json!({"question_text": "no type"}),               // no tag -> dropped
      json!({"type": "essay", "question_text": "Q4?"}),  // unknown tag -> dropped
    ];
    let got = validate_batch(&items, 250);
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].max_score, 1);
    assert_eq!(got[0].difficulty, Difficulty::Medium);
    assert_eq!(got[0].correct_index, Some(1));
    assert_eq!(got[1].max_score, 3);
    assert!(got[1].options.is_none());
  }

  #[test]
  fn long_text_is_truncated_with_marker() {
    let long_q = "w".repeat(400);
    let item = json!({"type": "theory", "question_text": long_q, "answer_text": "ok"});
    let got = validate_batch(&[item], 250);
    assert_eq!(got[0].question_text.chars().count(), 250);
    assert!(got[0].question_text.ends_with("..."));
  }

  #[test]
  fn batch_dedup_is_case_insensitive() {
    let items = vec![
      json!({"type": "theory", "question_text": "What is osmosis?", "answer_text": "A"}),
      json!({"type": "theory", "question_text": "WHAT IS OSMOSIS?", "answer_text": "B"}),
    ];
    let got = validate_batch(&items, 250);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].answer_text, "A");
  }

  #[test]
  fn workings_are_carried_through() {
    let item = json!({
      "type": "mcq", "question_text": "2+2?", "options": ["3","4","5","6"],
      "correct_answer": "4", "difficulty": "easy",
      "workings": "Step 1: add the numbers.\nFinal answer: 4"
    });
    let got = validate_batch(&[item], 250);
    assert_eq!(got[0].worked_solution.as_deref(), Some("Step 1: add the numbers.\nFinal answer: 4"));
    assert_eq!(got[0].difficulty, Difficulty::Easy);
    assert!(!got[0].answer_fallback);
  }
}
