//! Relevance gate and greedy duplicate gate over candidate embeddings.
//!
//! Both gates are quality improvements, not correctness requirements: when
//! the oracle client is absent or any embedding call fails, the filter
//! degrades to a logged pass-through and the run continues with the raw
//! candidate list.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Tuning;
use crate::domain::CandidateQuestion;
use crate::embedding::{cosine, embed_cached, EmbeddingCache};
use crate::openai::OpenAI;

/// Drop off-topic candidates, then near-duplicates, preserving input order.
pub async fn relevance_and_dedupe(
  oa: Option<&OpenAI>,
  cache: &EmbeddingCache,
  lesson_text: &str,
  candidates: Vec<CandidateQuestion>,
  tuning: &Tuning,
) -> Vec<CandidateQuestion> {
  if candidates.is_empty() {
    return candidates;
  }
  let Some(oa) = oa else {
    info!(target: "pipeline", "No oracle client; semantic filter is a pass-through");
    return candidates;
  };

  let lesson_vec = match embed_cached(oa, cache, lesson_text).await {
    Ok(v) => v,
    Err(e) => {
      warn!(target: "pipeline", error = %e, "Lesson embedding unavailable; filter degraded to pass-through");
      return candidates;
    }
  };

  let mut vectors: Vec<Arc<Vec<f32>>> = Vec::with_capacity(candidates.len());
  for c in &candidates {
    match embed_cached(oa, cache, &c.question_text).await {
      Ok(v) => vectors.push(v),
      Err(e) => {
        warn!(target: "pipeline", error = %e, "Candidate embedding unavailable; filter degraded to pass-through");
        return candidates;
      }
    }
  }

  let vector_slices: Vec<&[f32]> = vectors.iter().map(|v| v.as_slice()).collect();
  let kept = select_with_vectors(
    &lesson_vec,
    &vector_slices,
    tuning.relevance_threshold,
    tuning.duplicate_threshold,
  );
  info!(
    target: "pipeline",
    kept = kept.len(),
    total = candidates.len(),
    "Semantic filter applied"
  );

  let mut keep_flags = vec![false; candidates.len()];
  for i in &kept {
    keep_flags[*i] = true;
  }
  candidates
    .into_iter()
    .zip(keep_flags)
    .filter_map(|(c, keep)| keep.then_some(c))
    .collect()
}

/// Pure selection core: indices of candidates that pass both gates, in input
/// order. Relevance drops anything below `relevance_threshold` against the
/// lesson vector; the duplicate gate is greedy and single-pass — a candidate
/// survives only if its similarity to every previously kept one stays below
/// `duplicate_threshold`. First encountered wins; no global optimum sought.
pub fn select_with_vectors<V: AsRef<[f32]>>(
  lesson_vec: &[f32],
  vectors: &[V],
  relevance_threshold: f32,
  duplicate_threshold: f32,
) -> Vec<usize> {
  let mut kept: Vec<usize> = Vec::new();
  for (i, v) in vectors.iter().enumerate() {
    let v = v.as_ref();
    if cosine(lesson_vec, v) < relevance_threshold {
      continue;
    }
    let duplicate = kept
      .iter()
      .any(|&j| cosine(v, vectors[j].as_ref()) >= duplicate_threshold);
    if !duplicate {
      kept.push(i);
    }
  }
  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, QuestionKind};
  use crate::embedding::l2_normalize;

  fn unit(v: Vec<f32>) -> Vec<f32> {
    let mut v = v;
    l2_normalize(&mut v);
    v
  }

  fn candidate(text: &str) -> CandidateQuestion {
    CandidateQuestion {
      kind: QuestionKind::FreeResponse,
      question_text: text.into(),
      answer_text: "a".into(),
      difficulty: Difficulty::Medium,
      max_score: 3,
      options: None,
      correct_index: None,
      worked_solution: None,
      answer_fallback: false,
    }
  }

  #[test]
  fn relevance_gate_drops_off_topic() {
    let lesson = unit(vec![1.0, 0.0, 0.0]);
    let vectors = vec![
      unit(vec![1.0, 0.1, 0.0]),  // on topic
      unit(vec![0.0, 1.0, 0.0]),  // orthogonal to the lesson
      unit(vec![0.9, 0.0, 0.9]),  // still related
    ];
    let kept = select_with_vectors(&lesson, &vectors, 0.45, 0.85);
    assert_eq!(kept, vec![0, 2]);
  }

  #[test]
  fn duplicate_gate_keeps_first_of_near_identical_pair() {
    let lesson = unit(vec![1.0, 0.0]);
    // Two vectors with cosine ~0.95, both relevant to the lesson.
    let a = unit(vec![1.0, 0.0]);
    let b = unit(vec![1.0, 0.33]);
    assert!(cosine(&a, &b) > 0.94 && cosine(&a, &b) < 0.96);

    let kept = select_with_vectors(&lesson, &[a, b], 0.45, 0.85);
    assert_eq!(kept, vec![0]);
  }

  #[test]
  fn duplicate_gate_is_greedy_single_pass() {
    let lesson = unit(vec![1.0, 0.0, 0.0]);
    let vectors = vec![
      unit(vec![1.0, 0.0, 0.0]),
      unit(vec![1.0, 0.3, 0.0]),  // dup of 0
      unit(vec![1.0, 0.0, 0.3]),  // dup of 0 too
      unit(vec![0.7, 0.7, 0.0]),  // distinct enough from 0
    ];
    let kept = select_with_vectors(&lesson, &vectors, 0.1, 0.9);
    assert_eq!(kept, vec![0, 3]);
  }

  #[tokio::test]
  async fn missing_oracle_is_a_pass_through() {
    let cache = EmbeddingCache::new();
    let candidates = vec![candidate("Q1?"), candidate("Q2?")];
    let out = relevance_and_dedupe(None, &cache, "lesson text", candidates.clone(), &Tuning::default()).await;
    assert_eq!(out.len(), candidates.len());
  }
}
