//! Quota-driven difficulty selection.
//!
//! Selection is stable and order-preserving: buckets are never shuffled, so
//! the output is deterministic for a given input ordering.

use tracing::debug;

use crate::domain::{CandidateQuestion, Difficulty};

#[derive(Clone, Copy, Debug)]
pub struct DifficultyRatios {
  pub easy: f32,
  pub medium: f32,
  pub hard: f32,
}

impl Default for DifficultyRatios {
  fn default() -> Self {
    Self { easy: 0.3, medium: 0.4, hard: 0.3 }
  }
}

/// Integer per-bucket quotas summing exactly to `total`.
/// Rounding remainder is reconciled one step at a time, medium first, then
/// easy, then hard.
pub fn quotas(total: usize, ratios: &DifficultyRatios) -> [usize; 3] {
  let mut desired = [
    (total as f32 * ratios.easy).round() as i64,
    (total as f32 * ratios.medium).round() as i64,
    (total as f32 * ratios.hard).round() as i64,
  ];
  let order = [1usize, 0, 2]; // medium, easy, hard
  let mut diff = total as i64 - desired.iter().sum::<i64>();
  let mut i = 0;
  while diff != 0 {
    let k = order[i % order.len()];
    if diff > 0 {
      desired[k] += 1;
      diff -= 1;
    } else if desired[k] > 0 {
      desired[k] -= 1;
      diff += 1;
    }
    i += 1;
  }
  [desired[0] as usize, desired[1] as usize, desired[2] as usize]
}

fn bucket(d: Difficulty) -> usize {
  match d {
    Difficulty::Easy => 0,
    Difficulty::Medium => 1,
    Difficulty::Hard => 2,
  }
}

/// Select `min(total, |candidates|)` items approximating the target ratios.
/// Each bucket contributes up to its quota in original order; if a bucket is
/// under-supplied, the shortfall is backfilled from the remaining candidates,
/// again in original order.
pub fn balance_by_difficulty(
  candidates: Vec<CandidateQuestion>,
  total: usize,
  ratios: &DifficultyRatios,
) -> Vec<CandidateQuestion> {
  let total = total.min(candidates.len());
  if total == 0 {
    return Vec::new();
  }

  let q = quotas(total, ratios);
  let mut taken = vec![false; candidates.len()];
  let mut counts = [0usize; 3];
  for (i, c) in candidates.iter().enumerate() {
    let b = bucket(c.difficulty);
    if counts[b] < q[b] {
      taken[i] = true;
      counts[b] += 1;
    }
  }

  let mut n: usize = counts.iter().sum();
  if n < total {
    debug!(target: "pipeline", short = total - n, "Under-supplied difficulty bucket; backfilling");
    for flag in taken.iter_mut() {
      if n >= total {
        break;
      }
      if !*flag {
        *flag = true;
        n += 1;
      }
    }
  }

  candidates
    .into_iter()
    .zip(taken)
    .filter_map(|(c, keep)| keep.then_some(c))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuestionKind;

  fn candidate(text: &str, d: Difficulty) -> CandidateQuestion {
    CandidateQuestion {
      kind: QuestionKind::FreeResponse,
      question_text: text.into(),
      answer_text: "a".into(),
      difficulty: d,
      max_score: 3,
      options: None,
      correct_index: None,
      worked_solution: None,
      answer_fallback: false,
    }
  }

  fn pool(easy: usize, medium: usize, hard: usize) -> Vec<CandidateQuestion> {
    let mut out = Vec::new();
    for i in 0..easy {
      out.push(candidate(&format!("e{i}"), Difficulty::Easy));
    }
    for i in 0..medium {
      out.push(candidate(&format!("m{i}"), Difficulty::Medium));
    }
    for i in 0..hard {
      out.push(candidate(&format!("h{i}"), Difficulty::Hard));
    }
    out
  }

  fn count(items: &[CandidateQuestion], d: Difficulty) -> usize {
    items.iter().filter(|c| c.difficulty == d).count()
  }

  #[test]
  fn exact_partition_for_30() {
    assert_eq!(quotas(30, &DifficultyRatios::default()), [9, 12, 9]);
    let out = balance_by_difficulty(pool(30, 30, 30), 30, &DifficultyRatios::default());
    assert_eq!(out.len(), 30);
    assert_eq!(count(&out, Difficulty::Easy), 9);
    assert_eq!(count(&out, Difficulty::Medium), 12);
    assert_eq!(count(&out, Difficulty::Hard), 9);
  }

  #[test]
  fn remainder_handling_for_10() {
    assert_eq!(quotas(10, &DifficultyRatios::default()), [3, 4, 3]);
  }

  #[test]
  fn remainder_goes_to_medium_first() {
    // 1/3 each over 7 rounds to 2+2+2; the leftover slot lands in medium.
    let r = DifficultyRatios { easy: 1.0 / 3.0, medium: 1.0 / 3.0, hard: 1.0 / 3.0 };
    assert_eq!(quotas(7, &r), [2, 3, 2]);
  }

  #[test]
  fn under_supplied_bucket_is_backfilled_in_order() {
    // No hard questions at all: the 9 hard slots fall to leftover easy/medium.
    let out = balance_by_difficulty(pool(20, 20, 0), 30, &DifficultyRatios::default());
    assert_eq!(out.len(), 30);
    assert_eq!(count(&out, Difficulty::Hard), 0);
    assert_eq!(count(&out, Difficulty::Easy) + count(&out, Difficulty::Medium), 30);
    // Quota picks stay ahead of backfill picks within each bucket's order.
    assert_eq!(out[0].question_text, "e0");
  }

  #[test]
  fn short_input_is_returned_whole() {
    let out = balance_by_difficulty(pool(2, 1, 0), 30, &DifficultyRatios::default());
    assert_eq!(out.len(), 3);
    assert!(balance_by_difficulty(Vec::new(), 30, &DifficultyRatios::default()).is_empty());
  }

  #[test]
  fn selection_is_deterministic_and_order_preserving() {
    let input = pool(10, 10, 10);
    let a = balance_by_difficulty(input.clone(), 12, &DifficultyRatios::default());
    let b = balance_by_difficulty(input.clone(), 12, &DifficultyRatios::default());
    let texts =
      |v: &[CandidateQuestion]| v.iter().map(|c| c.question_text.clone()).collect::<Vec<_>>();
    assert_eq!(texts(&a), texts(&b));
    // Original relative order survives selection.
    let pos =
      |v: &[CandidateQuestion], t: &str| v.iter().position(|c| c.question_text == t);
    if let (Some(e), Some(m)) = (pos(&a, "e0"), pos(&a, "m0")) {
      assert!(e < m);
    }
  }
}
