//! The question generation & curation pipeline.
//!
//! One run per lesson: decide chunking, fan generation passes out as
//! independent tasks, pull candidates back through extraction and validation,
//! then filter, balance, and persist. Passes are independent failure domains:
//! an oracle error costs that pass its candidates, never the run. Only a
//! persistence failure marks the run failed; an empty yield persists a single
//! deterministic fallback question so downstream consumers always see at
//! least one item.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::balance::{balance_by_difficulty, DifficultyRatios};
use crate::domain::{CandidateQuestion, Difficulty, PersistedQuestion, QuestionKind, RunStatus};
use crate::extract::extract_candidates;
use crate::filter::relevance_and_dedupe;
use crate::openai::OpenAI;
use crate::state::AppState;
use crate::util::{fill_template, split_word_chunks, truncate_with_ellipsis, word_count};
use crate::validate::validate_batch;

pub const FALLBACK_QUESTION_TEXT: &str = "Summarize the main concepts covered in this lesson.";
const SUMMARY_LEN: usize = 150;
const MAX_CONCEPTS: usize = 10;
/// Concurrency cap on in-flight oracle calls within one run.
const MAX_CONCURRENT_PASSES: usize = 4;

/// One generation invocation: a focus framing (or chunk) plus its prompt.
struct PassSpec {
  name: String,
  user_prompt: String,
}

/// Run the full pipeline for one lesson and persist the outcome.
///
/// Returns the persisted rows. `Err` only on persistence failure; every other
/// fault degrades (smaller yield, pass-through filter, fallback question).
#[instrument(level = "info", skip(state, lesson_text), fields(text_len = lesson_text.len()))]
pub async fn run_generation(
  state: &AppState,
  lesson_id: i64,
  lesson_text: &str,
  total_questions: Option<usize>,
) -> Result<Vec<PersistedQuestion>, String> {
  let total = total_questions.unwrap_or(state.tuning.total_questions).max(1);
  let text = lesson_text.trim();
  let text: String = if text.is_empty() {
    "No text available for this lesson.".into()
  } else {
    text.to_string()
  };

  state
    .store
    .begin_run(lesson_id, Some(truncate_with_ellipsis(&text, SUMMARY_LEN)))
    .await;
  progress(state, lesson_id, RunStatus::Processing, 10, None).await;

  let words = word_count(&text);
  info!(target: "pipeline", lesson_id, words, total, "Starting question generation");

  let candidates = match &state.openai {
    Some(oa) => {
      if words < state.tuning.single_pass_word_limit {
        generate_focus_passes(state, oa, lesson_id, &text, total).await
      } else {
        generate_chunked(state, oa, lesson_id, &text).await
      }
    }
    None => {
      warn!(target: "pipeline", lesson_id, "No oracle client configured; run degrades to the fallback question");
      Vec::new()
    }
  };
  progress(state, lesson_id, RunStatus::Processing, 60, None).await;
  info!(target: "pipeline", lesson_id, raw_candidates = candidates.len(), "Generation passes aggregated");

  let filtered = relevance_and_dedupe(
    state.openai.as_ref(),
    &state.embeddings,
    &text,
    candidates,
    &state.tuning,
  )
  .await;

  let ratios = DifficultyRatios {
    easy: state.tuning.easy_ratio,
    medium: state.tuning.medium_ratio,
    hard: state.tuning.hard_ratio,
  };
  let selected = balance_by_difficulty(filtered, total, &ratios);
  progress(state, lesson_id, RunStatus::Processing, 85, Some(selected.len())).await;

  // Flatten, with a final cross-pass exact-text dedup (per-pass dedup cannot
  // see collisions between passes).
  let mut seen: HashSet<String> = HashSet::new();
  let mut rows: Vec<PersistedQuestion> = Vec::new();
  for c in &selected {
    if !seen.insert(c.question_text.to_lowercase()) {
      continue;
    }
    rows.push(PersistedQuestion::from_candidate(lesson_id, c));
  }
  if rows.is_empty() {
    warn!(target: "pipeline", lesson_id, "No candidates survived the pipeline; persisting the fallback question");
    rows.push(fallback_question(lesson_id, &text));
  }

  match state.store.replace_for_lesson(lesson_id, rows.clone()).await {
    Ok(count) => {
      progress(state, lesson_id, RunStatus::Done, 100, Some(count)).await;
      dump_questions_json(lesson_id, &rows);
      let cached_embeddings = state.embeddings.len().await;
      info!(target: "pipeline", lesson_id, count, cached_embeddings, "Question generation completed");
      Ok(rows)
    }
    Err(e) => {
      error!(target: "pipeline", lesson_id, error = %e, "Persistence failed; run marked failed");
      progress(state, lesson_id, RunStatus::Failed, 100, None).await;
      Err(format!("persistence failed: {e}"))
    }
  }
}

/// Short lessons: three focus passes over the whole text, each with its own
/// sub-quota (half recall, a quarter application, a quarter conceptual) and
/// prompt framing. Coverage beats a single monolithic call here.
async fn generate_focus_passes(
  state: &AppState,
  oa: &OpenAI,
  lesson_id: i64,
  text: &str,
  total: usize,
) -> Vec<CandidateQuestion> {
  let concepts = match oa.extract_key_concepts(&state.prompts, text, MAX_CONCEPTS).await {
    Ok(c) => c,
    Err(e) => {
      warn!(target: "pipeline", lesson_id, error = %e, "Concept extraction failed; conceptual pass runs unguided");
      Vec::new()
    }
  };
  let concept_list = if concepts.is_empty() {
    "the lesson's central ideas".to_string()
  } else {
    concepts.join(", ")
  };

  let application = (total as f32 * 0.25).round() as usize;
  let conceptual = application;
  let recall = total.saturating_sub(application + conceptual).max(1);

  let mut specs = Vec::new();
  for (name, count, template) in [
    ("recall", recall, &state.prompts.recall_user_template),
    ("application", application, &state.prompts.application_user_template),
    ("conceptual", conceptual, &state.prompts.conceptual_user_template),
  ] {
    if count == 0 {
      continue;
    }
    specs.push(PassSpec {
      name: name.to_string(),
      user_prompt: fill_template(
        template,
        &[
          ("count", count.to_string().as_str()),
          ("lesson_text", text),
          ("concepts", concept_list.as_str()),
        ],
      ),
    });
  }

  run_passes(state, oa, lesson_id, specs).await
}

/// Long lessons: fixed-size word chunks, a bounded quota from each.
async fn generate_chunked(
  state: &AppState,
  oa: &OpenAI,
  lesson_id: i64,
  text: &str,
) -> Vec<CandidateQuestion> {
  let chunks = split_word_chunks(text, state.tuning.chunk_size_words.max(1));
  let quota = state.tuning.per_chunk_quota.max(1);
  info!(target: "pipeline", lesson_id, chunks = chunks.len(), quota, "Long lesson; generating per chunk");

  let specs = chunks
    .iter()
    .enumerate()
    .map(|(i, chunk)| PassSpec {
      name: format!("chunk-{}", i + 1),
      user_prompt: fill_template(
        &state.prompts.chunk_user_template,
        &[("count", quota.to_string().as_str()), ("lesson_text", chunk.as_str())],
      ),
    })
    .collect();

  run_passes(state, oa, lesson_id, specs).await
}

/// Fan passes out as concurrent tasks and concatenate whatever comes back.
/// Each task captures its own errors; a failed or panicked pass contributes
/// zero candidates. Progress walks 10 → 60 as passes complete.
async fn run_passes(
  state: &AppState,
  oa: &OpenAI,
  lesson_id: i64,
  specs: Vec<PassSpec>,
) -> Vec<CandidateQuestion> {
  let pass_count = specs.len().max(1);
  let limiter = Arc::new(Semaphore::new(MAX_CONCURRENT_PASSES));
  let mut set = JoinSet::new();
  for spec in specs {
    let oa = oa.clone();
    let system = state.prompts.generation_system.clone();
    let max_text_len = state.tuning.max_text_len;
    let limiter = limiter.clone();
    set.spawn(async move {
      let _permit = limiter.acquire_owned().await.ok();
      run_single_pass(oa, system, spec, max_text_len).await
    });
  }

  let mut out = Vec::new();
  let mut completed = 0usize;
  while let Some(joined) = set.join_next().await {
    completed += 1;
    match joined {
      Ok(batch) => out.extend(batch),
      Err(e) => error!(target: "pipeline", lesson_id, error = %e, "Generation task aborted"),
    }
    let pct = 10 + (50 * completed / pass_count) as u8;
    progress(state, lesson_id, RunStatus::Processing, pct, None).await;
  }
  out
}

async fn run_single_pass(
  oa: OpenAI,
  system: String,
  spec: PassSpec,
  max_text_len: usize,
) -> Vec<CandidateQuestion> {
  match oa.generate_questions_raw(&spec.name, &system, &spec.user_prompt).await {
    Ok(reply) => {
      let parsed = extract_candidates(&reply);
      let validated = validate_batch(&parsed, max_text_len);
      info!(
        target: "pipeline",
        pass = %spec.name,
        raw = parsed.len(),
        valid = validated.len(),
        "Pass completed"
      );
      validated
    }
    Err(e) => {
      error!(target: "pipeline", pass = %spec.name, error = %e, "Pass failed; contributing zero candidates");
      Vec::new()
    }
  }
}

/// Update the local run record and mirror it upstream (best-effort).
async fn progress(
  state: &AppState,
  lesson_id: i64,
  status: RunStatus,
  pct: u8,
  count: Option<usize>,
) {
  state.store.update_run(lesson_id, status, pct, count).await;
  if let Some(reporter) = &state.reporter {
    reporter.report(lesson_id, status, pct, count).await;
  }
}

/// The deterministic last-resort question for a lesson that yielded nothing.
fn fallback_question(lesson_id: i64, text: &str) -> PersistedQuestion {
  let c = CandidateQuestion {
    kind: QuestionKind::FreeResponse,
    question_text: FALLBACK_QUESTION_TEXT.into(),
    answer_text: truncate_with_ellipsis(text, SUMMARY_LEN),
    difficulty: Difficulty::Medium,
    max_score: 3,
    options: None,
    correct_index: None,
    worked_solution: None,
    answer_fallback: false,
  };
  PersistedQuestion::from_candidate(lesson_id, &c)
}

/// Drop the final set to disk for manual QA when QA_DUMP_DIR is set.
/// Purely observational; any error is logged and ignored.
fn dump_questions_json(lesson_id: i64, rows: &[PersistedQuestion]) {
  let Ok(dir) = std::env::var("QA_DUMP_DIR") else { return };
  let dir = std::path::PathBuf::from(dir);
  if let Err(e) = std::fs::create_dir_all(&dir) {
    warn!(target: "pipeline", lesson_id, error = %e, "Could not create QA dump directory");
    return;
  }
  let path = dir.join(format!("lesson_{lesson_id}.json"));
  match serde_json::to_string_pretty(rows) {
    Ok(json) => {
      if let Err(e) = std::fs::write(&path, json) {
        warn!(target: "pipeline", lesson_id, error = %e, "Could not write QA dump");
      }
    }
    Err(e) => warn!(target: "pipeline", lesson_id, error = %e, "Could not serialize QA dump"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{Prompts, Tuning};
  use crate::embedding::EmbeddingCache;
  use crate::store::QuestionStore;

  fn test_state() -> AppState {
    AppState {
      store: QuestionStore::new(),
      openai: None,
      prompts: Prompts::default(),
      tuning: Tuning::default(),
      embeddings: EmbeddingCache::new(),
      reporter: None,
    }
  }

  #[tokio::test]
  async fn zero_yield_persists_single_fallback() {
    let state = test_state();
    let rows = run_generation(&state, 42, "Cells are the basic unit of life.", None)
      .await
      .expect("run");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].question_text, FALLBACK_QUESTION_TEXT);
    assert_eq!(rows[0].difficulty, Difficulty::Medium);
    assert_eq!(rows[0].answer_text, "Cells are the basic unit of life.");
    assert!(rows[0].correct_option.is_none());

    let stored = state.store.questions_for_lesson(42).await;
    assert_eq!(stored.len(), 1);

    let run = state.store.run_for_lesson(42).await.expect("run record");
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.progress, 100);
    assert_eq!(run.produced_count, 1);
  }

  #[tokio::test]
  async fn rerun_replaces_prior_generation() {
    let state = test_state();
    let first = run_generation(&state, 7, "First lesson text.", None).await.expect("first");
    let _ = run_generation(&state, 7, "Second lesson text.", None).await.expect("second");

    let stored = state.store.questions_for_lesson(7).await;
    assert_eq!(stored.len(), 1);
    assert_ne!(stored[0].id, first[0].id);
    assert_eq!(stored[0].answer_text, "Second lesson text.");
  }

  #[tokio::test]
  async fn blank_lesson_still_ends_done_with_an_answer() {
    let state = test_state();
    let rows = run_generation(&state, 9, "   ", None).await.expect("run");
    assert_eq!(rows[0].answer_text, "No text available for this lesson.");

    let run = state.store.run_for_lesson(9).await.expect("run record");
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.summary.as_deref(), Some("No text available for this lesson."));
  }

  #[tokio::test]
  async fn long_lesson_summary_is_truncated() {
    let state = test_state();
    let text = "word ".repeat(100);
    run_generation(&state, 11, &text, None).await.expect("run");
    let run = state.store.run_for_lesson(11).await.expect("run record");
    let summary = run.summary.expect("summary");
    assert_eq!(summary.chars().count(), 150);
    assert!(summary.ends_with("..."));
  }
}
