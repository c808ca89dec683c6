//! In-process question store: the relational-store contract the pipeline
//! writes through.
//!
//! This module owns:
//!   - persisted questions, keyed by lesson id
//!   - per-lesson generation run records (status/progress/count)
//!
//! `replace_for_lesson` deletes the prior generation and inserts the new set
//! while holding the write lock, which keeps the "at most one live generation
//! per lesson" invariant under re-runs and retries.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::domain::{GenerationRun, PersistedQuestion, RunStatus};

#[derive(Clone, Default)]
pub struct QuestionStore {
    questions: Arc<RwLock<HashMap<i64, Vec<PersistedQuestion>>>>,
    runs: Arc<RwLock<HashMap<i64, GenerationRun>>>,
}

impl QuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lesson's question set atomically (delete-then-insert under
    /// one write lock). Rejects an empty set: the pipeline's fallback
    /// guarantees at least one row, so an empty write is a caller bug.
    #[instrument(level = "debug", skip(self, rows), fields(count = rows.len()))]
    pub async fn replace_for_lesson(
        &self,
        lesson_id: i64,
        rows: Vec<PersistedQuestion>,
    ) -> Result<usize, String> {
        if rows.is_empty() {
            return Err(format!(
                "refusing to persist an empty question set for lesson {lesson_id}"
            ));
        }
        let inserted = rows.len();
        let mut questions = self.questions.write().await;
        let replaced = questions.insert(lesson_id, rows).map(|prior| prior.len()).unwrap_or(0);
        info!(target: "pipeline", lesson_id, inserted, replaced, "Question set persisted");
        Ok(inserted)
    }

    pub async fn questions_for_lesson(&self, lesson_id: i64) -> Vec<PersistedQuestion> {
        self.questions
            .read()
            .await
            .get(&lesson_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Start (or restart) the run record for a lesson: pending, progress 0.
    #[instrument(level = "debug", skip(self))]
    pub async fn begin_run(&self, lesson_id: i64, summary: Option<String>) -> GenerationRun {
        let mut run = GenerationRun::fresh(lesson_id);
        run.summary = summary;
        self.runs.write().await.insert(lesson_id, run.clone());
        run
    }

    /// Move the run forward. Progress is monotonic within a run: a stale or
    /// out-of-order update can change status/count but never lower progress.
    pub async fn update_run(
        &self,
        lesson_id: i64,
        status: RunStatus,
        progress: u8,
        produced_count: Option<usize>,
    ) {
        let mut runs = self.runs.write().await;
        let run = runs
            .entry(lesson_id)
            .or_insert_with(|| GenerationRun::fresh(lesson_id));
        run.status = status;
        run.progress = run.progress.max(progress.min(100));
        if let Some(count) = produced_count {
            run.produced_count = count;
        }
    }

    pub async fn run_for_lesson(&self, lesson_id: i64) -> Option<GenerationRun> {
        self.runs.read().await.get(&lesson_id).cloned()
    }
}
