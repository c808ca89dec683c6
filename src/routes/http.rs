//! HTTP endpoint handlers. These are thin wrappers around the pipeline and
//! the store. Each handler is instrumented and logs parameters and basic
//! result info.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{error, info, instrument};

use crate::domain::RunStatus;
use crate::pipeline::run_generation;
use crate::protocol::*;
use crate::state::AppState;
use crate::util::truncate_with_ellipsis;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

/// Trigger a generation run for a lesson. The run continues in a background
/// task; callers poll `/status`. The run record exists before we reply, so an
/// immediate poll never 404s.
#[instrument(level = "info", skip(state, body), fields(%lesson_id, text_len = body.lesson_text.len()))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  Path(lesson_id): Path<i64>,
  Json(body): Json<GenerateIn>,
) -> impl IntoResponse {
  if body.lesson_text.trim().is_empty() {
    return (
      StatusCode::UNPROCESSABLE_ENTITY,
      Json(ErrorOut { message: "lessonText must not be empty".into() }),
    )
      .into_response();
  }

  let summary = truncate_with_ellipsis(body.lesson_text.trim(), 150);
  state.store.begin_run(lesson_id, Some(summary)).await;

  let task_state = state.clone();
  tokio::spawn(async move {
    if let Err(e) =
      run_generation(&task_state, lesson_id, &body.lesson_text, body.total_questions).await
    {
      error!(target: "pipeline", lesson_id, error = %e, "Generation run failed");
    }
  });

  info!(target: "pipeline", lesson_id, "Generation run accepted");
  (
    StatusCode::ACCEPTED,
    Json(GenerateAccepted { lesson_id, status: RunStatus::Pending.as_str().into() }),
  )
    .into_response()
}

#[instrument(level = "info", skip(state), fields(%lesson_id))]
pub async fn http_get_status(
  State(state): State<Arc<AppState>>,
  Path(lesson_id): Path<i64>,
) -> impl IntoResponse {
  match state.store.run_for_lesson(lesson_id).await {
    Some(run) => (StatusCode::OK, Json(to_status_out(&run))).into_response(),
    None => (
      StatusCode::NOT_FOUND,
      Json(ErrorOut { message: format!("no generation run for lesson {lesson_id}") }),
    )
      .into_response(),
  }
}

#[instrument(level = "info", skip(state), fields(%lesson_id))]
pub async fn http_get_questions(
  State(state): State<Arc<AppState>>,
  Path(lesson_id): Path<i64>,
) -> impl IntoResponse {
  let rows = state.store.questions_for_lesson(lesson_id).await;
  info!(target: "pipeline", lesson_id, count = rows.len(), "Questions served");
  Json(rows.iter().map(to_question_out).collect::<Vec<_>>())
}
