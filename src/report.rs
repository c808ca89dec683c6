//! Best-effort run-status reporting to the upstream platform API.
//!
//! Mirrors the local run record to an external consumer so teachers see live
//! progress. Failures are logged and swallowed — reporting never affects the
//! outcome of a run.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::RunStatus;

#[derive(Clone)]
pub struct StatusReporter {
  client: reqwest::Client,
  base_url: String,
  token: Option<String>,
}

#[derive(Serialize)]
struct ReportBody<'a> {
  status: &'a str,
  progress: u8,
  #[serde(rename = "questionCount", skip_serializing_if = "Option::is_none")]
  question_count: Option<usize>,
}

impl StatusReporter {
  /// Construct the reporter if REPORT_API_URL is set; otherwise None and the
  /// pipeline only updates its local run record.
  pub fn from_env() -> Option<Self> {
    let base_url = std::env::var("REPORT_API_URL").ok()?;
    let token = std::env::var("SYSTEM_TOKEN").ok();
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .ok()?;
    Some(Self { client, base_url, token })
  }

  #[instrument(level = "info", skip(self))]
  pub async fn report(
    &self,
    lesson_id: i64,
    status: RunStatus,
    progress: u8,
    question_count: Option<usize>,
  ) {
    let url = format!(
      "{}/lessons/{}/ai-status",
      self.base_url.trim_end_matches('/'),
      lesson_id
    );
    let body = ReportBody { status: status.as_str(), progress, question_count };

    let mut req = self.client.post(&url).json(&body);
    if let Some(token) = &self.token {
      req = req.bearer_auth(token);
    }

    match req.send().await {
      Ok(res) if res.status().is_success() => {
        info!(target: "pipeline", lesson_id, "Run status reported");
      }
      Ok(res) => {
        warn!(target: "pipeline", lesson_id, http_status = %res.status(), "Run status report rejected");
      }
      Err(e) => {
        warn!(target: "pipeline", lesson_id, error = %e, "Run status report failed");
      }
    }
  }
}
