//! Questbank · Lesson Question Generation Backend
//!
//! - Axum HTTP API driving the generation pipeline
//! - Optional OpenAI integration (via environment variables)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   OPENAI_API_KEY       : enables OpenAI integration if present
//!   OPENAI_BASE_URL      : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL    : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL  : default "gpt-4o"
//!   OPENAI_EMBED_MODEL   : default "text-embedding-3-small"
//!   PIPELINE_CONFIG_PATH : path to TOML config (prompts + tuning)
//!   REPORT_API_URL       : enables upstream run-status reporting if present
//!   SYSTEM_TOKEN         : bearer token for the reporter
//!   QA_DUMP_DIR          : if set, final question sets are dumped as JSON
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod openai;
mod extract;
mod validate;
mod embedding;
mod filter;
mod balance;
mod store;
mod report;
mod pipeline;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (store, OpenAI client, prompts, caches).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "questbank_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
