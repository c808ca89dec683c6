//! Application state: question store, pipeline config, OpenAI client,
//! embedding cache, and the optional upstream reporter.
//!
//! This module owns wiring only. The selection of what actually happens in a
//! run lives in `pipeline`.

use tracing::{info, instrument};

use crate::config::{load_pipeline_config_from_env, Prompts, Tuning};
use crate::embedding::EmbeddingCache;
use crate::openai::OpenAI;
use crate::report::StatusReporter;
use crate::store::QuestionStore;

#[derive(Clone)]
pub struct AppState {
    pub store: QuestionStore,
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub tuning: Tuning,
    pub embeddings: EmbeddingCache,
    pub reporter: Option<StatusReporter>,
}

impl AppState {
    /// Build state from env: load config, init OpenAI and the reporter.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_pipeline_config_from_env().unwrap_or_default();
        let prompts = cfg.prompts;
        let tuning = cfg.tuning;
        info!(
            target: "questbank_backend",
            total_questions = tuning.total_questions,
            chunk_size_words = tuning.chunk_size_words,
            relevance_threshold = tuning.relevance_threshold,
            duplicate_threshold = tuning.duplicate_threshold,
            "Pipeline tuning loaded"
        );

        // Build optional OpenAI client (if API key present).
        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "questbank_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, embed_model = %oa.embed_model, "OpenAI enabled.");
        } else {
            info!(target: "questbank_backend", "OpenAI disabled (no OPENAI_API_KEY). Runs will persist fallback questions only.");
        }

        let reporter = StatusReporter::from_env();
        if reporter.is_some() {
            info!(target: "questbank_backend", "Upstream status reporting enabled.");
        } else {
            info!(target: "questbank_backend", "Upstream status reporting disabled (no REPORT_API_URL).");
        }

        Self {
            store: QuestionStore::new(),
            openai,
            prompts,
            tuning,
            embeddings: EmbeddingCache::new(),
            reporter,
        }
    }
}
