//! Loading pipeline configuration (prompts + tuning knobs) from TOML.
//!
//! See `PipelineConfig`, `Prompts` and `Tuning` for the expected schema.
//! Every field has a default, so the service runs with no config file at all.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub tuning: Tuning,
}

/// Prompts used by the OpenAI client. The generation system prompt pins the
/// exact JSON shape we parse back; user templates carry the focus framing.
/// Override them in TOML if you need to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub generation_system: String,
  // Focus passes over the whole lesson
  pub recall_user_template: String,
  pub application_user_template: String,
  pub conceptual_user_template: String,
  // Per-chunk generation for long lessons
  pub chunk_user_template: String,
  // Key-concept extraction feeding the conceptual pass
  pub concepts_system: String,
  pub concepts_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: r#"You are an expert teacher creating assessment questions with detailed solutions.

Generate a JSON array with this EXACT structure:

[
  {
    "type": "mcq",
    "question_text": "Your question here?",
    "options": ["Option 1", "Option 2", "Option 3", "Option 4"],
    "correct_answer": "Option 1",
    "difficulty": "easy",
    "max_score": 1,
    "workings": "Step 1: ...\nStep 2: ...\nFinal answer: ..."
  },
  {
    "type": "theory",
    "question_text": "Your question here?",
    "answer_text": "Your answer here.",
    "difficulty": "medium",
    "max_score": 3,
    "workings": null
  }
]

RULES:
1. Field names: "question_text" (NOT "question"), "answer_text" (NOT "answer").
2. For MCQ: "correct_answer" must EXACTLY match one of the options; always give 4 options.
3. Always include "type", "difficulty", "max_score".
4. Include "workings" as numbered steps for calculation-based questions; null for conceptual ones.
5. Mix 60% MCQ / 40% theory and difficulties 30% easy, 40% medium, 30% hard.

Output ONLY the JSON array. No markdown, no explanations."#.into(),
      recall_user_template: "Generate {count} assessment questions testing direct recall of facts, definitions and results stated in this lesson:\n\n{lesson_text}\n\nOutput the JSON array with {count} questions:".into(),
      application_user_template: "Generate {count} assessment questions that apply this lesson's methods to NEW scenarios not mentioned in the text (include workings for any calculation):\n\n{lesson_text}\n\nOutput the JSON array with {count} questions:".into(),
      conceptual_user_template: "Generate {count} conceptual assessment questions probing understanding of why these ideas work, focusing on: {concepts}\n\nLesson:\n{lesson_text}\n\nOutput the JSON array with {count} questions:".into(),
      chunk_user_template: "Generate {count} assessment questions from this section of a lesson. Mix recall, application and conceptual items:\n\n{lesson_text}\n\nOutput the JSON array with {count} questions:".into(),
      concepts_system: "You are an expert educational content analyzer. Respond ONLY with strict JSON.".into(),
      concepts_user_template: "Extract the {count} most important concepts and topics covered in this lesson. Return JSON: {\"concepts\": [\"concept1\", \"concept2\"]}.\n\nLesson:\n{lesson_text}".into(),
    }
  }
}

/// Pipeline tuning knobs. Thresholds are tunable parameters, not derived.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Tuning {
  /// Target question count per lesson.
  pub total_questions: usize,
  /// Lessons under this many words are generated in focus passes over the whole text.
  pub single_pass_word_limit: usize,
  /// Chunk size (words) for long lessons.
  pub chunk_size_words: usize,
  /// Cap on questions requested from any single chunk.
  pub per_chunk_quota: usize,
  /// Candidates below this cosine similarity to the lesson are dropped.
  pub relevance_threshold: f32,
  /// Candidates at or above this cosine similarity to a kept one are dropped.
  pub duplicate_threshold: f32,
  pub easy_ratio: f32,
  pub medium_ratio: f32,
  pub hard_ratio: f32,
  /// Question/answer text longer than this is truncated with an ellipsis.
  pub max_text_len: usize,
}

impl Default for Tuning {
  fn default() -> Self {
    Self {
      total_questions: 30,
      single_pass_word_limit: 3000,
      chunk_size_words: 2500,
      per_chunk_quota: 15,
      relevance_threshold: 0.45,
      duplicate_threshold: 0.85,
      easy_ratio: 0.3,
      medium_ratio: 0.4,
      hard_ratio: 0.3,
      max_text_len: 250,
    }
  }
}

/// Attempt to load `PipelineConfig` from PIPELINE_CONFIG_PATH.
/// On any parsing/IO error, returns None and the defaults apply.
pub fn load_pipeline_config_from_env() -> Option<PipelineConfig> {
  let path = std::env::var("PIPELINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PipelineConfig>(&s) {
      Ok(cfg) => {
        info!(target: "questbank_backend", %path, "Loaded pipeline config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "questbank_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "questbank_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
