//! Minimal OpenAI client for our use-cases.
//!
//! We call chat.completions (plain text or strict JSON object) and embeddings.
//! Calls are instrumented and log model names, latencies, and response sizes
//! (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::extract::OracleReply;
use crate::util::fill_template;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub embed_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let embed_model =
      std::env::var("OPENAI_EMBED_MODEL").unwrap_or_else(|_| "text-embedding-3-small".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model, embed_model })
  }

  /// Plain-text chat completion. Used for question generation (the reply is
  /// untrusted and goes through the extraction chain, not serde).
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_plain(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: Option<u32>,
  ) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: None,
      max_tokens,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "questbank-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    Ok(text)
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "questbank-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| format!("JSON parse error: {}", e))
  }

  /// Embedding for a single text. Vectors come back un-normalized; callers
  /// normalize before caching so cosine reduces to a dot product.
  #[instrument(level = "info", skip(self, text), fields(model = %self.embed_model, text_len = text.len()))]
  pub async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
    let url = format!("{}/embeddings", self.base_url);
    let req = EmbeddingsRequest { model: self.embed_model.clone(), input: text.to_string() };

    let res = self.client.post(&url)
      .header(USER_AGENT, "questbank-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: EmbeddingsResponse = res.json().await.map_err(|e| e.to_string())?;
    body.data.into_iter().next()
      .map(|d| d.embedding)
      .ok_or_else(|| "OpenAI embeddings response contained no data".into())
  }

  // --- High-level helpers (domain-specialized) ---

  /// One generation pass. The reply is raw text on purpose: the oracle is
  /// untrusted, so decoding happens in the extraction chain downstream.
  #[instrument(level = "info", skip(self, pass_name, system, user), fields(%pass_name, model = %self.strong_model, user_len = user.len()))]
  pub async fn generate_questions_raw(
    &self,
    pass_name: &str,
    system: &str,
    user: &str,
  ) -> Result<OracleReply, String> {
    let start = std::time::Instant::now();
    let result = self.chat_plain(&self.strong_model, system, user, 0.7, Some(4096)).await;
    let elapsed = start.elapsed();

    match result {
      Ok(text) => {
        info!(?elapsed, reply_len = text.len(), "Generation pass reply received");
        Ok(OracleReply::Text(text))
      }
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during question generation");
        Err(format!("Model generation failed: {e}"))
      }
    }
  }

  /// Key concepts for the conceptual focus pass. Only the head of the lesson
  /// is sent; concept extraction does not need the whole text.
  #[instrument(level = "info", skip(self, prompts, lesson_text), fields(model = %self.fast_model, text_len = lesson_text.len()))]
  pub async fn extract_key_concepts(
    &self,
    prompts: &Prompts,
    lesson_text: &str,
    max_concepts: usize,
  ) -> Result<Vec<String>, String> {
    #[derive(Deserialize)]
    struct ConceptsOut { concepts: Vec<String> }

    let head: String = lesson_text.chars().take(4000).collect();
    let user = fill_template(
      &prompts.concepts_user_template,
      &[("count", &max_concepts.to_string()), ("lesson_text", &head)],
    );
    let out: ConceptsOut = self
      .chat_json(&self.fast_model, &prompts.concepts_system, &user, 0.3)
      .await?;
    Ok(out.concepts.into_iter().take(max_concepts).collect())
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[derive(Serialize)]
struct EmbeddingsRequest { model: String, input: String }

#[derive(Deserialize)]
struct EmbeddingsResponse { data: Vec<EmbeddingData> }
#[derive(Deserialize)]
struct EmbeddingData { embedding: Vec<f32> }

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
