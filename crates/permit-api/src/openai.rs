//! [`Analyzer`] backed by an OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
  AnalysisConfig,
  analysis::{AnalysisRequest, Analyzer, AnalyzerError, SYSTEM_PROMPT},
};

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct OpenAiAnalyzer {
  client:      Client,
  base_url:    String,
  api_key:     String,
  model:       String,
  max_tokens:  u32,
  temperature: f32,
}

impl OpenAiAnalyzer {
  pub fn new(config: &AnalysisConfig, api_key: impl Into<String>) -> reqwest::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      api_key: api_key.into(),
      model: config.model.clone(),
      max_tokens: config.max_tokens,
      temperature: config.temperature,
    })
  }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model:       &'a str,
  messages:    [ChatMessage<'a>; 2],
  max_tokens:  u32,
  temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role:    &'a str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
  content: Option<String>,
}

impl Analyzer for OpenAiAnalyzer {
  fn model(&self) -> &str { &self.model }

  async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
    let prompt = request.prompt();
    let body = ChatRequest {
      model:       &self.model,
      messages:    [
        ChatMessage { role: "system", content: SYSTEM_PROMPT },
        ChatMessage { role: "user", content: &prompt },
      ],
      max_tokens:  self.max_tokens,
      temperature: self.temperature,
    };

    tracing::debug!(
      application_id = %request.application_id,
      model = %self.model,
      "requesting analysis"
    );

    let resp = self
      .client
      .post(format!("{}/chat/completions", self.base_url))
      .bearer_auth(&self.api_key)
      .json(&body)
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(AnalyzerError::Status { status: status.as_u16(), body });
    }

    let parsed: ChatResponse = resp.json().await?;
    parsed
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .filter(|text| !text.trim().is_empty())
      .ok_or(AnalyzerError::Empty)
  }
}
