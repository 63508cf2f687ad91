use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::constants::{DEFAULT_API_BASE, DEFAULT_MODEL};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request to the generation API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("generation API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("generation API returned no text")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// One turn of a `generateContent` conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text(Role::Model, text)
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// All text parts concatenated.
    pub fn joined_text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Thin client for the Gemini REST API. Requests carry no client-side
/// timeout.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn model_url(&self) -> String {
        format!("{}/models/{}", self.api_base, self.model)
    }

    /// Single-turn generation.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        self.generate(&[Content::user(prompt)]).await
    }

    /// Sends the whole conversation and returns the first candidate's text.
    #[instrument(skip(self, contents), fields(model = %self.model, turns = contents.len()))]
    pub async fn generate(&self, contents: &[Content]) -> Result<String, GenerationError> {
        let url = format!("{}:generateContent", self.model_url());

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest { contents })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed = response.json::<GenerateContentResponse>().await?;
        let text = first_candidate_text(parsed).ok_or(GenerationError::EmptyResponse)?;
        debug!(chars = text.len(), "Received generation response");
        Ok(text)
    }

    /// Looks up the configured model, which fails fast on a bad credential.
    #[instrument(skip(self), fields(model = %self.model))]
    pub async fn verify_credential(&self) -> Result<(), GenerationError> {
        let response = self
            .http
            .get(self.model_url())
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }
}

fn first_candidate_text(response: GenerateContentResponse) -> Option<String> {
    let content = response
        .candidates?
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)?;

    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

async fn api_error(response: reqwest::Response) -> GenerationError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    error!(%status, %body, "Gemini API request failed");
    GenerationError::Api {
        status: status.as_u16(),
        message: error_message(status, &body),
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorWrapper>(body) {
        Ok(wrapper) => {
            let message = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(code) if !code.is_empty() => format!("{code}: {message}"),
                _ => message,
            }
        }
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => body.to_string(),
    }
}
