use chrono::Local;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::constants::SEEDED_ACKNOWLEDGMENT;
use crate::gemini::{Content, GeminiClient, GenerationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// An entry in the visible transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub timestamp: String,
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            role,
            content: content.into(),
        }
    }
}

/// A conversation with the model. The API is stateless, so the session owns
/// the history and replays it on every turn.
#[derive(Debug)]
pub struct ChatSession {
    client: GeminiClient,
    history: Vec<Content>,
}

impl ChatSession {
    /// Validates the credential, then seeds the history with the setup prompt
    /// and the fixed acknowledgment.
    #[instrument(skip_all, fields(model = client.model()))]
    pub async fn start(
        client: GeminiClient,
        setup_prompt: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        client.verify_credential().await?;
        info!("Chat session started");
        Ok(Self {
            client,
            history: vec![
                Content::user(setup_prompt),
                Content::model(SEEDED_ACKNOWLEDGMENT),
            ],
        })
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Sends one user turn. A failed turn is dropped from the history so the
    /// next attempt starts from the same state.
    pub async fn send(&mut self, text: &str) -> Result<String, GenerationError> {
        self.history.push(Content::user(text));
        match self.client.generate(&self.history).await {
            Ok(reply) => {
                self.history.push(Content::model(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                warn!(error = %e, "Chat turn failed");
                self.history.pop();
                Err(e)
            }
        }
    }
}
