// Single-shot pipeline: fetch campaign page -> summarize -> compose message.

use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::fetcher::{FetchError, Fetcher};
use crate::gemini::{GeminiClient, GenerationError};
use crate::prompts;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvocacyRequest {
    pub url: String,
    pub constituent_name: String,
    pub constituency: String,
}

#[derive(Debug)]
pub enum AdvocacyOutcome {
    FetchFailed(FetchError),
    SummaryFailed(GenerationError),
    /// The page (or its summary) had no usable text.
    NoCampaignText,
    ComposeFailed {
        summary: String,
        error: GenerationError,
    },
    Composed {
        summary: String,
        message: String,
    },
}

impl AdvocacyOutcome {
    pub fn summary(&self) -> Option<&str> {
        match self {
            AdvocacyOutcome::ComposeFailed { summary, .. }
            | AdvocacyOutcome::Composed { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            AdvocacyOutcome::Composed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// User-facing error line, if the run stopped early.
    pub fn error(&self) -> Option<String> {
        match self {
            AdvocacyOutcome::FetchFailed(e) => Some(format!(
                "Failed to fetch campaign summary. Please check the URL and try again. ({e})"
            )),
            AdvocacyOutcome::SummaryFailed(e) => {
                Some(format!("Failed to summarize the campaign: {e}"))
            }
            AdvocacyOutcome::NoCampaignText => Some(
                "Failed to fetch campaign summary. Please check the URL and try again.".to_string(),
            ),
            AdvocacyOutcome::ComposeFailed { error, .. } => {
                Some(format!("Failed to generate the advocacy message: {error}"))
            }
            AdvocacyOutcome::Composed { .. } => None,
        }
    }
}

/// Condenses raw page text into a summary with key points.
pub async fn summarize_campaign(
    client: &GeminiClient,
    campaign_text: &str,
) -> Result<String, GenerationError> {
    let reply = client
        .generate_text(&prompts::summary_prompt(campaign_text))
        .await?;
    Ok(reply.trim().to_string())
}

/// Writes the constituent's message. The reply is returned untouched.
pub async fn compose_message(
    client: &GeminiClient,
    campaign_text: &str,
    constituent_name: &str,
    constituency: &str,
) -> Result<String, GenerationError> {
    let prompt = prompts::advocacy_prompt(campaign_text, constituent_name, constituency);
    tracing::debug!(%prompt, "Composing advocacy message");
    client.generate_text(&prompt).await
}

#[instrument(skip(fetcher, client, request), fields(url = %request.url))]
pub async fn run(
    fetcher: &Fetcher,
    client: &GeminiClient,
    summarize: bool,
    request: &AdvocacyRequest,
) -> AdvocacyOutcome {
    let page_text = match fetcher.fetch_text(request.url.trim()).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Campaign fetch failed");
            return AdvocacyOutcome::FetchFailed(e);
        }
    };
    if page_text.trim().is_empty() {
        return AdvocacyOutcome::NoCampaignText;
    }

    let summary = if summarize {
        match summarize_campaign(client, &page_text).await {
            Ok(summary) => summary,
            Err(e) => return AdvocacyOutcome::SummaryFailed(e),
        }
    } else {
        page_text
    };
    if summary.trim().is_empty() {
        return AdvocacyOutcome::NoCampaignText;
    }

    match compose_message(
        client,
        &summary,
        request.constituent_name.trim(),
        request.constituency.trim(),
    )
    .await
    {
        Ok(message) => {
            info!(chars = message.len(), "Advocacy message generated");
            AdvocacyOutcome::Composed { summary, message }
        }
        Err(error) => AdvocacyOutcome::ComposeFailed { summary, error },
    }
}
