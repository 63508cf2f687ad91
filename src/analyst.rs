//! Conversational analysis over an uploaded CSV.
//!
//! An [`AnalystContext`] is one user's state: it stays `Unconfigured` until a
//! credential and a dataset are both present, becomes `Ready` once the chat
//! session has been opened, and falls back to `Unconfigured` with an error
//! note when opening fails.

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::Settings;
use crate::constants::READY_GREETING;
use crate::dataset::{Dataset, DatasetError};
use crate::gemini::GenerationError;
use crate::prompts;
use crate::session::{ChatMessage, ChatRole, ChatSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalystProfile {
    Donations,
    Supporters,
}

/// Where a profile takes its API key from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Typed into a password field, falling back to the configured key.
    Interactive,
    /// Configured key only.
    Configured,
}

impl AnalystProfile {
    pub const ALL: [AnalystProfile; 2] = [AnalystProfile::Donations, AnalystProfile::Supporters];

    pub fn slug(self) -> &'static str {
        match self {
            AnalystProfile::Donations => "donations",
            AnalystProfile::Supporters => "supporters",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AnalystProfile::Donations => "Donation Data Analyst Chatbot",
            AnalystProfile::Supporters => "Supporter Data Analyst Chatbot",
        }
    }

    pub fn caption(self) -> &'static str {
        match self {
            AnalystProfile::Donations => "Upload your donation data and ask me anything about it.",
            AnalystProfile::Supporters => {
                "Upload your supporter data and allow me to analyze it for you."
            }
        }
    }

    pub fn upload_label(self) -> &'static str {
        match self {
            AnalystProfile::Donations => "Upload your transaction CSV file",
            AnalystProfile::Supporters => "Upload your supporter's CSV file",
        }
    }

    /// Shown while the context is unconfigured.
    pub fn idle_hint(self) -> &'static str {
        match self {
            AnalystProfile::Donations => {
                "Please enter your Google API Key and upload a CSV file to start chatting."
            }
            AnalystProfile::Supporters => {
                "Please upload a CSV file of your supporter's historical data and start chatting."
            }
        }
    }

    pub fn credential_source(self) -> CredentialSource {
        match self {
            AnalystProfile::Donations => CredentialSource::Interactive,
            AnalystProfile::Supporters => CredentialSource::Configured,
        }
    }

    /// Picks the key this profile should use, if any. Blank keys count as
    /// missing.
    pub fn resolve_credential(
        self,
        entered: Option<&str>,
        configured: Option<&str>,
    ) -> Option<String> {
        let non_blank = |key: Option<&str>| {
            key.map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
        };
        match self.credential_source() {
            CredentialSource::Interactive => non_blank(entered).or_else(|| non_blank(configured)),
            CredentialSource::Configured => non_blank(configured),
        }
    }

    /// Role and task description that opens the setup prompt.
    pub fn brief(self) -> &'static str {
        match self {
            AnalystProfile::Donations => DONATIONS_BRIEF,
            AnalystProfile::Supporters => SUPPORTERS_BRIEF,
        }
    }
}

impl std::fmt::Display for AnalystProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

const DONATIONS_BRIEF: &str = "\
You are an expert data analyst specializing in donation transactions. \
Your task is to analyze the provided dataset and answer questions about it. \
The dataset contains donation transactions, including payment types, amounts, \
whether each gift is single or recurring, and other relevant details. \
Provide detailed and accurate responses based on this dataset and only this dataset.";

const SUPPORTERS_BRIEF: &str = "\
You are a data analyst AI that summarizes supporter engagement based on historical activity. \
You will be given a CSV file containing a supporter's record of interactions with an organization, \
including events attended, actions taken, and donation history.

Your goal is to analyze this data and produce a concise engagement summary. Assess how active and \
committed the supporter is, referencing meaningful patterns or milestones. Be objective and \
data-driven, but human-readable and clear.

The CSV may contain fields such as:
- `Campaign Date`, `Campaign ID`, `Campaign Type`
- `Action Date`, `Action Type` (e.g., petition signed, email opened)
- `Donation Date`, `Donation Amount`, `Campaign Name`, `Donation Type` (e.g., one-time or recurring)

In your summary, consider:
- Recency and frequency of activity
- Diversity of engagement types (events, actions, donations)
- Total and recent donation volume
- Participation in key events or campaigns
- Any signs of deepening or declining engagement over time

Output a paragraph summary that classifies the supporter as **Highly Engaged**, \
**Moderately Engaged**, or **Minimally Engaged**, and explain why.

Do not simply restate the CSV contents. Interpret the patterns and trends in the data \
to give a narrative overview of their engagement.";

/// An uploaded file. Its name is the data identity.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("An error occurred while setting up the chat: {0}")]
    Dataset(#[from] DatasetError),
    #[error("Failed to initialize the model. Please check your API key. Error: {0}")]
    Session(#[from] GenerationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalystState {
    Unconfigured,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// Credential or dataset missing; nothing was sent.
    MissingInput,
    /// Already running on this data identity; nothing was sent.
    AlreadyInitialized,
    Initialized,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered(String),
    Failed(String),
    /// No session yet, or a blank question. Nothing was sent.
    Ignored,
}

#[derive(Debug)]
struct ReadySession {
    session: ChatSession,
    data_identity: String,
    transcript: Vec<ChatMessage>,
    turn_error: Option<String>,
}

#[derive(Debug)]
enum Phase {
    Unconfigured { error: Option<String> },
    Ready(Box<ReadySession>),
}

/// One user's analyst workspace.
#[derive(Debug)]
pub struct AnalystContext {
    id: Uuid,
    profile: AnalystProfile,
    phase: Phase,
}

impl AnalystContext {
    pub fn new(profile: AnalystProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile,
            phase: Phase::Unconfigured { error: None },
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn profile(&self) -> AnalystProfile {
        self.profile
    }

    pub fn state(&self) -> AnalystState {
        match &self.phase {
            Phase::Unconfigured { error: None } => AnalystState::Unconfigured,
            Phase::Unconfigured { error: Some(_) } => AnalystState::Error,
            Phase::Ready(_) => AnalystState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready(_))
    }

    /// Setup failure or last failed turn, whichever applies.
    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Unconfigured { error } => error.as_deref(),
            Phase::Ready(ready) => ready.turn_error.as_deref(),
        }
    }

    /// Visible messages; empty until ready.
    pub fn transcript(&self) -> &[ChatMessage] {
        match &self.phase {
            Phase::Ready(ready) => &ready.transcript,
            Phase::Unconfigured { .. } => &[],
        }
    }

    pub fn data_identity(&self) -> Option<&str> {
        match &self.phase {
            Phase::Ready(ready) => Some(&ready.data_identity),
            Phase::Unconfigured { .. } => None,
        }
    }

    pub fn session(&self) -> Option<&ChatSession> {
        match &self.phase {
            Phase::Ready(ready) => Some(&ready.session),
            Phase::Unconfigured { .. } => None,
        }
    }

    /// Opens a chat session for `upload` when both inputs are present and the
    /// upload differs from the one already loaded.
    #[instrument(skip_all, fields(context = %self.id, profile = %self.profile))]
    pub async fn configure(
        &mut self,
        settings: &Settings,
        entered_key: Option<&str>,
        upload: Option<Upload>,
    ) -> ConfigureOutcome {
        let api_key = self
            .profile
            .resolve_credential(entered_key, settings.api_key.as_deref());

        let (Some(api_key), Some(upload)) = (api_key, upload) else {
            info!("Credential or dataset missing, waiting for input");
            // An earlier setup failure no longer describes what is on screen.
            if !self.is_ready() {
                self.phase = Phase::Unconfigured { error: None };
            }
            return ConfigureOutcome::MissingInput;
        };

        // Same file name as the loaded dataset: keep the conversation going.
        if self.data_identity() == Some(upload.file_name.as_str()) {
            return ConfigureOutcome::AlreadyInitialized;
        }

        info!(file = %upload.file_name, "Preparing chat session");
        match self.open_session(settings, api_key, &upload).await {
            Ok(session) => {
                self.phase = Phase::Ready(Box::new(ReadySession {
                    session,
                    data_identity: upload.file_name,
                    transcript: vec![ChatMessage::new(ChatRole::Assistant, READY_GREETING)],
                    turn_error: None,
                }));
                ConfigureOutcome::Initialized
            }
            Err(e) => {
                error!(error = %e, "Chat setup failed");
                let message = e.to_string();
                self.phase = Phase::Unconfigured {
                    error: Some(message.clone()),
                };
                ConfigureOutcome::Failed(message)
            }
        }
    }

    async fn open_session(
        &self,
        settings: &Settings,
        api_key: String,
        upload: &Upload,
    ) -> Result<ChatSession, SetupError> {
        let dataset = Dataset::from_bytes(&upload.bytes)?;
        let dataset_csv = dataset.to_csv_string()?;
        let prompt = prompts::analyst_setup_prompt(self.profile, &dataset_csv);
        tracing::debug!(rows = dataset.row_count(), columns = dataset.column_count(), "Dataset loaded");

        let session = ChatSession::start(settings.gemini_client(api_key), prompt).await?;
        Ok(session)
    }

    /// Runs one turn of the chat. The question stays in the transcript even
    /// when the model call fails; the error is reported until the next turn.
    #[instrument(skip_all, fields(context = %self.id))]
    pub async fn ask(&mut self, question: &str) -> TurnOutcome {
        let Phase::Ready(ready) = &mut self.phase else {
            return TurnOutcome::Ignored;
        };
        let question = question.trim();
        if question.is_empty() {
            return TurnOutcome::Ignored;
        }

        // A new turn replaces whatever the last one reported.
        ready.turn_error = None;
        ready
            .transcript
            .push(ChatMessage::new(ChatRole::User, question));

        match ready.session.send(question).await {
            Ok(reply) => {
                ready
                    .transcript
                    .push(ChatMessage::new(ChatRole::Assistant, reply.clone()));
                TurnOutcome::Answered(reply)
            }
            Err(e) => {
                // The session already dropped the question from the model history.
                let message = format!("An error occurred while generating the response: {e}");
                ready.turn_error = Some(message.clone());
                TurnOutcome::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_unconfigured() {
        let context = AnalystContext::new(AnalystProfile::Donations);
        assert_eq!(context.state(), AnalystState::Unconfigured);
        assert!(context.transcript().is_empty());
        assert!(context.error().is_none());
        assert!(context.session().is_none());
    }

    #[test]
    fn test_resolve_credential_interactive() {
        let p = AnalystProfile::Donations;
        assert_eq!(p.resolve_credential(Some("typed"), Some("env")).as_deref(), Some("typed"));
        assert_eq!(p.resolve_credential(Some("  "), Some("env")).as_deref(), Some("env"));
        assert_eq!(p.resolve_credential(None, None), None);
    }

    #[test]
    fn test_resolve_credential_configured_ignores_typed_key() {
        let p = AnalystProfile::Supporters;
        assert_eq!(p.resolve_credential(Some("typed"), None), None);
        assert_eq!(p.resolve_credential(Some("typed"), Some("env")).as_deref(), Some("env"));
    }

    #[test]
    fn test_profile_slugs_round_trip_through_serde() {
        for profile in AnalystProfile::ALL {
            let json = serde_json::to_string(&profile).unwrap();
            assert_eq!(json, format!("\"{}\"", profile.slug()));
            let back: AnalystProfile = serde_json::from_str(&json).unwrap();
            assert_eq!(back, profile);
        }
    }

    #[tokio::test]
    async fn test_ask_before_setup_is_ignored() {
        let mut context = AnalystContext::new(AnalystProfile::Supporters);
        assert_eq!(context.ask("How many donors?").await, TurnOutcome::Ignored);
        assert!(context.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_missing_inputs_never_configure() {
        let settings = Settings::default();
        let mut context = AnalystContext::new(AnalystProfile::Donations);
        let upload = Upload {
            file_name: "gifts.csv".into(),
            bytes: b"amount\n1\n".to_vec(),
        };

        assert_eq!(
            context.configure(&settings, None, Some(upload)).await,
            ConfigureOutcome::MissingInput
        );
        assert_eq!(
            context.configure(&settings, Some("key"), None).await,
            ConfigureOutcome::MissingInput
        );
        assert_eq!(context.state(), AnalystState::Unconfigured);
    }

    #[tokio::test]
    async fn test_bad_dataset_reports_setup_error() {
        let settings = Settings::default();
        let mut context = AnalystContext::new(AnalystProfile::Donations);
        let upload = Upload {
            file_name: "empty.csv".into(),
            bytes: Vec::new(),
        };

        let outcome = context.configure(&settings, Some("key"), Some(upload)).await;
        assert_eq!(
            outcome,
            ConfigureOutcome::Failed(
                "An error occurred while setting up the chat: No columns to parse from file".into()
            )
        );
        assert_eq!(context.state(), AnalystState::Error);
    }
}
