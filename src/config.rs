// Runtime settings, assembled from CLI flags and environment variables.

use std::time::Duration;

use clap::Args;

use crate::constants::{DEFAULT_API_BASE, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MODEL};
use crate::fetcher::{FetchError, Fetcher};
use crate::gemini::GeminiClient;

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// Google API key used for the Gemini API.
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini model identifier.
    #[arg(long, global = true, env = "CANVASS_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the Gemini REST API.
    #[arg(long, global = true, env = "CANVASS_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Timeout in seconds for fetching campaign pages.
    #[arg(long, global = true, env = "CANVASS_FETCH_TIMEOUT", default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    pub fetch_timeout: u64,

    /// Send the raw page text to the message composer without summarizing it first.
    #[arg(long, global = true)]
    pub skip_summary: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub fetch_timeout: Duration,
    pub summarize: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            summarize: true,
        }
    }
}

impl From<ApiArgs> for Settings {
    fn from(args: ApiArgs) -> Self {
        Self {
            api_key: args.api_key.filter(|k| !k.trim().is_empty()),
            model: args.model,
            api_base: args.api_base,
            fetch_timeout: Duration::from_secs(args.fetch_timeout),
            summarize: !args.skip_summary,
        }
    }
}

impl Settings {
    pub fn gemini_client(&self, api_key: impl Into<String>) -> GeminiClient {
        GeminiClient::new(api_key)
            .with_model(&self.model)
            .with_api_base(&self.api_base)
    }

    pub fn fetcher(&self) -> Result<Fetcher, FetchError> {
        Fetcher::new(self.fetch_timeout)
    }
}
