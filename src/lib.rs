pub mod advocacy;
pub mod analyst;
pub mod chat;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod fetcher;
pub mod gemini;
pub mod prompts;
pub mod render;
pub mod session;
pub mod web_server;

pub use analyst::{AnalystContext, AnalystProfile, AnalystState, ConfigureOutcome, TurnOutcome, Upload};
pub use config::{ApiArgs, Settings};
pub use dataset::{Dataset, DatasetError};
pub use fetcher::{extract_visible_text, FetchError, Fetcher};
pub use gemini::{Content, GeminiClient, GenerationError, Role};
pub use session::{ChatMessage, ChatRole, ChatSession};
