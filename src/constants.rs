// Defaults and fixed strings shared by the pipelines.

use scraper::Selector;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PORT: u16 = 8501;
/// Analyst workspaces unused for this long are discarded.
pub const DEFAULT_WORKSPACE_IDLE_SECS: u64 = 60 * 60;

/// Every fetch failure renders with this prefix.
pub const FETCH_ERROR_SENTINEL: &str = "Error fetching content:";

pub const DATASET_START: &str = "--- DATASET START ---";
pub const DATASET_END: &str = "--- DATASET END ---";

/// Synthetic model turn that follows the setup prompt in every chat history.
pub const SEEDED_ACKNOWLEDGMENT: &str = "OK, I have the data. What would you like to know?";
/// First entry of the visible transcript once a session is ready.
pub const READY_GREETING: &str = "OK, I have analyzed your data. What would you like to know?";

lazy_static::lazy_static! {
    // Tags whose text counts as campaign content.
    pub static ref CONTENT_SELECTOR: Selector =
        Selector::parse("p, div, ul, li").expect("static selector is valid");
}
