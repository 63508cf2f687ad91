// Campaign page fetching and visible-text extraction.

use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Node};
use tracing::{debug, instrument, warn};

use crate::constants::{CONTENT_SELECTOR, FETCH_ERROR_SENTINEL};

// Text under these elements never reaches the reader.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Error fetching content: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Error fetching content: {url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// HTTP client for campaign pages. Unlike the generation client it carries a
/// fixed request timeout.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// GETs `url` and returns the visible text of its content tags.
    #[instrument(skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        // Error pages are refused outright rather than scraped; their text would
        // otherwise be summarized as if it were the campaign.
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Campaign page request failed");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let text = extract_visible_text(&body);
        debug!(chars = text.len(), "Extracted campaign text");
        Ok(text)
    }

    /// Same as [`Fetcher::fetch_text`] but folds failures into a string that
    /// starts with [`FETCH_ERROR_SENTINEL`].
    pub async fn fetch_text_or_sentinel(&self, url: &str) -> String {
        match self.fetch_text(url).await {
            Ok(text) => text,
            Err(e) => e.to_string(),
        }
    }
}

/// True when `text` is the folded form of a fetch failure.
pub fn is_fetch_error(text: &str) -> bool {
    text.starts_with(FETCH_ERROR_SENTINEL)
}

/// Collects the text of every `p`, `div`, `ul` and `li` element in document
/// order. Each element's text nodes are trimmed and joined with a space, and
/// elements are joined with newlines. Nested matches repeat their text, the
/// same way a tag-by-tag scrape of the page would.
pub fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let blocks: Vec<String> = document
        .select(&CONTENT_SELECTOR)
        .map(|element| {
            element
                .descendants()
                .filter_map(|node| match node.value() {
                    Node::Text(text) => {
                        let hidden = node
                            .parent()
                            .and_then(|parent| parent.value().as_element())
                            .map(|parent| INVISIBLE_TAGS.contains(&parent.name()))
                            .unwrap_or(false);
                        (!hidden).then(|| text.trim())
                    }
                    _ => None,
                })
                .filter(|piece| !piece.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    blocks.join("\n").trim().to_string()
}
