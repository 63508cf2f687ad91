use std::time::Duration;

use canvass::advocacy::{self, AdvocacyOutcome, AdvocacyRequest};
use canvass::{Fetcher, GeminiClient};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    }))
}

struct Harness {
    pages: MockServer,
    gemini: MockServer,
    fetcher: Fetcher,
    client: GeminiClient,
}

impl Harness {
    async fn new() -> Self {
        let pages = MockServer::start().await;
        let gemini = MockServer::start().await;
        let client = GeminiClient::new("test-key").with_api_base(format!("{}/v1beta", gemini.uri()));
        Self {
            pages,
            gemini,
            fetcher: Fetcher::new(Duration::from_secs(5)).unwrap(),
            client,
        }
    }

    async fn page(&self, status: u16, html: &str) {
        Mock::given(method("GET"))
            .and(path("/campaign"))
            .respond_with(ResponseTemplate::new(status).set_body_string(html))
            .mount(&self.pages)
            .await;
    }

    fn request(&self) -> AdvocacyRequest {
        AdvocacyRequest {
            url: format!("{}/campaign", self.pages.uri()),
            constituent_name: "Jane Smith".into(),
            constituency: "Bristol, UK".into(),
        }
    }
}

#[tokio::test]
async fn test_pipeline_embeds_extracted_text_and_returns_message_verbatim() {
    let h = Harness::new().await;
    h.page(200, "<p>Save the park</p><div>Sign now</div>").await;

    // The campaign text reaches the summarizer exactly as extracted.
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("summarizing advocacy campaigns"))
        .and(body_string_contains(r#"\"\"\"Save the park\nSign now\"\"\""#))
        .respond_with(reply("  Key point: save the park.\n"))
        .expect(1)
        .mount(&h.gemini)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("You are a constituent named Jane Smith from Bristol, UK."))
        .and(body_string_contains(r#"\"\"\"Key point: save the park.\"\"\""#))
        .respond_with(reply("Dear Council,\n\nPlease save the park.\n\nJane  \n"))
        .expect(1)
        .mount(&h.gemini)
        .await;

    let outcome = advocacy::run(&h.fetcher, &h.client, true, &h.request()).await;
    match outcome {
        AdvocacyOutcome::Composed { summary, message } => {
            assert_eq!(summary, "Key point: save the park.");
            assert_eq!(message, "Dear Council,\n\nPlease save the park.\n\nJane  \n");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_skipping_summary_sends_raw_text_to_composer() {
    let h = Harness::new().await;
    h.page(200, "<p>Save the park</p><div>Sign now</div>").await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("constituent named Jane Smith"))
        .and(body_string_contains(r#"\"\"\"Save the park\nSign now\"\"\""#))
        .respond_with(reply("Dear Council"))
        .expect(1)
        .mount(&h.gemini)
        .await;

    let outcome = advocacy::run(&h.fetcher, &h.client, false, &h.request()).await;
    assert_eq!(outcome.summary(), Some("Save the park\nSign now"));
    assert_eq!(outcome.message(), Some("Dear Council"));
}

#[tokio::test]
async fn test_fetch_failure_stops_before_generation() {
    let h = Harness::new().await;
    h.page(500, "<p>Server error</p>").await;
    Mock::given(method("POST"))
        .respond_with(reply("unused"))
        .expect(0)
        .mount(&h.gemini)
        .await;

    let outcome = advocacy::run(&h.fetcher, &h.client, true, &h.request()).await;
    assert!(matches!(outcome, AdvocacyOutcome::FetchFailed(_)));
    assert!(outcome.summary().is_none());
    assert!(outcome
        .error()
        .unwrap()
        .starts_with("Failed to fetch campaign summary"));
}

#[tokio::test]
async fn test_page_without_content_tags_stops_before_generation() {
    let h = Harness::new().await;
    h.page(200, "<html><body><h1>Only a heading</h1></body></html>").await;
    Mock::given(method("POST"))
        .respond_with(reply("unused"))
        .expect(0)
        .mount(&h.gemini)
        .await;

    let outcome = advocacy::run(&h.fetcher, &h.client, true, &h.request()).await;
    assert!(matches!(outcome, AdvocacyOutcome::NoCampaignText));
}

#[tokio::test]
async fn test_summary_mentioning_error_is_still_used() {
    let h = Harness::new().await;
    h.page(200, "<p>Fix the Error in the bus timetable</p>").await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("summarizing advocacy campaigns"))
        .respond_with(reply("Error-riddled timetables strand commuters."))
        .mount(&h.gemini)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("constituent named"))
        .respond_with(reply("Dear Council"))
        .mount(&h.gemini)
        .await;

    let outcome = advocacy::run(&h.fetcher, &h.client, true, &h.request()).await;
    assert_eq!(outcome.message(), Some("Dear Council"));
}

#[tokio::test]
async fn test_compose_failure_keeps_summary() {
    let h = Harness::new().await;
    h.page(200, "<p>Save the park</p>").await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("summarizing advocacy campaigns"))
        .respond_with(reply("Save the park."))
        .mount(&h.gemini)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_string_contains("constituent named"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.gemini)
        .await;

    let outcome = advocacy::run(&h.fetcher, &h.client, true, &h.request()).await;
    assert_eq!(outcome.summary(), Some("Save the park."));
    assert!(outcome.message().is_none());
    assert!(outcome
        .error()
        .unwrap()
        .starts_with("Failed to generate the advocacy message"));
}
