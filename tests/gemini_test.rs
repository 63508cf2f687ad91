use canvass::constants::SEEDED_ACKNOWLEDGMENT;
use canvass::{ChatSession, Content, GeminiClient, GenerationError, Role};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";
const MODEL_PATH: &str = "/v1beta/models/gemini-2.0-flash";

fn client(server: &MockServer, key: &str) -> GeminiClient {
    GeminiClient::new(key).with_api_base(format!("{}/v1beta", server.uri()))
}

fn reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    }))
}

async fn mount_model_lookup(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "models/gemini-2.0-flash"})))
        .mount(server)
        .await;
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == GENERATE_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_generate_text_sends_single_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "Hello"}]}]
        })))
        .respond_with(reply("Hi there"))
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server, "test-key").generate_text("Hello").await.unwrap();
    assert_eq!(text, "Hi there");
}

#[tokio::test]
async fn test_api_error_carries_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded.", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let err = client(&server, "k").generate_text("Hello").await.unwrap_err();
    match err {
        GenerationError::Api { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "RESOURCE_EXHAUSTED: Quota exceeded.");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_blocked_response_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let err = client(&server, "k").generate_text("Hello").await.unwrap_err();
    assert!(matches!(err, GenerationError::EmptyResponse));
}

#[tokio::test]
async fn test_verify_credential_rejects_bad_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MODEL_PATH))
        .and(header("x-goog-api-key", "bad-key"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;

    let err = client(&server, "bad-key").verify_credential().await.unwrap_err();
    assert!(err.to_string().contains("API key not valid"));
}

#[tokio::test]
async fn test_session_starts_with_setup_pair() {
    let server = MockServer::start().await;
    mount_model_lookup(&server).await;

    let session = ChatSession::start(client(&server, "k"), "You are an analyst.")
        .await
        .unwrap();

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Content::user("You are an analyst."));
    assert_eq!(history[1].role, Role::Model);
    assert_eq!(history[1].joined_text(), SEEDED_ACKNOWLEDGMENT);
}

#[tokio::test]
async fn test_session_replays_history_each_turn() {
    let server = MockServer::start().await;
    mount_model_lookup(&server).await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(reply("Thirty in total."))
        .mount(&server)
        .await;

    let mut session = ChatSession::start(client(&server, "k"), "setup").await.unwrap();
    assert_eq!(session.send("What is the total?").await.unwrap(), "Thirty in total.");
    session.send("And the average?").await.unwrap();

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["contents"].as_array().unwrap().len(), 3);

    let second = bodies[1]["contents"].as_array().unwrap();
    let roles: Vec<&str> = second.iter().map(|c| c["role"].as_str().unwrap()).collect();
    assert_eq!(roles, ["user", "model", "user", "model", "user"]);
    assert_eq!(second[4]["parts"][0]["text"], "And the average?");
    assert_eq!(session.history().len(), 6);
}

#[tokio::test]
async fn test_failed_turn_is_rolled_back() {
    let server = MockServer::start().await;
    mount_model_lookup(&server).await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(reply("Recovered"))
        .mount(&server)
        .await;

    let mut session = ChatSession::start(client(&server, "k"), "setup").await.unwrap();

    let err = session.send("first try").await.unwrap_err();
    assert!(matches!(err, GenerationError::Api { status: 503, .. }));
    assert_eq!(session.history().len(), 2);

    assert_eq!(session.send("second try").await.unwrap(), "Recovered");
    assert_eq!(session.history().len(), 4);
    assert_eq!(session.history()[2], Content::user("second try"));
}
