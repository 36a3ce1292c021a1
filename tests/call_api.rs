//! REST API integration tests
//!
//! Exercises the health, call placement, and status webhook endpoints
//! against a mocked telephony REST API.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::util::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voicebridge::ServerConfig;
use voicebridge::routes;
use voicebridge::state::AppState;

fn test_config(twilio_api_url: String) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        domain: "bridge.test".to_string(),
        cors_allowed_origins: None,
        openai_api_key: "sk-test".to_string(),
        realtime_url: "wss://upstream.test/v1/realtime".to_string(),
        realtime_model: Default::default(),
        voice: Default::default(),
        system_instructions: "You are a helpful test assistant.".to_string(),
        twilio_account_sid: "AC123".to_string(),
        twilio_auth_token: "token".to_string(),
        phone_number_from: "+15550001111".to_string(),
        twilio_api_url,
        flush_max_chunks: 3,
        flush_max_bytes: 1024,
        commit_on_flush: true,
        outbound_queue_capacity: 256,
    }
}

fn test_app(twilio_api_url: String) -> Router {
    let state = AppState::new(test_config(twilio_api_url));
    routes::create_router().with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app("https://api.twilio.com".to_string());

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "OK");
    assert_eq!(json["service"], "voicebridge");
    assert_eq!(json["active_sessions"], 0);
    assert!(json["version"].as_str().is_some());
}

#[tokio::test]
async fn test_make_call_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Calls.json"))
        .and(body_string_contains("To=%2B15551234567"))
        .and(body_string_contains("From=%2B15550001111"))
        .and(body_string_contains("media-stream"))
        .and(body_string_contains("StatusCallbackEvent=answered"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": "CA9999",
            "status": "queued"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let request = Request::builder()
        .method("POST")
        .uri("/make-call")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "phone_number": "+15551234567" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["call_sid"], "CA9999");
}

#[tokio::test]
async fn test_make_call_rejects_invalid_number() {
    let mock_server = MockServer::start().await;

    let app = test_app(mock_server.uri());
    let request = Request::builder()
        .method("POST")
        .uri("/make-call")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "phone_number": "5551234" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap().contains("E.164"));

    // Validation failures never reach the provider.
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_make_call_missing_field_is_rejected() {
    let app = test_app("https://api.twilio.com".to_string());
    let request = Request::builder()
        .method("POST")
        .uri("/make-call")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_make_call_surfaces_provider_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&mock_server)
        .await;

    let app = test_app(mock_server.uri());
    let request = Request::builder()
        .method("POST")
        .uri("/make-call")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "phone_number": "+15551234567" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn test_call_status_webhook() {
    let app = test_app("https://api.twilio.com".to_string());

    let form = "CallSid=CA1&CallStatus=completed&CallDuration=42\
                &From=%2B15550001111&To=%2B15551234567&Direction=outbound-api";
    let request = Request::builder()
        .method("POST")
        .uri("/call-status")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "received");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = test_app("https://api.twilio.com".to_string());
    let request = Request::builder()
        .uri("/nonexistent")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
