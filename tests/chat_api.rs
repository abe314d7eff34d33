use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use watsonx_chat_relay::{
    build_app, build_state, config::RelayConfig, inference::profile::ProviderProfile,
    normalize::FALLBACK_REPLY,
};
use wiremock::{
    matchers::{body_partial_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const API_KEY: &str = "test-key";
const PROJECT_ID: &str = "proj-1";
const TOKEN: &str = "tok-123";

fn relay_config(iam: &MockServer, inference: &MockServer, profile: ProviderProfile) -> RelayConfig {
    let mut config = RelayConfig::for_profile(profile);
    config.api_key = Some(API_KEY.to_owned());
    config.project_id = Some(PROJECT_ID.to_owned());
    config.iam_url = format!("{}/identity/token", iam.uri());
    config.inference_url = format!("{}/ml/v1/text/{}", inference.uri(), profile.name());
    config.upstream_timeout = Duration::from_secs(5);
    config
}

fn app_for(config: RelayConfig) -> Router {
    build_app(build_state(config).expect("relay state should build"))
}

async fn mount_token(iam: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("apikey=test-key"))
        .and(body_string_contains(
            "grant_type=urn%3Aibm%3Aparams%3Aoauth%3Agrant-type%3Aapikey",
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": TOKEN, "expires_in": 3600})),
        )
        .expect(expected_calls)
        .mount(iam)
        .await;
}

async fn mount_inference(
    inference: &MockServer,
    profile: ProviderProfile,
    response: ResponseTemplate,
    expected_calls: u64,
) {
    Mock::given(method("POST"))
        .and(path(format!("/ml/v1/text/{}", profile.name())))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_partial_json(json!({"project_id": PROJECT_ID})))
        .respond_with(response)
        .expect(expected_calls)
        .mount(inference)
        .await;
}

fn chat_request(http_method: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(http_method)
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .expect("request build")
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn chat_profile_relays_choice_content() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 1).await;
    mount_inference(
        &inference,
        ProviderProfile::Chat,
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello from granite"}}]
        })),
        1,
    )
    .await;

    let app = app_for(relay_config(&iam, &inference, ProviderProfile::Chat));
    let response = app
        .oneshot(chat_request("POST", r#"{"message":"hi"}"#))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"choices": [{"index": 0, "message": {"content": "Hello from granite", "role": "assistant"}}]})
    );
}

#[tokio::test]
async fn completion_profile_strips_echoed_prompt() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 1).await;
    mount_inference(
        &inference,
        ProviderProfile::Completion,
        ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"generated_text": "Human: what is rust?\n\nAssistant: A systems language."}]
        })),
        1,
    )
    .await;

    let app = app_for(relay_config(&iam, &inference, ProviderProfile::Completion));
    let response = app
        .oneshot(chat_request("POST", r#"{"message":"what is rust?"}"#))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "A systems language.");
}

#[tokio::test]
async fn blank_message_is_rejected_without_configuration() {
    let app = app_for(RelayConfig::for_profile(ProviderProfile::Chat));

    for body in [r#"{"message":""}"#, r#"{"message":"   \n"}"#, r#"{}"#, "not json"] {
        let response = app
            .clone()
            .oneshot(chat_request("POST", body))
            .await
            .expect("request execution");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json_body(response).await["kind"], "validation_error");
    }
}

#[tokio::test]
async fn non_post_method_is_rejected_before_any_downstream_call() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 0).await;
    mount_inference(
        &inference,
        ProviderProfile::Chat,
        ResponseTemplate::new(200),
        0,
    )
    .await;

    let app = app_for(relay_config(&iam, &inference, ProviderProfile::Chat));
    for verb in ["GET", "PUT", "DELETE"] {
        let response = app
            .clone()
            .oneshot(chat_request(verb, r#"{"message":"hi"}"#))
            .await
            .expect("request execution");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "verb: {verb}");
        assert_eq!(
            response
                .headers()
                .get("allow")
                .and_then(|value| value.to_str().ok()),
            Some("POST"),
            "verb: {verb}"
        );
    }
}

#[tokio::test]
async fn missing_credentials_is_a_configuration_error() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 0).await;

    let mut config = relay_config(&iam, &inference, ProviderProfile::Chat);
    config.project_id = None;
    let response = app_for(config)
        .oneshot(chat_request("POST", r#"{"message":"hi"}"#))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "configuration_error");
    assert!(body["details"]
        .as_str()
        .is_some_and(|details| details.contains("IBM_PROJECT_ID")));
}

#[tokio::test]
async fn identity_failure_skips_inference() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&iam)
        .await;
    mount_inference(
        &inference,
        ProviderProfile::Chat,
        ResponseTemplate::new(200),
        0,
    )
    .await;

    let response = app_for(relay_config(&iam, &inference, ProviderProfile::Chat))
        .oneshot(chat_request("POST", r#"{"message":"hi"}"#))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "auth_error");
    assert_eq!(body["status"], 401);
    assert_eq!(body["details"], "invalid api key");
}

#[tokio::test]
async fn upstream_error_status_is_propagated() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 1).await;
    mount_inference(
        &inference,
        ProviderProfile::Chat,
        ResponseTemplate::new(503).set_body_string("model is overloaded"),
        1,
    )
    .await;

    let response = app_for(relay_config(&iam, &inference, ProviderProfile::Chat))
        .oneshot(chat_request("POST", r#"{"message":"hi"}"#))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "upstream_http_error");
    assert_eq!(body["status"], 503);
    assert_eq!(body["details"], "model is overloaded");
}

#[tokio::test]
async fn slow_upstream_is_reported_as_unreachable() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 1).await;
    mount_inference(
        &inference,
        ProviderProfile::Chat,
        ResponseTemplate::new(200)
            .set_body_json(json!({"choices": [{"message": {"content": "too late"}}]}))
            .set_delay(Duration::from_secs(3)),
        1,
    )
    .await;

    let mut config = relay_config(&iam, &inference, ProviderProfile::Chat);
    config.upstream_timeout = Duration::from_millis(300);
    let response = app_for(config)
        .oneshot(chat_request("POST", r#"{"message":"hi"}"#))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "upstream_unreachable_error");
    assert!(body["error"]
        .as_str()
        .is_some_and(|error| error.contains("connectivity")));
}

#[tokio::test]
async fn unrecognized_shapes_degrade_to_fallback_reply() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 2).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&inference)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy page</html>"))
        .expect(1)
        .mount(&inference)
        .await;

    let app = app_for(relay_config(&iam, &inference, ProviderProfile::Chat));
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(chat_request("POST", r#"{"message":"hi"}"#))
            .await
            .expect("request execution");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["choices"][0]["message"]["content"],
            FALLBACK_REPLY
        );
    }
}

#[tokio::test]
async fn repeated_message_yields_identical_envelopes() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 2).await;
    mount_inference(
        &inference,
        ProviderProfile::Chat,
        ResponseTemplate::new(200)
            .set_body_json(json!({"choices": [{"message": {"content": "same answer"}}]})),
        2,
    )
    .await;

    let app = app_for(relay_config(&iam, &inference, ProviderProfile::Chat));
    let mut bodies = Vec::new();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(chat_request("POST", r#"{"message":"repeat me"}"#))
            .await
            .expect("request execution");
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(json_body(response).await);
    }

    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn token_cache_reuses_bearer_token_across_requests() {
    let iam = MockServer::start().await;
    let inference = MockServer::start().await;
    mount_token(&iam, 1).await;
    mount_inference(
        &inference,
        ProviderProfile::Chat,
        ResponseTemplate::new(200)
            .set_body_json(json!({"choices": [{"message": {"content": "cached"}}]})),
        2,
    )
    .await;

    let mut config = relay_config(&iam, &inference, ProviderProfile::Chat);
    config.token_cache = true;
    let app = app_for(config);
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(chat_request("POST", r#"{"message":"hi"}"#))
            .await
            .expect("request execution");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn index_page_and_metrics_are_served() {
    let app = app_for(RelayConfig::for_profile(ProviderProfile::Chat));

    let index = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .body(Body::empty())
                .expect("request build"),
        )
        .await
        .expect("index request");
    assert_eq!(index.status(), StatusCode::OK);
    let page = to_bytes(index.into_body(), 1024 * 1024)
        .await
        .expect("index body");
    assert!(String::from_utf8_lossy(&page).contains("/api/chat"));

    app.clone()
        .oneshot(chat_request("POST", r#"{"message":""}"#))
        .await
        .expect("chat request");

    let metrics = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .expect("request build"),
        )
        .await
        .expect("metrics request");
    assert_eq!(metrics.status(), StatusCode::OK);
    let text = to_bytes(metrics.into_body(), 1024 * 1024)
        .await
        .expect("metrics body");
    let text = String::from_utf8_lossy(&text);
    assert!(text.contains("relay_http_requests_total"));
    assert!(text.contains("status=\"400\""));
}
