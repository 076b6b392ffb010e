// reqwest-backed transport against a local mock HTTP server.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use mockito::Matcher;

use ably_auth::error::AblyResult;
use ably_auth::http::{AuthHeaderProvider, HttpConfig, RestTransport, Transport};

struct StaticProvider;

#[async_trait]
impl AuthHeaderProvider for StaticProvider {
    async fn auth_headers(&self) -> AblyResult<Vec<(String, String)>> {
        Ok(vec![(
            "Authorization".to_string(),
            "Basic dGVzdA==".to_string(),
        )])
    }
}

fn transport_for(server: &mockito::ServerGuard) -> RestTransport {
    let config = HttpConfig::builder().base_url(server.url()).build();
    RestTransport::new(config).unwrap()
}

#[tokio::test]
async fn server_time_parses_the_time_array() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/time")
        .with_status(200)
        .with_body("[1234567890123]")
        .create_async()
        .await;

    let transport = transport_for(&server);
    assert_eq!(transport.server_time().await.unwrap(), 1_234_567_890_123);
    mock.assert_async().await;
}

#[tokio::test]
async fn post_returns_status_text_and_parsed_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/keys/app.key/requestToken")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"tok123","expires":2000000}"#)
        .create_async()
        .await;

    let transport = transport_for(&server);
    let response = transport
        .post(
            "/keys/app.key/requestToken",
            &[],
            Some(serde_json::json!({"keyName": "app.key"})),
            true,
        )
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(response.status, 201);
    assert_eq!(response.parsed_body.unwrap()["token"], "tok123");
    mock.assert_async().await;
}

#[tokio::test]
async fn ordinary_requests_carry_the_auth_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/channels")
        .match_header("authorization", "Basic dGVzdA==")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let transport = transport_for(&server);
    let provider: Arc<dyn AuthHeaderProvider> = Arc::new(StaticProvider);
    transport.set_auth_provider(Arc::downgrade(&provider));

    let response = transport.get("/channels", &[], &[], false).await.unwrap();
    assert!(response.is_success());
    mock.assert_async().await;
    drop(provider);
}

#[tokio::test]
async fn skip_auth_suppresses_the_auth_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/keys/app.key/requestToken")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"token":"tok"}"#)
        .create_async()
        .await;

    let transport = transport_for(&server);
    let provider: Arc<dyn AuthHeaderProvider> = Arc::new(StaticProvider);
    transport.set_auth_provider(Arc::downgrade(&provider));

    let response = transport
        .post("/keys/app.key/requestToken", &[], None, true)
        .await
        .unwrap();
    assert!(response.is_success());
    mock.assert_async().await;
    drop(provider);
}

#[tokio::test]
async fn dropped_provider_degrades_to_unauthenticated() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/channels")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let transport = transport_for(&server);
    let weak: Weak<dyn AuthHeaderProvider> = {
        let provider: Arc<dyn AuthHeaderProvider> = Arc::new(StaticProvider);
        Arc::downgrade(&provider)
    };
    transport.set_auth_provider(weak);

    let response = transport.get("/channels", &[], &[], false).await.unwrap();
    assert!(response.is_success());
    mock.assert_async().await;
}

#[tokio::test]
async fn query_params_are_encoded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/issue")
        .match_query(Matcher::UrlEncoded("clientId".into(), "c d".into()))
        .with_status(200)
        .with_body(r#""tok""#)
        .create_async()
        .await;

    let transport = transport_for(&server);
    let params = vec![("clientId".to_string(), "c d".to_string())];
    let response = transport.get("/issue", &[], &params, true).await.unwrap();
    assert!(response.is_success());
    mock.assert_async().await;
}
