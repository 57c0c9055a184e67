//! Wire-level gateway tests over in-memory dependencies.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use keygate_cache::{Cache, MemoryCache, keys};
use keygate_config::Settings;
use keygate_core::{ClientId, Clock, ManualClock, PermissionSet, SecretString};
use keygate_credential::{ClientCredential, SecretHasher};
use keygate_gateway::{routes, state};
use keygate_store::{MemorySecretStore, SecretStore, paths};
use keygate_token::KeyRing;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

struct Harness {
    router: Router,
    cache: Arc<MemoryCache>,
    clock: ManualClock,
}

async fn harness_with(settings: Settings) -> Harness {
    let clock = ManualClock::starting_now();
    let store = Arc::new(MemorySecretStore::new());
    let cache = Arc::new(MemoryCache::with_clock(1024, Arc::new(clock.clone())));

    seed_credential(&store, "acme", "sekret", &clock).await;

    let app_state = state::build_with_deps(
        &settings,
        Arc::clone(&store) as Arc<dyn SecretStore>,
        Arc::clone(&cache) as Arc<dyn Cache>,
        Arc::new(KeyRing::new(b"0123456789abcdef0123456789abcdef".to_vec())),
        Arc::new(clock.clone()),
        CancellationToken::new(),
    )
    .expect("state builds");

    Harness {
        router: routes::router(app_state),
        cache,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(Settings::default()).await
}

async fn seed_credential(
    store: &MemorySecretStore,
    client: &str,
    secret: &str,
    clock: &ManualClock,
) {
    let client = ClientId::new(client).unwrap();
    let hashed = SecretHasher::new().hash(&SecretString::new(secret)).unwrap();
    let record = ClientCredential::new(
        client.clone(),
        "v1",
        hashed,
        clock.now(),
        ["payments:execute"].into_iter().collect::<PermissionSet>(),
    );
    store
        .put_secret(&paths::cred_default(&client), &record.to_bytes().unwrap())
        .await
        .unwrap();
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Correlation-ID", "it-req-1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn token_endpoint_issues_a_bearer_token() {
    let h = harness().await;
    let response = h
        .router
        .oneshot(json_request(
            "/api/v1/auth/token",
            serde_json::json!({ "client_id": "acme", "client_secret": "sekret" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["token"].as_str().unwrap().contains('.'));

    // The minted token landed in the cache under token:acme:
    let client = ClientId::new("acme").unwrap();
    assert_eq!(
        h.cache
            .scan_prefix(&keys::token_prefix(&client))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn wrong_secret_yields_401_with_stable_error_code() {
    let h = harness().await;
    let response = h
        .router
        .oneshot(json_request(
            "/api/v1/auth/token",
            serde_json::json!({ "client_id": "acme", "client_secret": "wrong" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["errorCode"], "AUTH_ERROR");
    assert_eq!(body["requestId"], "it-req-1");
    assert!(body["timestamp"].is_string());
    // No secret material in the error body.
    assert!(!body.to_string().contains("wrong"));
}

#[tokio::test]
async fn malformed_client_id_yields_400() {
    let h = harness().await;
    let response = h
        .router
        .oneshot(json_request(
            "/api/v1/auth/token",
            serde_json::json!({ "client_id": "../etc", "client_secret": "sekret" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errorCode"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn payments_require_the_legacy_headers() {
    let h = harness().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "amount": 10.0, "currency": "USD", "reference": "R1" })
                .to_string(),
        ))
        .unwrap();

    let response = h.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errorCode"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn payment_is_authenticated_and_forwarded_with_a_bearer_token() {
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/internal/v1/payments"))
        .and(header_exists("authorization"))
        .and(header_exists("x-correlation-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "processed", "reference": "R1"
        })))
        .expect(1)
        .mount(&backend)
        .await;

    let mut settings = Settings::default();
    settings.gateway.backend_url = backend.uri();
    let h = harness_with(settings).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Client-ID", "acme")
        .header("X-Client-Secret", "sekret")
        .header("X-Correlation-ID", "pay-1")
        .body(Body::from(
            serde_json::json!({ "amount": 10.0, "currency": "USD", "reference": "R1" })
                .to_string(),
        ))
        .unwrap();

    let response = h.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "processed");
}

#[tokio::test]
async fn validate_endpoint_reports_liveness() {
    let h = harness().await;
    let issued = h
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/token",
            serde_json::json!({ "client_id": "acme", "client_secret": "sekret" }),
        ))
        .await
        .unwrap();
    let token = body_json(issued).await["token"].as_str().unwrap().to_owned();

    let response = h
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/validate",
            serde_json::json!({ "token": token }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["valid"], true);

    let response = h
        .router
        .oneshot(json_request(
            "/api/v1/auth/validate",
            serde_json::json!({ "token": "garbage" }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["valid"], false);
}

#[tokio::test]
async fn refresh_renews_an_expired_token_inside_the_grace_window() {
    let h = harness().await;
    let issued = h
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/token",
            serde_json::json!({ "client_id": "acme", "client_secret": "sekret" }),
        ))
        .await
        .unwrap();
    let token = body_json(issued).await["token"].as_str().unwrap().to_owned();

    h.clock.advance(chrono::Duration::seconds(3700));
    let response = h
        .router
        .oneshot(json_request(
            "/api/v1/auth/refresh",
            serde_json::json!({ "token": token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_ne!(body["token"].as_str().unwrap(), token);
}

#[tokio::test]
async fn rotation_admin_flow_over_http() {
    let h = harness().await;

    // Initiate: 201 with the one-time secret disclosure.
    let response = h
        .router
        .clone()
        .oneshot(json_request(
            "/admin/v1/rotations",
            serde_json::json!({ "client_id": "acme", "transition_period_minutes": 10 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["state"], "initiated");
    let new_secret = body["new_client_secret"].as_str().unwrap().to_owned();
    assert!(!new_secret.is_empty());

    // A second initiation conflicts.
    let response = h
        .router
        .clone()
        .oneshot(json_request(
            "/admin/v1/rotations",
            serde_json::json!({ "client_id": "acme" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["errorCode"], "ROTATION_CONFLICT");

    // Advance to the dual-validity window, then the new secret signs in.
    let response = h
        .router
        .clone()
        .oneshot(json_request(
            "/admin/v1/rotations/acme/advance",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["current_state"], "dual_active");

    let response = h
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/auth/token",
            serde_json::json!({ "client_id": "acme", "client_secret": new_secret }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Status reads back the live record.
    let request = Request::builder()
        .method("GET")
        .uri("/admin/v1/rotations/acme")
        .body(Body::empty())
        .unwrap();
    let response = h.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["current_state"], "dual_active");
}
