use api_adapters::{router, AppState, Metrics, ProxyPolicy};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{TimeZone, Utc};
use domains::clock::ManualClock;
use domains::models::ModerationVerdict;
use domains::ports::{AdminVerifier, Clock, ContentModerator};
use serde_json::{json, Value};
use services::{
    AdminService, BanManager, IdentityManager, PatternModerator, RateLimiter, TipService,
    TipServiceConfig, TipServiceDeps,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "let-me-see";

struct StaticVerifier;

#[async_trait]
impl AdminVerifier for StaticVerifier {
    async fn verify(&self, presented: &str) -> bool {
        presented == ADMIN_TOKEN
    }
}

struct BrokenModerator;

#[async_trait]
impl ContentModerator for BrokenModerator {
    async fn moderate(&self, _text: &str) -> anyhow::Result<ModerationVerdict> {
        anyhow::bail!("classifier offline")
    }
}

/// Behind a proxy, so each test picks its caller through `x-forwarded-for`.
fn app_with(per_hour: u32, moderator: Arc<dyn ContentModerator>) -> Router {
    app_with_proxy(per_hour, moderator, ProxyPolicy::behind_proxy())
}

fn app_with_proxy(
    per_hour: u32,
    moderator: Arc<dyn ContentModerator>,
    proxy: ProxyPolicy,
) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
    ));
    let identity = Arc::new(IdentityManager::new(&[11u8; 32]).unwrap());
    let bans = BanManager::new(None, clock.clone(), Duration::from_secs(1));
    let tips = Arc::new(TipService::new(
        TipServiceDeps {
            identity: identity.clone(),
            rate_limiter: Arc::new(RateLimiter::new(per_hour, clock.clone())),
            bans: bans.clone(),
            moderator,
            store: None,
            clock: clock.clone(),
        },
        TipServiceConfig::default(),
    ));
    let admin = Arc::new(AdminService::new(
        Arc::new(StaticVerifier),
        identity,
        tips.clone(),
        bans.clone(),
    ));

    router(AppState {
        tips,
        admin,
        bans,
        metrics: Arc::new(Metrics::new()),
        clock,
        proxy,
    })
}

fn app() -> Router {
    app_with(10, Arc::new(PatternModerator))
}

fn submission(address: &str, content: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/tips")
        .header("content-type", "application/json")
        .header("x-forwarded-for", address)
        .header("user-agent", "handler-tests/1.0")
        .body(Body::from(json!({ "tip_content": content }).to_string()))
        .unwrap()
}

fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-admin-token", ADMIN_TOKEN)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn accepted_tip_returns_receipt_and_quota() {
    let response = app()
        .oneshot(submission("198.51.100.20", "Lights on in the closed school"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-remaining"), "9");
    assert_eq!(header(&response, "x-content-type-options"), "nosniff");
    assert_eq!(header(&response, "cache-control"), "no-store");

    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["moderated"], false);
    assert!(body["identity_hash"].as_str().unwrap().starts_with("user_"));
    assert!(body.get("encrypted_owner").is_none());
}

#[tokio::test]
async fn quota_exhaustion_sets_retry_headers() {
    let app = app_with(3, Arc::new(PatternModerator));
    for n in 0..3 {
        let response = app
            .clone()
            .oneshot(submission("198.51.100.21", &format!("report number {n}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(submission("198.51.100.21", "one report too many"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "x-ratelimit-remaining"), "0");
    assert_eq!(header(&response, "retry-after"), "3600");
    let reset: i64 = header(&response, "x-ratelimit-reset").parse().unwrap();
    assert_eq!(reset, Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap().timestamp());
    assert_eq!(json_body(response).await["status"], "rate_limited");

    // another actor is unaffected
    let response = app
        .oneshot(submission("198.51.100.99", "a different reporter"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

fn from_peer(peer: [u8; 4], mut request: Request<Body>) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
    request
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_refill_the_quota() {
    let app = app_with_proxy(3, Arc::new(PatternModerator), ProxyPolicy::default());

    let mut statuses = Vec::new();
    for n in 0..6 {
        let request = from_peer(
            [203, 0, 113, 9],
            submission(&format!("10.9.9.{n}"), &format!("forged origin {n}")),
        );
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }
    assert_eq!(
        statuses,
        [
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );

    // a different socket peer still has its own quota
    let request = from_peer([203, 0, 113, 10], submission("10.9.9.0", "honest report"));
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_and_malformed_bodies_are_client_errors() {
    let app = app();

    let response = app
        .clone()
        .oneshot(submission("198.51.100.22", &"x".repeat(1200)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status"], "error");

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/tips")
        .header("content-type", "application/json")
        .body(Body::from("{\"wrong\": 1}"))
        .unwrap();
    let response = app.oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn moderator_outage_is_service_unavailable() {
    let response = app_with(10, Arc::new(BrokenModerator))
        .oneshot(submission("198.51.100.23", "anything at all"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["status"], "unavailable");
}

#[tokio::test]
async fn retrieval_and_listing_expose_only_moderated_text() {
    let app = app();
    let response = app
        .clone()
        .oneshot(submission("198.51.100.24", "Reach the witness at 555-201-3344"))
        .await
        .unwrap();
    let receipt = json_body(response).await;
    assert_eq!(receipt["moderated"], true);
    let tip_id = receipt["tip_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/tips/{tip_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let tip = json_body(response).await;
    assert!(tip["content"].as_str().unwrap().contains("[PHONE_REDACTED]"));
    assert!(!tip.to_string().contains("201-3344"));

    let listing = json_body(app.clone().oneshot(get("/api/tips")).await.unwrap()).await;
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["tips"][0]["id"], tip_id.as_str());

    let missing = app
        .clone()
        .oneshot(get("/api/tips/0190a0b5-7c1e-7000-8000-000000000000"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let garbage = app.oneshot(get("/api/tips/not-a-uuid")).await.unwrap();
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let app = app();
    for (method, uri) in [
        ("GET", "/api/admin/bans"),
        ("POST", "/api/admin/tips/pending"),
        ("GET", "/api/admin/context"),
        ("DELETE", "/api/admin/bans/tk_x"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-admin-token", "wrong")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn admin_can_reveal_and_ban_a_submitter() {
    let app = app();
    let receipt = json_body(
        app.clone()
            .oneshot(submission("198.51.100.25", "Somebody is dumping oil"))
            .await
            .unwrap(),
    )
    .await;
    let tip_id = receipt["tip_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(admin_request(
            "GET",
            &format!("/api/admin/tips/{tip_id}/submitter"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let revealed = json_body(response).await;
    assert_eq!(revealed["network_address"], "198.51.100.25");
    assert_eq!(revealed["client_signature"], "handler-tests/1.0");

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/api/admin/bans",
            Some(json!({ "tip_id": tip_id, "duration_minutes": 60, "reason": "false reports" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let ban = json_body(response).await;
    let identifier = ban["identifier"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(submission("198.51.100.25", "I am back"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["status"], "banned");
    assert_eq!(body["reason"], "false reports");

    let response = app
        .clone()
        .oneshot(admin_request(
            "DELETE",
            &format!("/api/admin/bans/{identifier}"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["removed"], true);

    let response = app
        .oneshot(submission("198.51.100.25", "I am back for real"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ban_request_needs_exactly_one_target() {
    let response = app()
        .oneshot(admin_request(
            "POST",
            "/api/admin/bans",
            Some(json!({ "duration_minutes": 5, "reason": "?" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ban_longer_than_the_calendar_is_a_client_error() {
    let response = app()
        .oneshot(admin_request(
            "POST",
            "/api/admin/bans",
            Some(json!({
                "identifier": "tk_forever",
                "duration_minutes": 1_000_000_000_000i64,
                "reason": "forever",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status"], "error");
}

#[tokio::test]
async fn pending_batches_and_context_are_served_to_admins() {
    let app = app();
    for n in 0..4 {
        app.clone()
            .oneshot(submission("198.51.100.26", &format!("harbour report {n}")))
            .await
            .unwrap();
    }

    let first = json_body(
        app.clone()
            .oneshot(admin_request("POST", "/api/admin/tips/pending", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first["count"], 3);
    let second = json_body(
        app.clone()
            .oneshot(admin_request("POST", "/api/admin/tips/pending", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(second["count"], 1);

    let context = json_body(
        app.oneshot(admin_request("GET", "/api/admin/context", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(context["context"]["interaction_type"], "tip_submission");
}

#[tokio::test]
async fn health_and_metrics_report_state() {
    let app = app();
    app.clone()
        .oneshot(submission("198.51.100.27", "quiet night on the pier"))
        .await
        .unwrap();

    let health = json_body(app.clone().oneshot(get("/health")).await.unwrap()).await;
    // no ban store configured
    assert_eq!(health["ban_store_degraded"], true);
    assert_eq!(health["status"], "degraded");

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"tipline_tip_submissions_total{outcome="success"} 1"#));
}
