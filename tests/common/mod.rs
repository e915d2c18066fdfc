//! Stub marketplace backend for integration tests.

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use marketplace_session::identity::{IdentityError, IdentityGrant, IdentityProvider};
use marketplace_session::{
    build_with_store, MemoryTokenStore, SessionRuntime, Settings, UnavailableIdentityProvider,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ACCESS: &str = "access-1";
pub const REFRESH: &str = "refresh-1";

#[derive(Default)]
pub struct StubState {
    pub listing_hits: AtomicUsize,
    pub resends: AtomicUsize,
}

fn user() -> Value {
    json!({ "id": 7, "email": "a@b.com", "nickname": "abc" })
}

fn grant() -> Value {
    json!({ "access": ACCESS, "refresh": REFRESH, "user": user() })
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {ACCESS}"))
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    match (body["email"].as_str(), body["password"].as_str()) {
        (Some("a@b.com"), Some("pw")) => (StatusCode::OK, Json(grant())),
        (Some("ghost@b.com"), _) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "User not found" })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "No active account found with the given credentials" })),
        ),
    }
}

async fn register(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    match body["email"].as_str() {
        Some("verify@b.com") => (
            StatusCode::CREATED,
            Json(json!({
                "verification_required": true,
                "email": "verify@b.com",
                "detail": "Check your inbox for a code."
            })),
        ),
        Some("taken@b.com") => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "email": ["user with this email already exists."] })),
        ),
        _ => (StatusCode::CREATED, Json(grant())),
    }
}

async fn google(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    match body["id_token"].as_str() {
        Some("known") => (StatusCode::OK, Json(grant())),
        Some("unknown") => (
            StatusCode::OK,
            Json(json!({ "needs_signup": true, "email": "new@b.com" })),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "No account. Please sign up first." })),
        ),
    }
}

async fn refresh(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["refresh"] == REFRESH {
        (StatusCode::OK, Json(json!({ "access": ACCESS })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Token is invalid or expired" })),
        )
    }
}

async fn me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if bearer_ok(&headers) {
        (StatusCode::OK, Json(user()))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "expired" })))
    }
}

async fn profile(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if bearer_ok(&headers) {
        (StatusCode::OK, Json(json!({ "nickname": "abc" })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "expired" })))
    }
}

async fn listings(State(state): State<Arc<StubState>>) -> (StatusCode, Json<Value>) {
    state.listing_hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Given token not valid for any token type" })),
    )
}

async fn verify_email(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    match (body["email"].as_str(), body["code"].as_str()) {
        (Some("verify@b.com"), Some("123456")) => (StatusCode::OK, Json(grant())),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": ["Invalid or expired code."] })),
        ),
    }
}

async fn resend_verification(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["email"].as_str().is_some_and(|e| e.contains('@')) {
        state.resends.fetch_add(1, Ordering::SeqCst);
        (StatusCode::OK, Json(json!({ "detail": "Verification email sent." })))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "email": ["Enter a valid email address."] })),
        )
    }
}

async fn add_favorite(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if bearer_ok(&headers) {
        (
            StatusCode::CREATED,
            Json(json!({ "id": 1, "listing": body["listing"] })),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "expired" })))
    }
}

async fn remove_favorite(headers: HeaderMap) -> StatusCode {
    if bearer_ok(&headers) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({}))
}

pub fn create_stub_app(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/register", post(register))
        .route("/api/auth/google", post(google))
        .route("/api/token/refresh", post(refresh))
        .route("/api/users/me", get(me))
        .route("/api/profile", get(profile))
        .route("/api/verify-email", post(verify_email))
        .route("/api/resend-verification", post(resend_verification))
        .route("/api/favorites", post(add_favorite))
        .route("/api/favorites/{id}", delete(remove_favorite))
        .route("/api/listings", get(listings).post(listings))
        .route("/api/listings/{id}", delete(listings))
        .route("/api/slow", get(slow))
        .with_state(state)
}

pub async fn spawn_stub() -> (SocketAddr, Arc<StubState>) {
    let state = Arc::new(StubState::default());
    let app = create_stub_app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

/// Answers every handshake with a fixed identity token.
pub struct FixedIdentity(pub &'static str);

#[async_trait::async_trait]
impl IdentityProvider for FixedIdentity {
    async fn sign_in(&self) -> Result<IdentityGrant, IdentityError> {
        Ok(IdentityGrant {
            id_token: self.0.to_string(),
            email: None,
        })
    }
}

pub fn runtime(
    addr: SocketAddr,
    store: &MemoryTokenStore,
    identity: Option<Arc<dyn IdentityProvider>>,
) -> SessionRuntime {
    let settings = Settings::from_value(json!({
        "apiBaseUrl": format!("http://{addr}"),
        "requestTimeoutSeconds": 1,
    }))
    .unwrap();
    build_with_store(
        settings,
        Arc::new(store.clone()),
        identity.unwrap_or_else(|| Arc::new(UnavailableIdentityProvider)),
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketplace_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
