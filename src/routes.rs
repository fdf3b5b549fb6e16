//! REST API for the mining hardware dashboard
//!
//! Endpoints:
//! - GET /api/health - Health check (no auth required)
//! - POST /api/login - Exchange credentials for a bearer token
//! - GET /api/miner - Paginated miner list
//! - POST /api/miner - Add a miner
//! - PUT /api/miner - Update a miner
//! - DELETE /api/miner - Remove a miner by id
//! - GET /api/stats - Aggregated statistics

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::bearer_token;
use crate::models::{AppState, Miner};
use crate::stats::{build_stats, StatsResponse};

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/login", post(login))
        .route(
            "/api/miner",
            get(list_miners)
                .post(create_miner)
                .put(update_miner)
                .delete(delete_miner),
        )
        .route("/api/stats", get(get_stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

/// Authentication middleware. A missing or malformed Authorization
/// header is an unauthenticated request, never a server error.
async fn require_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();

    // Login and liveness are reachable without a token
    if path == "/api/login" || path == "/api/health" {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match token {
        Some(token) if state.auth.verify_token(token).await => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
    }
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "miner-dashboard"
    }))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<LoginRequest>,
) -> Response {
    match state
        .auth
        .login(&credentials.username, &credentials.password)
        .await
    {
        Some(token) => Json(serde_json::json!({ "token": token })).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid credentials" })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(rename = "pageStart", default)]
    page_start: usize,
}

/// One page of miners
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageBody {
    items: Vec<Miner>,
    total_pages: usize,
}

async fn list_miners(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Json<PageBody> {
    let (items, total_pages) = state.miners.page(query.page_start).await;
    Json(PageBody { items, total_pages })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMinerRequest {
    name: Option<String>,
    location: Option<String>,
    hash_rate: Option<String>,
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

fn invalid_request_data() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "status": "failed",
            "reason": "Invalid request data"
        })),
    )
        .into_response()
}

async fn create_miner(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMinerRequest>,
) -> Response {
    let (Some(name), Some(location), Some(hash_rate)) = (
        required(request.name),
        required(request.location),
        required(request.hash_rate),
    ) else {
        return invalid_request_data();
    };

    state.miners.insert(name, location, hash_rate).await;
    let (items, total_pages) = state.miners.page(0).await;

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "success",
            "items": items,
            "pageStart": 0,
            "totalPages": total_pages
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMinerRequest {
    id: Option<u64>,
    name: Option<String>,
    location: Option<String>,
    hash_rate: Option<String>,
}

async fn update_miner(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateMinerRequest>,
) -> Response {
    let (Some(id), Some(name), Some(location), Some(hash_rate)) = (
        request.id,
        required(request.name),
        required(request.location),
        required(request.hash_rate),
    ) else {
        return invalid_request_data();
    };

    match state.miners.update(id, name, location, hash_rate).await {
        Some(miner) => Json(serde_json::json!({
            "status": "success",
            "item": miner
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "status": "failed",
                "reason": "Miner not found"
            })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct DeleteQuery {
    id: Option<String>,
}

async fn delete_miner(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    let Some(id) = query.id.as_deref().and_then(|raw| raw.parse::<u64>().ok()) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "status": "failed",
                "reason": "Miner Id must be a number"
            })),
        )
            .into_response();
    };

    if state.miners.remove(id).await {
        let (items, total_pages) = state.miners.page(0).await;
        Json(serde_json::json!({
            "status": "success",
            "items": items,
            "totalPages": total_pages,
            "pageStart": 0
        }))
        .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "status": "failed",
                "reason": "Not Found"
            })),
        )
            .into_response()
    }
}

/// Aggregated statistics. Always 200 once authenticated; partial
/// upstream failure is reported through the `errors` list.
async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(build_stats(&state).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Upstream, UpstreamError};
    use crate::auth::{AuthState, User};
    use crate::cache::StatsCache;
    use crate::config::Config;
    use crate::models::MinerStore;
    use crate::stats::{ERR_DIFFICULTY, ERR_PRICE};
    use async_trait::async_trait;
    use axum::http::Request as HttpRequest;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Upstream double: canned response per URL plus a call log
    struct MockUpstream {
        responses: Mutex<HashMap<String, Result<Value, u16>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockUpstream {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn respond(&self, url: &str, body: Value) {
            self.responses.lock().unwrap().insert(url.to_string(), Ok(body));
        }

        fn fail(&self, url: &str, status: u16) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), Err(status));
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Upstream for MockUpstream {
        async fn get_json(&self, url: &str) -> Result<Value, UpstreamError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.responses.lock().unwrap().get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(UpstreamError::Status(
                    reqwest::StatusCode::from_u16(*status).unwrap(),
                )),
                None => Err(UpstreamError::Status(
                    reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                )),
            }
        }
    }

    const DIFFICULTY_URL: &str = "https://blockchain.info/q/getdifficulty";
    const PRICE_URL: &str =
        "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd";

    fn seed_miners() -> Vec<Miner> {
        vec![Miner {
            id: 101,
            name: "Antminer S19".to_string(),
            location: "Reykjavik".to_string(),
            hash_rate: "115.982742110899".to_string(),
        }]
    }

    fn build_app(miners: Vec<Miner>, upstream: Arc<MockUpstream>) -> Router {
        let users = vec![User {
            username: "taylors".to_string(),
            fullname: "Taylor Swift".to_string(),
            password: "111".to_string(),
        }];

        let baseline = json!({
            "totalHashRate": 1245.4265974589805,
            "activeMiners": 46,
            "miningRevenue": 8930.862364781207
        });

        let state = Arc::new(AppState {
            config: Config::default(),
            baseline: baseline.as_object().unwrap().clone(),
            miners: MinerStore::new(miners, 10),
            cache: StatsCache::new(),
            upstream,
            auth: AuthState::new(users, 86400),
        });

        create_router(state)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login_token(app: &Router) -> String {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/login")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"username": "taylors", "password": "111"}).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["token"].as_str().unwrap().to_string()
    }

    fn get_request(path: &str, token: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, path: &str, token: &str, body: Value) -> Request {
        HttpRequest::builder()
            .method(method)
            .uri(path)
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn happy_path_merges_baseline_average_and_upstreams() {
        let mock = MockUpstream::new();
        mock.respond(DIFFICULTY_URL, json!(6.0e13));
        mock.respond(PRICE_URL, json!({"bitcoin": {"usd": 37402}}));
        let app = build_app(seed_miners(), mock.clone());
        let token = login_token(&app).await;

        let response = app
            .clone()
            .oneshot(get_request("/api/stats", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["stat"]["totalHashRate"], json!(1245.4265974589805));
        assert_eq!(body["stat"]["activeMiners"], json!(46));
        assert_eq!(body["stat"]["miningRevenue"], json!(8930.862364781207));
        assert_eq!(body["stat"]["averageHashRate"], json!(115.982742110899));
        assert_eq!(body["stat"]["btcDifficulty"], json!(6.0e13));
        assert_eq!(body["stat"]["btcPrice"], json!(37402.0));
        assert_eq!(body["errors"], json!([]));
    }

    #[tokio::test]
    async fn both_upstreams_down_yields_nulls_and_both_reasons() {
        let mock = MockUpstream::new();
        mock.fail(DIFFICULTY_URL, 500);
        mock.fail(PRICE_URL, 500);
        let app = build_app(seed_miners(), mock.clone());
        let token = login_token(&app).await;

        let response = app
            .clone()
            .oneshot(get_request("/api/stats", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["stat"]["btcDifficulty"], Value::Null);
        assert_eq!(body["stat"]["btcPrice"], Value::Null);
        assert_eq!(body["errors"], json!([ERR_DIFFICULTY, ERR_PRICE]));
    }

    #[tokio::test]
    async fn wrong_price_shape_is_a_fetch_failure() {
        let mock = MockUpstream::new();
        mock.respond(DIFFICULTY_URL, json!(6.0e13));
        mock.respond(PRICE_URL, json!({"bitcoin": {"usd": "37402"}}));
        let app = build_app(seed_miners(), mock.clone());
        let token = login_token(&app).await;

        let response = app
            .clone()
            .oneshot(get_request("/api/stats", Some(&token)))
            .await
            .unwrap();
        let body = body_json(response).await;

        assert_eq!(body["stat"]["btcDifficulty"], json!(6.0e13));
        assert_eq!(body["stat"]["btcPrice"], Value::Null);
        assert_eq!(body["errors"], json!([ERR_PRICE]));
    }

    #[tokio::test]
    async fn unauthenticated_requests_are_401_with_no_outbound_calls() {
        let mock = MockUpstream::new();
        mock.respond(DIFFICULTY_URL, json!(6.0e13));
        mock.respond(PRICE_URL, json!({"bitcoin": {"usd": 37402}}));
        let app = build_app(seed_miners(), mock.clone());

        // Missing header
        let response = app
            .clone()
            .oneshot(get_request("/api/stats", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Wrong scheme
        let request = HttpRequest::builder()
            .uri("/api/stats")
            .header("authorization", "Basic abc")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Unknown token
        let response = app
            .clone()
            .oneshot(get_request("/api/stats", Some("not-a-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn successful_fetches_are_cached_across_requests() {
        let mock = MockUpstream::new();
        mock.respond(DIFFICULTY_URL, json!(6.0e13));
        mock.respond(PRICE_URL, json!({"bitcoin": {"usd": 37402}}));
        let app = build_app(seed_miners(), mock.clone());
        let token = login_token(&app).await;

        let first = app
            .clone()
            .oneshot(get_request("/api/stats", Some(&token)))
            .await
            .unwrap();
        let first = body_json(first).await;
        assert_eq!(first["stat"]["btcPrice"], json!(37402.0));

        // Break the upstreams; the cached values must still be served.
        mock.fail(DIFFICULTY_URL, 500);
        mock.fail(PRICE_URL, 500);

        let second = app
            .clone()
            .oneshot(get_request("/api/stats", Some(&token)))
            .await
            .unwrap();
        let second = body_json(second).await;
        assert_eq!(second["stat"]["btcDifficulty"], json!(6.0e13));
        assert_eq!(second["stat"]["btcPrice"], json!(37402.0));
        assert_eq!(second["errors"], json!([]));

        assert_eq!(mock.calls_to(DIFFICULTY_URL), 1);
        assert_eq!(mock.calls_to(PRICE_URL), 1);
    }

    #[tokio::test]
    async fn negative_entries_suppress_retries_even_after_recovery() {
        let mock = MockUpstream::new();
        mock.respond(DIFFICULTY_URL, json!(6.0e13));
        mock.fail(PRICE_URL, 500);
        let app = build_app(seed_miners(), mock.clone());
        let token = login_token(&app).await;

        let first = app
            .clone()
            .oneshot(get_request("/api/stats", Some(&token)))
            .await
            .unwrap();
        let first = body_json(first).await;
        assert_eq!(first["stat"]["btcPrice"], Value::Null);
        assert_eq!(first["errors"], json!([ERR_PRICE]));

        // The upstream recovers, but the negative entry pins the miss
        // for the rest of the process lifetime.
        mock.respond(PRICE_URL, json!({"bitcoin": {"usd": 37402}}));

        let second = app
            .clone()
            .oneshot(get_request("/api/stats", Some(&token)))
            .await
            .unwrap();
        let second = body_json(second).await;
        assert_eq!(second["stat"]["btcPrice"], Value::Null);
        assert_eq!(second["errors"], json!([]));
        assert_eq!(mock.calls_to(PRICE_URL), 1);
    }

    #[tokio::test]
    async fn empty_miner_list_nulls_the_average_but_not_the_upstreams() {
        let mock = MockUpstream::new();
        mock.respond(DIFFICULTY_URL, json!(6.0e13));
        mock.respond(PRICE_URL, json!({"bitcoin": {"usd": 37402}}));
        let app = build_app(Vec::new(), mock.clone());
        let token = login_token(&app).await;

        let response = app
            .clone()
            .oneshot(get_request("/api/stats", Some(&token)))
            .await
            .unwrap();
        let body = body_json(response).await;

        assert_eq!(body["stat"]["averageHashRate"], Value::Null);
        assert_eq!(body["stat"]["btcDifficulty"], json!(6.0e13));
        assert_eq!(body["stat"]["btcPrice"], json!(37402.0));
        assert_eq!(body["errors"], json!([]));
    }

    #[tokio::test]
    async fn login_with_bad_credentials_is_rejected() {
        let app = build_app(seed_miners(), MockUpstream::new());
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/login")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"username": "taylors", "password": "wrong"}).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid credentials"})
        );
    }

    #[tokio::test]
    async fn miner_crud_round_trip() {
        let app = build_app(seed_miners(), MockUpstream::new());
        let token = login_token(&app).await;

        // List
        let response = app
            .clone()
            .oneshot(get_request("/api/miner?pageStart=0", Some(&token)))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["totalPages"], json!(1));

        // Create
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/miner",
                &token,
                json!({"name": "Whatsminer M50", "location": "Oslo", "hashRate": "126"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["status"], json!("success"));
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        let new_id = body["items"][1]["id"].as_u64().unwrap();
        assert_eq!(new_id, 102);

        // Update
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/miner",
                &token,
                json!({"id": new_id, "name": "Whatsminer M50S", "location": "Oslo", "hashRate": "132"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["item"]["hashRate"], json!("132"));

        // Delete
        let response = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri(format!("/api/miner?id={new_id}"))
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn crud_validation_failures() {
        let app = build_app(seed_miners(), MockUpstream::new());
        let token = login_token(&app).await;

        // Missing field on create
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/miner",
                &token,
                json!({"name": "Incomplete", "location": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["reason"],
            json!("Invalid request data")
        );

        // Update of an unknown miner
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/miner",
                &token,
                json!({"id": 999, "name": "Ghost", "location": "Nowhere", "hashRate": "1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["reason"], json!("Miner not found"));

        // Non-numeric delete id
        let response = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri("/api/miner?id=abc")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["reason"],
            json!("Miner Id must be a number")
        );

        // Unknown delete id
        let response = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri("/api/miner?id=999")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["reason"], json!("Not Found"));
    }
}
