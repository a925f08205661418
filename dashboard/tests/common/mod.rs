//! In-process stand-in for the tracking API and its token endpoints.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};

pub const TOKEN: &str = "test-token";
pub const USERNAME: &str = "ops";
pub const PASSWORD: &str = "s3cret";
pub const BASIC_TOKEN: &str = "b3BzOnMzY3JldA==";

pub const FAST_SITE: &str = "site-fast";
pub const SLOW_SITE: &str = "site-slow";
pub const PAGED_SITE: &str = "site-paged";
pub const PAGED_TAGS: usize = 1200;
pub const SLOW_DELAY: Duration = Duration::from_millis(1500);

#[derive(Clone, Default)]
pub struct MockState {
    pub tag_requests: Arc<AtomicUsize>,
}

pub struct MockApi {
    pub base_url: String,
    pub token_url: String,
    pub sso_url: String,
    pub state: MockState,
}

impl MockApi {
    pub fn tag_requests(&self) -> usize {
        self.state.tag_requests.load(Ordering::SeqCst)
    }
}

pub async fn spawn_mock_api() -> MockApi {
    let state = MockState::default();
    let app = Router::new()
        .route("/oauth/token", post(token))
        .route("/sso/exchange", post(sso_exchange))
        .route("/api/organizations", get(organizations))
        .route("/api/sites", get(sites))
        .route("/api/tags", get(tags))
        .route("/api/location-history", get(location_history))
        .route("/api/supertag-config", get(supertag_config))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockApi {
        base_url: format!("http://{}/api", addr),
        token_url: format!("http://{}/oauth/token", addr),
        sso_url: format!("http://{}/sso/exchange", addr),
        state,
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let value = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    value == format!("Bearer {}", TOKEN) || value == format!("Basic {}", BASIC_TOKEN)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "invalid token").into_response()
}

fn token_body() -> Json<Value> {
    Json(json!({
        "access_token": TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600
    }))
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
    let ok = form.get("grant_type").map(String::as_str) == Some("password")
        && form.get("username").map(String::as_str) == Some(USERNAME)
        && form.get("password").map(String::as_str) == Some(PASSWORD);
    if ok {
        token_body().into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_grant"}))).into_response()
    }
}

async fn sso_exchange(Json(session): Json<Value>) -> Response {
    match session["sessionId"].as_str() {
        Some(id) if !id.is_empty() => token_body().into_response(),
        _ => unauthorized(),
    }
}

async fn organizations(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!([
        {"id": 1, "name": "Acme Logistics"},
        {"id": "org-2", "name": "Globex"},
        {"name": "Half Migrated Org"}
    ]))
    .into_response()
}

async fn sites(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let org = params.get("organizationId").cloned().unwrap_or_default();
    Json(json!([
        {"id": FAST_SITE, "name": "Fast Yard", "organizationId": org},
        {"id": SLOW_SITE, "name": "Slow Yard", "organizationId": org},
        {"id": PAGED_SITE, "name": "Big Yard", "organizationId": org},
        {"id": "", "name": "Unnamed Lot", "organizationId": org}
    ]))
    .into_response()
}

async fn tags(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    state.tag_requests.fetch_add(1, Ordering::SeqCst);

    let site = params.get("siteId").cloned().unwrap_or_default();
    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let page_size: usize = params
        .get("pageSize")
        .and_then(|p| p.parse().ok())
        .unwrap_or(500);

    let all = match site.as_str() {
        FAST_SITE => fast_site_tags(),
        SLOW_SITE => {
            tokio::time::sleep(SLOW_DELAY).await;
            vec![json!({"nodeAddress": "slow-1", "nodeName": "Slow Pallet"})]
        }
        PAGED_SITE => (0..PAGED_TAGS)
            .map(|i| json!({"nodeAddress": format!("tag-{:04}", i)}))
            .collect(),
        _ => Vec::new(),
    };

    let start = (page.saturating_sub(1) * page_size).min(all.len());
    let end = (start + page_size).min(all.len());
    Json(Value::Array(all[start..end].to_vec())).into_response()
}

fn fast_site_tags() -> Vec<Value> {
    let now = Utc::now().to_rfc3339();
    vec![
        json!({
            "nodeAddress": "hub-1",
            "nodeName": "Dock Hub",
            "registrationToken": "D29B3BE8F2CC9A1A7051",
            "latitude": "45.52",
            "longitude": -122.68,
            "batteryVoltage": 2.9,
            "lastEventTime": now
        }),
        json!({
            "nodeAddress": "fridge-1",
            "nodeName": "Reefer 1",
            "registrationToken": "6D3A4E3C91B7A2F5E8C0",
            "temperature": 104.5,
            "batteryStatus": "Low",
            "sourceSupertagId": "hub-1",
            "lastEventTime": now
        }),
        json!({
            "nodeAddress": "door-1",
            "registrationToken": "0B0F0EA3C1B6F6D5E4A2",
            "latitude": 45.53,
            "longitude": -122.67,
            "lastEventTime": "garbage"
        }),
    ]
}

async fn location_history(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if params.get("start").is_none() || params.get("end").is_none() {
        return (StatusCode::BAD_REQUEST, "start and end required").into_response();
    }
    Json(json!([
        {"latitude": 45.50, "longitude": -122.70, "timestamp": params["start"]},
        {"latitude": 45.52, "longitude": -122.68, "timestamp": params["end"]}
    ]))
    .into_response()
}

async fn supertag_config(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    match params.get("nodeAddress").map(String::as_str) {
        Some("hub-1") => Json(json!({
            "heartbeatIntervalSecs": 60,
            "locationUpdateRateSecs": "300",
            "firmwareVersion": "2.4.1",
            "ledMode": "off"
        }))
        .into_response(),
        _ => (StatusCode::NOT_FOUND, "unknown node").into_response(),
    }
}
