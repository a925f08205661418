mod fleet;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use fleet::Fleet;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const TOKEN_TTL_SECS: i64 = 3600;

/// Stand-in for the remote tracking API, serving a randomly generated fleet.
#[derive(Debug, Parser)]
#[command(name = "simulator")]
struct Config {
    #[arg(long, env = "HTTP_ADDR", default_value = "127.0.0.1:8090")]
    http_addr: String,

    #[arg(long, env = "ORGANIZATIONS", default_value_t = 2)]
    organizations: usize,

    #[arg(long, env = "SITES", default_value_t = 3)]
    sites_per_org: usize,

    #[arg(long, env = "HUBS", default_value_t = 20)]
    hubs_per_site: usize,

    /// Seconds between reading updates.
    #[arg(long, env = "UPDATE_INTERVAL_SECS", default_value_t = 30)]
    update_interval_secs: u64,

    #[arg(long, env = "SIM_USERNAME", default_value = "demo")]
    username: String,

    #[arg(long, env = "SIM_PASSWORD", default_value = "demo")]
    password: String,
}

#[derive(Clone)]
struct AppState {
    fleet: Arc<RwLock<Fleet>>,
    /// Issued bearer tokens and when they expire.
    tokens: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    username: String,
    password: String,
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt::init();

    info!("Starting tracking API simulator");
    info!(
        "Organizations: {}, sites/org: {}, hubs/site: {}",
        config.organizations, config.sites_per_org, config.hubs_per_site
    );

    let fleet = {
        let mut rng = rand::thread_rng();
        Fleet::generate(
            &mut rng,
            config.organizations,
            config.sites_per_org,
            config.hubs_per_site,
        )
    };
    info!("Generated {} tags", fleet.tags.len());
    for site in &fleet.sites {
        info!("Site {} ({})", site.id, site.name);
    }

    let state = AppState {
        fleet: Arc::new(RwLock::new(fleet)),
        tokens: Arc::new(RwLock::new(HashMap::new())),
        username: config.username,
        password: config.password,
    };

    let updater_fleet = state.fleet.clone();
    let every = Duration::from_secs(config.update_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let mut fleet = updater_fleet.write().await;
            fleet.advance(&mut rand::thread_rng());
            debug!("Advanced {} tags", fleet.tags.len());
        }
    });

    let app = Router::new()
        .route("/oauth/token", post(token))
        .route("/sso/exchange", post(sso_exchange))
        .route("/api/organizations", get(organizations))
        .route("/api/sites", get(sites))
        .route("/api/tags", get(tags))
        .route("/api/location-history", get(location_history))
        .route("/api/supertag-config", get(supertag_config))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        }
    };
    info!("Simulator listening on {}", config.http_addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                warn!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }
}

async fn issue_token(state: &AppState) -> Response {
    let token = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    {
        let mut tokens = state.tokens.write().await;
        tokens.retain(|_, expires_at| *expires_at > now);
        tokens.insert(token.clone(), now + chrono::Duration::seconds(TOKEN_TTL_SECS));
    }
    Json(json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": TOKEN_TTL_SECS
    }))
    .into_response()
}

async fn token(State(state): State<AppState>, Form(form): Form<HashMap<String, String>>) -> Response {
    let username = form.get("username").map(String::as_str).unwrap_or_default();
    let password = form.get("password").map(String::as_str).unwrap_or_default();
    if username != state.username || password != state.password {
        warn!("Rejected login for {}", username);
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_grant"}))).into_response();
    }
    info!("Issued token for {}", username);
    issue_token(&state).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostSession {
    database: String,
    user_name: String,
    session_id: String,
}

async fn sso_exchange(State(state): State<AppState>, Json(session): Json<HostSession>) -> Response {
    if session.session_id.is_empty() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    info!("SSO exchange for {}@{}", session.user_name, session.database);
    issue_token(&state).await
}

async fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    if let Some(token) = value.strip_prefix("Bearer ") {
        return token_valid(&*state.tokens.read().await, token, Utc::now());
    }
    // basic credentials are accepted as-is
    value.starts_with("Basic ")
}

fn token_valid(tokens: &HashMap<String, DateTime<Utc>>, token: &str, now: DateTime<Utc>) -> bool {
    tokens.get(token).is_some_and(|expires_at| *expires_at > now)
}

macro_rules! require_auth {
    ($state:expr, $headers:expr) => {
        if !authorized(&$state, &$headers).await {
            return (StatusCode::UNAUTHORIZED, "invalid or missing token").into_response();
        }
    };
}

async fn organizations(State(state): State<AppState>, headers: HeaderMap) -> Response {
    require_auth!(state, headers);
    Json(state.fleet.read().await.organizations.clone()).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SitesQuery {
    organization_id: Option<String>,
}

async fn sites(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SitesQuery>,
) -> Response {
    require_auth!(state, headers);
    let fleet = state.fleet.read().await;
    let sites: Vec<_> = fleet
        .sites
        .iter()
        .filter(|s| query.organization_id.as_deref().map_or(true, |id| s.organization_id == id))
        .cloned()
        .collect();
    Json(sites).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagsQuery {
    site_id: String,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    500
}

async fn tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TagsQuery>,
) -> Response {
    require_auth!(state, headers);
    let fleet = state.fleet.read().await;
    let all = fleet.site_tags(&query.site_id);

    let page_size = query.page_size.max(1);
    let start = (query.page.saturating_sub(1) * page_size).min(all.len());
    let end = (start + page_size).min(all.len());
    debug!(
        "Serving tags {}..{} of {} for site {}",
        start,
        end,
        all.len(),
        query.site_id
    );
    Json(&all[start..end]).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    node_address: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

async fn location_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    require_auth!(state, headers);
    let fleet = state.fleet.read().await;
    let Some(tag) = fleet.find_tag(&query.node_address) else {
        return (StatusCode::NOT_FOUND, "unknown node").into_response();
    };
    let points = fleet::location_history(
        &mut rand::thread_rng(),
        tag,
        query.start,
        query.end,
        chrono::Duration::minutes(15),
    );
    Json(points).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigQuery {
    node_address: String,
}

async fn supertag_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConfigQuery>,
) -> Response {
    require_auth!(state, headers);
    let fleet = state.fleet.read().await;
    match fleet.find_tag(&query.node_address) {
        Some(tag) if tag.registration_token == fleet::SUPERTAG_TOKEN => Json(json!({
            "heartbeatIntervalSecs": 60,
            "locationUpdateRateSecs": 300,
            "firmwareVersion": "2.4.1",
            "macAddress": tag.mac_address
        }))
        .into_response(),
        Some(_) => (StatusCode::BAD_REQUEST, "not a SuperTag").into_response(),
        None => (StatusCode::NOT_FOUND, "unknown node").into_response(),
    }
}
