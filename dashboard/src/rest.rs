use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::alerts::AlertThresholds;
use crate::client::ApiClient;
use crate::clusters::{cluster_markers, Cluster};
use crate::errors::Error;
use crate::host::{HostBridge, HostEvent};
use crate::listing::{filter_and_sort, MarkerQuery, SortKey, SortOrder};
use crate::model::{Alert, LocationPoint, Marker, Organization, Site, SuperTagConfig, TagType};
use crate::poller::{reevaluate_alerts, PollerHandle, SharedDashboard};
use crate::session::{SessionManager, SessionStatus};
use crate::storage::{MapStyle, PreferenceStore, ViewMode};
use crate::time_format::{format_local, relative_time};
use crate::units::{format_temperature, TemperatureUnit};

const DEFAULT_HISTORY_HOURS: i64 = 24;
const DEFAULT_CLUSTER_ZOOM: u8 = 10;

#[derive(Clone)]
pub struct AppState {
    pub client: ApiClient,
    pub session: Arc<SessionManager>,
    pub store: Arc<PreferenceStore>,
    pub dashboard: SharedDashboard,
    pub poller: PollerHandle,
    pub host: HostBridge,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/session/login", post(login))
        .route("/api/v1/session/basic", post(basic_login))
        .route("/api/v1/session/logout", post(logout))
        .route("/api/v1/host/events", post(host_event))
        .route("/api/v1/organizations", get(list_organizations))
        .route("/api/v1/organizations/:id/sites", get(list_sites))
        .route("/api/v1/selection", put(put_selection))
        .route("/api/v1/refresh", post(refresh))
        .route("/api/v1/markers", get(list_markers))
        .route("/api/v1/markers/:address", get(get_marker))
        .route("/api/v1/markers/:address/history", get(get_history))
        .route("/api/v1/markers/:address/config", get(get_supertag_config))
        .route("/api/v1/clusters", get(get_clusters))
        .route("/api/v1/alerts", get(list_alerts))
        .route(
            "/api/v1/preferences",
            get(get_preferences).put(put_preferences),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    session: SessionStatus,
    organization_id: Option<String>,
    site_id: Option<String>,
    polling: bool,
    loading: bool,
    error: Option<String>,
    last_refreshed: Option<DateTime<Utc>>,
    last_refreshed_display: Option<String>,
    marker_count: usize,
    alert_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkerView {
    #[serde(flatten)]
    marker: Marker,
    temperature_display: Option<String>,
    last_update_local: Option<String>,
    last_seen: Option<String>,
}

impl MarkerView {
    fn new(marker: &Marker, unit: TemperatureUnit, now: &DateTime<Utc>) -> Self {
        Self {
            temperature_display: marker.temperature.map(|t| format_temperature(t, unit)),
            last_update_local: marker.last_update.as_ref().map(format_local),
            last_seen: marker.last_update.as_ref().map(|ts| relative_time(ts, now)),
            marker: marker.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertView {
    #[serde(flatten)]
    alert: Alert,
    time_local: String,
    age: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreferencesView {
    selected_organization_id: Option<String>,
    selected_site_id: Option<String>,
    map_style: MapStyle,
    temperature_unit: TemperatureUnit,
    alert_thresholds: AlertThresholds,
    view_mode: ViewMode,
    show_alerts_panel: bool,
    list_sort: SortKey,
    list_order: SortOrder,
    list_search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreferencesUpdate {
    map_style: Option<MapStyle>,
    temperature_unit: Option<TemperatureUnit>,
    alert_thresholds: Option<AlertThresholds>,
    view_mode: Option<ViewMode>,
    show_alerts_panel: Option<bool>,
    list_sort: Option<SortKey>,
    list_order: Option<SortOrder>,
    list_search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionRequest {
    organization_id: Option<String>,
    site_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ClusterQuery {
    zoom: Option<u8>,
}

async fn get_status(State(state): State<AppState>) -> Json<StatusView> {
    Json(status_view(&state).await)
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<StatusView>, AppError> {
    state
        .session
        .login_with_password(&body.username, &body.password)
        .await?;
    state.poller.refresh();
    Ok(Json(status_view(&state).await))
}

async fn basic_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<StatusView>, AppError> {
    state
        .session
        .use_basic_credentials(&body.username, &body.password)
        .await?;
    state.poller.refresh();
    Ok(Json(status_view(&state).await))
}

async fn logout(State(state): State<AppState>) -> Result<Json<StatusView>, AppError> {
    state.session.logout().await?;
    Ok(Json(status_view(&state).await))
}

async fn host_event(
    State(state): State<AppState>,
    Json(event): Json<HostEvent>,
) -> Result<Json<StatusView>, AppError> {
    state.host.handle(event).await?;
    Ok(Json(status_view(&state).await))
}

async fn list_organizations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Organization>>, AppError> {
    Ok(Json(state.client.fetch_organizations().await?))
}

async fn list_sites(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<Vec<Site>>, AppError> {
    Ok(Json(state.client.fetch_sites(&organization_id).await?))
}

async fn put_selection(
    State(state): State<AppState>,
    Json(body): Json<SelectionRequest>,
) -> Result<Json<StatusView>, AppError> {
    let site_id = body.site_id.clone();
    state
        .store
        .update(|prefs| {
            prefs.selected_organization_id = body.organization_id;
            prefs.selected_site_id = body.site_id;
        })
        .await?;

    info!("Selected site {:?}", site_id);
    state.poller.select_site(site_id);
    Ok(Json(status_view(&state).await))
}

async fn refresh(State(state): State<AppState>) -> Result<Json<StatusView>, AppError> {
    if state.poller.current().site_id.is_none() {
        return Err(Error::NoSiteSelected.into());
    }
    state.poller.refresh();
    Ok(Json(status_view(&state).await))
}

async fn list_markers(
    State(state): State<AppState>,
    Query(query): Query<MarkerQuery>,
) -> Json<Vec<MarkerView>> {
    let unit = state.store.get().await.temperature_unit;
    let now = Utc::now();
    let snapshot = state.dashboard.read().await;

    Json(
        filter_and_sort(&snapshot.markers, &snapshot.alerts, &query)
            .into_iter()
            .map(|marker| MarkerView::new(marker, unit, &now))
            .collect(),
    )
}

async fn get_marker(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<MarkerView>, AppError> {
    let unit = state.store.get().await.temperature_unit;
    let snapshot = state.dashboard.read().await;

    snapshot
        .markers
        .iter()
        .find(|m| m.node_address == address)
        .map(|marker| Json(MarkerView::new(marker, unit, &Utc::now())))
        .ok_or_else(|| AppError::not_found(format!("no marker {}", address)))
}

async fn get_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LocationPoint>>, AppError> {
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query
        .start
        .unwrap_or(end - Duration::hours(DEFAULT_HISTORY_HOURS));
    if start > end {
        return Err(AppError::bad_request("start must not be after end"));
    }

    Ok(Json(
        state
            .client
            .fetch_location_history(&address, start, end)
            .await?,
    ))
}

async fn get_supertag_config(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<SuperTagConfig>, AppError> {
    let known_type = state
        .dashboard
        .read()
        .await
        .markers
        .iter()
        .find(|m| m.node_address == address)
        .map(|m| m.tag_type);
    if known_type.is_some_and(|t| t != TagType::SuperTag) {
        return Err(AppError::bad_request(format!("{} is not a SuperTag", address)));
    }

    Ok(Json(state.client.fetch_supertag_config(&address).await?))
}

async fn get_clusters(
    State(state): State<AppState>,
    Query(query): Query<ClusterQuery>,
) -> Json<Vec<Cluster>> {
    let snapshot = state.dashboard.read().await;
    Json(cluster_markers(
        &snapshot.markers,
        query.zoom.unwrap_or(DEFAULT_CLUSTER_ZOOM),
    ))
}

async fn list_alerts(State(state): State<AppState>) -> Json<Vec<AlertView>> {
    let now = Utc::now();
    let snapshot = state.dashboard.read().await;
    Json(
        snapshot
            .alerts
            .iter()
            .map(|alert| AlertView {
                time_local: format_local(&alert.timestamp),
                age: relative_time(&alert.timestamp, &now),
                alert: alert.clone(),
            })
            .collect(),
    )
}

async fn get_preferences(State(state): State<AppState>) -> Json<PreferencesView> {
    Json(preferences_view(&state.store).await)
}

async fn put_preferences(
    State(state): State<AppState>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<PreferencesView>, AppError> {
    let affects_alerts = update.temperature_unit.is_some() || update.alert_thresholds.is_some();

    state
        .store
        .update(|prefs| {
            if let Some(style) = update.map_style {
                prefs.map_style = style;
            }
            if let Some(unit) = update.temperature_unit {
                prefs.temperature_unit = unit;
            }
            if let Some(thresholds) = update.alert_thresholds {
                prefs.alert_thresholds = thresholds;
            }
            if let Some(mode) = update.view_mode {
                prefs.view_mode = mode;
            }
            if let Some(show) = update.show_alerts_panel {
                prefs.show_alerts_panel = show;
            }
            if let Some(sort) = update.list_sort {
                prefs.list_sort = sort;
            }
            if let Some(order) = update.list_order {
                prefs.list_order = order;
            }
            if let Some(search) = update.list_search {
                prefs.list_search = Some(search).filter(|s| !s.is_empty());
            }
        })
        .await?;

    if affects_alerts {
        reevaluate_alerts(&state.dashboard, &state.store).await;
    }

    Ok(Json(preferences_view(&state.store).await))
}

async fn status_view(state: &AppState) -> StatusView {
    let now = Utc::now();
    let session = state.session.status(now).await;
    let organization_id = state.store.get().await.selected_organization_id;
    let polling = state.poller.current().active;
    let snapshot = state.dashboard.read().await;

    StatusView {
        session,
        organization_id,
        site_id: snapshot.site_id.clone(),
        polling,
        loading: snapshot.loading,
        error: snapshot.error.clone(),
        last_refreshed: snapshot.last_refreshed,
        last_refreshed_display: snapshot
            .last_refreshed
            .as_ref()
            .map(|ts| relative_time(ts, &now)),
        marker_count: snapshot.markers.len(),
        alert_count: snapshot.alerts.len(),
    }
}

async fn preferences_view(store: &PreferenceStore) -> PreferencesView {
    let prefs = store.get().await;
    PreferencesView {
        selected_organization_id: prefs.selected_organization_id,
        selected_site_id: prefs.selected_site_id,
        map_style: prefs.map_style,
        temperature_unit: prefs.temperature_unit,
        alert_thresholds: prefs.alert_thresholds,
        view_mode: prefs.view_mode,
        show_alerts_panel: prefs.show_alerts_panel,
        list_sort: prefs.list_sort,
        list_order: prefs.list_order,
        list_search: prefs.list_search,
    }
}

pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(message.into()),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: anyhow::anyhow!(message.into()),
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = if err.is_auth_failure() {
            StatusCode::UNAUTHORIZED
        } else {
            match err {
                Error::Request(_) | Error::Status { .. } | Error::Json(_) => StatusCode::BAD_GATEWAY,
                Error::NoSiteSelected => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        Self {
            status,
            error: err.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error ({}): {}", self.status, self.error);
        (
            self.status,
            Json(json!({ "error": self.error.to_string() })),
        )
            .into_response()
    }
}
