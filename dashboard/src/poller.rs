//! Periodic refresh of the selected site.
//!
//! One fetch runs at a time. A selection change, pause or refresh request
//! drops the in-flight fetch and starts over, and results are applied only
//! if their generation is still current.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::alerts::{default_alert_window, evaluate_alerts};
use crate::client::ApiClient;
use crate::errors::Result;
use crate::markers::build_markers;
use crate::metrics::{
    ACTIVE_ALERTS, MARKERS, POLLS_TOTAL, POLL_FAILURES_TOTAL, POLL_LATENCY_SECONDS,
    STALE_RESPONSES_TOTAL,
};
use crate::model::{Alert, Marker};
use crate::storage::PreferenceStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Everything the presentation layer renders, replaced wholesale per poll.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub site_id: Option<String>,
    pub markers: Vec<Marker>,
    pub alerts: Vec<Alert>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub generation: u64,
}

pub type SharedDashboard = Arc<RwLock<DashboardSnapshot>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollRequest {
    pub site_id: Option<String>,
    pub active: bool,
    pub generation: u64,
}

/// Control side of the poller. Cloned into HTTP handlers and the host bridge.
#[derive(Clone)]
pub struct PollerHandle {
    tx: Arc<watch::Sender<PollRequest>>,
}

impl PollerHandle {
    pub fn new(site_id: Option<String>) -> (Self, watch::Receiver<PollRequest>) {
        let (tx, rx) = watch::channel(PollRequest {
            site_id,
            active: true,
            generation: 0,
        });
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn current(&self) -> PollRequest {
        self.tx.borrow().clone()
    }

    pub fn select_site(&self, site_id: Option<String>) {
        self.tx.send_modify(|request| {
            request.site_id = site_id;
            request.generation += 1;
        });
    }

    pub fn refresh(&self) {
        self.tx.send_modify(|request| request.generation += 1);
    }

    pub fn pause(&self) {
        self.tx.send_modify(|request| {
            request.active = false;
            request.generation += 1;
        });
    }

    pub fn resume(&self) {
        self.tx.send_modify(|request| {
            request.active = true;
            request.generation += 1;
        });
    }
}

pub async fn run_poller(
    mut rx: watch::Receiver<PollRequest>,
    client: ApiClient,
    store: Arc<PreferenceStore>,
    dashboard: SharedDashboard,
    every: Duration,
) {
    info!("Starting poller with interval={:?}", every);

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let request = rx.borrow_and_update().clone();
        begin_cycle(&dashboard, &request).await;

        let site_id = match (&request.site_id, request.active) {
            (Some(site_id), true) => site_id.clone(),
            _ => {
                // idle until the selection or activity changes
                if rx.changed().await.is_err() {
                    break;
                }
                continue;
            }
        };

        POLLS_TOTAL.inc();
        let start = Instant::now();
        let outcome = tokio::select! {
            result = fetch_markers(&client, &site_id) => Some(result),
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("Poll for site {} superseded mid-flight", site_id);
                STALE_RESPONSES_TOTAL.inc();
                None
            }
        };

        let Some(result) = outcome else {
            continue;
        };

        if rx.borrow().generation != request.generation {
            debug!("Discarding stale poll result for site {}", site_id);
            STALE_RESPONSES_TOTAL.inc();
            continue;
        }

        POLL_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        apply_result(&dashboard, &store, request.generation, result).await;

        ticker.reset();
        tokio::select! {
            _ = ticker.tick() => {}
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Poller stopped");
}

async fn fetch_markers(client: &ApiClient, site_id: &str) -> Result<Vec<Marker>> {
    let tags = client.fetch_all_tags(site_id).await?;
    Ok(build_markers(&tags))
}

async fn begin_cycle(dashboard: &SharedDashboard, request: &PollRequest) {
    let mut snapshot = dashboard.write().await;
    if snapshot.site_id != request.site_id {
        // never show one site's markers under another site's selection
        snapshot.markers.clear();
        snapshot.alerts.clear();
        snapshot.error = None;
        snapshot.last_refreshed = None;
        snapshot.site_id = request.site_id.clone();
    }
    snapshot.loading = request.active && request.site_id.is_some();
    snapshot.generation = request.generation;
}

async fn apply_result(
    dashboard: &SharedDashboard,
    store: &PreferenceStore,
    generation: u64,
    result: Result<Vec<Marker>>,
) {
    let mut snapshot = dashboard.write().await;
    if snapshot.generation != generation {
        STALE_RESPONSES_TOTAL.inc();
        return;
    }
    snapshot.loading = false;

    match result {
        Ok(markers) => {
            let prefs = store.get().await;
            let now = Utc::now();
            let alerts = evaluate_alerts(
                &markers,
                &prefs.alert_thresholds,
                prefs.temperature_unit,
                default_alert_window(),
                now,
            );

            info!(
                "Refreshed site {:?}: {} markers, {} alerts",
                snapshot.site_id,
                markers.len(),
                alerts.len()
            );
            MARKERS.set(markers.len() as f64);
            ACTIVE_ALERTS.set(alerts.len() as f64);

            snapshot.markers = markers;
            snapshot.alerts = alerts;
            snapshot.error = None;
            snapshot.last_refreshed = Some(now);
        }
        Err(e) => {
            // previous markers stay on screen
            error!("Poll failed for site {:?}: {}", snapshot.site_id, e);
            POLL_FAILURES_TOTAL.inc();
            snapshot.error = Some(e.to_string());
        }
    }
}

/// Regenerates the alert list from the current markers, for threshold or
/// unit changes between polls.
pub async fn reevaluate_alerts(dashboard: &SharedDashboard, store: &PreferenceStore) {
    let prefs = store.get().await;
    let mut snapshot = dashboard.write().await;
    snapshot.alerts = evaluate_alerts(
        &snapshot.markers,
        &prefs.alert_thresholds,
        prefs.temperature_unit,
        default_alert_window(),
        Utc::now(),
    );
    ACTIVE_ALERTS.set(snapshot.alerts.len() as f64);
    debug!("Re-evaluated {} alerts", snapshot.alerts.len());
}
