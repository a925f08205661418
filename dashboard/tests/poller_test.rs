mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use dashboard::alerts::TemperatureBand;
use dashboard::client::ApiClient;
use dashboard::model::{AlertKind, BatteryStatus, TagType};
use dashboard::poller::{run_poller, DashboardSnapshot, PollerHandle, SharedDashboard};
use dashboard::session::{AuthScheme, Credential};
use dashboard::storage::PreferenceStore;
use tokio::time::{sleep, Instant};

struct Harness {
    api: MockApi,
    store: Arc<PreferenceStore>,
    dashboard: SharedDashboard,
    poller: PollerHandle,
}

async fn start(site: Option<&str>) -> Harness {
    let api = spawn_mock_api().await;
    let store = Arc::new(PreferenceStore::in_memory());
    store
        .save_credential(&Credential {
            scheme: AuthScheme::Bearer,
            token: TOKEN.to_string(),
            expires_at: None,
        })
        .await
        .unwrap();

    let client = ApiClient::new(api.base_url.clone(), Duration::from_secs(5), store.clone()).unwrap();
    let dashboard = SharedDashboard::default();
    let (poller, rx) = PollerHandle::new(site.map(str::to_string));
    tokio::spawn(run_poller(
        rx,
        client,
        store.clone(),
        dashboard.clone(),
        Duration::from_secs(60),
    ));

    Harness {
        api,
        store,
        dashboard,
        poller,
    }
}

async fn wait_for<F>(dashboard: &SharedDashboard, check: F) -> DashboardSnapshot
where
    F: Fn(&DashboardSnapshot) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        {
            let snapshot = dashboard.read().await;
            if check(&snapshot) {
                return snapshot.clone();
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for dashboard");
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_first_poll_builds_markers() {
    let h = start(Some(FAST_SITE)).await;

    let snapshot = wait_for(&h.dashboard, |s| s.last_refreshed.is_some()).await;
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.markers.len(), 3);

    let hub = &snapshot.markers[0];
    assert_eq!(hub.tag_type, TagType::SuperTag);
    assert_eq!(hub.battery.level, Some(90));
    assert_eq!(hub.children.len(), 1);
    assert_eq!(hub.children[0].tag_type, TagType::TemperatureTag);

    let fridge = &snapshot.markers[1];
    assert_eq!(fridge.parent_name.as_deref(), Some("Dock Hub"));
    assert_eq!(fridge.battery.status, BatteryStatus::Low);
    assert!(!fridge.has_location);

    let door = &snapshot.markers[2];
    assert_eq!(door.name, "Unnamed Asset");
    assert_eq!(door.tag_type, TagType::DoorSensor);
    assert!(door.last_update.is_none());

    // no thresholds configured yet
    assert!(snapshot.alerts.is_empty());
}

#[tokio::test]
async fn test_alerts_follow_thresholds() {
    let h = start(None).await;
    h.store
        .update(|prefs| {
            prefs.alert_thresholds.default.temperature = Some(TemperatureBand {
                min: 35.0,
                max: 100.0,
            });
            prefs.alert_thresholds.default.battery_floor = Some(20.0);
        })
        .await
        .unwrap();

    h.poller.select_site(Some(FAST_SITE.to_string()));
    let snapshot = wait_for(&h.dashboard, |s| s.last_refreshed.is_some()).await;

    let kinds: Vec<AlertKind> = snapshot.alerts.iter().map(|a| a.kind).collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&AlertKind::TemperatureHigh));
    assert!(kinds.contains(&AlertKind::BatteryLow));
    assert!(snapshot.alerts.iter().all(|a| a.node_address == "fridge-1"));
}

#[tokio::test]
async fn test_site_switch_supersedes_slow_fetch() {
    let h = start(Some(SLOW_SITE)).await;

    // let the slow request get under way
    wait_for(&h.dashboard, |s| s.loading).await;
    sleep(Duration::from_millis(100)).await;
    h.poller.select_site(Some(FAST_SITE.to_string()));

    let snapshot = wait_for(&h.dashboard, |s| s.last_refreshed.is_some()).await;
    assert_eq!(snapshot.site_id.as_deref(), Some(FAST_SITE));
    assert_eq!(snapshot.markers.len(), 3);

    // the abandoned slow response never lands
    sleep(SLOW_DELAY + Duration::from_millis(300)).await;
    let snapshot = h.dashboard.read().await;
    assert_eq!(snapshot.site_id.as_deref(), Some(FAST_SITE));
    assert!(snapshot.markers.iter().all(|m| m.node_address != "slow-1"));
}

#[tokio::test]
async fn test_refresh_and_pause() {
    let h = start(Some(FAST_SITE)).await;
    wait_for(&h.dashboard, |s| s.last_refreshed.is_some()).await;
    assert_eq!(h.api.tag_requests(), 1);

    h.poller.refresh();
    let generation = h.poller.current().generation;
    wait_for(&h.dashboard, |s| {
        s.generation == generation && !s.loading && s.last_refreshed.is_some()
    })
    .await;
    assert_eq!(h.api.tag_requests(), 2);

    h.poller.pause();
    sleep(Duration::from_millis(200)).await;
    assert!(!h.dashboard.read().await.loading);
    assert_eq!(h.api.tag_requests(), 2);
}

#[tokio::test]
async fn test_missing_credential_shows_error_banner() {
    let h = start(None).await;
    h.store.clear_credential().await.unwrap();

    h.poller.select_site(Some(FAST_SITE.to_string()));
    let snapshot = wait_for(&h.dashboard, |s| s.error.is_some()).await;
    assert_eq!(snapshot.error.as_deref(), Some("Not authenticated"));
    assert!(snapshot.markers.is_empty());
    assert_eq!(h.api.tag_requests(), 0);
}
