use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Alert, AlertKind, BatteryStatus, Marker, TagType};
use crate::units::TemperatureUnit;

pub const DEFAULT_ALERT_WINDOW_HOURS: i64 = 168;

pub fn default_alert_window() -> Duration {
    Duration::hours(DEFAULT_ALERT_WINDOW_HOURS)
}

/// Inclusive temperature band, in the user's preferred unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureBand {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeThresholds {
    #[serde(default)]
    pub temperature: Option<TemperatureBand>,
    /// Battery percent at or below which an alert fires.
    #[serde(default)]
    pub battery_floor: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    #[serde(default)]
    pub default: TypeThresholds,
    #[serde(default)]
    pub per_type: HashMap<TagType, TypeThresholds>,
}

impl AlertThresholds {
    pub fn for_type(&self, tag_type: TagType) -> &TypeThresholds {
        self.per_type.get(&tag_type).unwrap_or(&self.default)
    }
}

/// Scans markers for threshold breaches observed within `window` of `now`.
///
/// Markers without a `last_update` or older than the window are skipped.
/// The result is ordered newest first.
pub fn evaluate_alerts(
    markers: &[Marker],
    thresholds: &AlertThresholds,
    unit: TemperatureUnit,
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let cutoff = now - window;
    let mut alerts = Vec::new();

    for marker in markers {
        let Some(timestamp) = marker.last_update else {
            continue;
        };
        if timestamp < cutoff {
            continue;
        }

        let limits = thresholds.for_type(marker.tag_type);

        if let (Some(band), Some(fahrenheit)) = (limits.temperature, marker.temperature) {
            let value = unit.from_fahrenheit(fahrenheit);
            let breach = if value > band.max {
                Some((AlertKind::TemperatureHigh, band.max))
            } else if value < band.min {
                Some((AlertKind::TemperatureLow, band.min))
            } else {
                None
            };
            if let Some((kind, threshold)) = breach {
                alerts.push(alert(marker, kind, timestamp, Some(value), threshold, Some(unit)));
            }
        }

        if let Some(floor) = limits.battery_floor {
            let level = marker.battery.level.map(f64::from);
            let flagged = marker.battery.status == BatteryStatus::Low;
            if flagged || level.is_some_and(|level| level <= floor) {
                alerts.push(alert(marker, AlertKind::BatteryLow, timestamp, level, floor, None));
            }
        }
    }

    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    alerts
}

fn alert(
    marker: &Marker,
    kind: AlertKind,
    timestamp: DateTime<Utc>,
    value: Option<f64>,
    threshold: f64,
    unit: Option<TemperatureUnit>,
) -> Alert {
    Alert {
        id: format!(
            "{}:{}:{}",
            marker.node_address,
            kind.as_str(),
            timestamp.timestamp_millis()
        ),
        kind,
        node_address: marker.node_address.clone(),
        asset_name: marker.name.clone(),
        tag_type: marker.tag_type,
        timestamp,
        value,
        threshold,
        unit,
    }
}
