use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::units::TemperatureUnit;

/// Raw tag record as returned by the tracking API.
///
/// Every field is optional on the wire; malformed values are dropped instead
/// of failing the whole tag list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(default, deserialize_with = "lenient_string")]
    pub node_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub node_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mac_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub registration_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    /// Degrees Fahrenheit.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub battery_voltage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub battery_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_event_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_supertag_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub alert_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Empty when the record carried no usable id.
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPoint {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

/// Device configuration of a SuperTag. Fields the dashboard does not know
/// about are kept in `extra` and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperTagConfig {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub heartbeat_interval_secs: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub location_update_rate_secs: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub firmware_version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagType {
    #[serde(rename = "SuperTag")]
    SuperTag,
    #[serde(rename = "Door Sensor")]
    DoorSensor,
    #[serde(rename = "Temperature Tag")]
    TemperatureTag,
    #[serde(rename = "BLE Tag")]
    BleTag,
}

impl TagType {
    pub fn label(self) -> &'static str {
        match self {
            TagType::SuperTag => "SuperTag",
            TagType::DoorSensor => "Door Sensor",
            TagType::TemperatureTag => "Temperature Tag",
            TagType::BleTag => "BLE Tag",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [
            TagType::SuperTag,
            TagType::DoorSensor,
            TagType::TemperatureTag,
            TagType::BleTag,
        ]
        .into_iter()
        .find(|t| t.label().eq_ignore_ascii_case(label.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryStatus {
    Ok,
    Low,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battery {
    pub status: BatteryStatus,
    /// Percent in [0, 100]; absent when the device only reports a flag.
    pub level: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildTag {
    pub node_address: String,
    pub name: String,
    pub tag_type: TagType,
}

/// View-ready tag, rebuilt from scratch on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub node_address: String,
    pub name: String,
    pub mac_address: Option<String>,
    pub tag_type: TagType,
    pub battery: Battery,
    /// Degrees Fahrenheit.
    pub temperature: Option<f64>,
    pub position: Position,
    pub has_location: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub parent_address: Option<String>,
    pub parent_name: Option<String>,
    pub children: Vec<ChildTag>,
    pub alert_types: Vec<String>,
}

impl Marker {
    pub fn is_leashed(&self) -> bool {
        self.parent_address.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    TemperatureHigh,
    TemperatureLow,
    BatteryLow,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::TemperatureHigh => "temperature-high",
            AlertKind::TemperatureLow => "temperature-low",
            AlertKind::BatteryLow => "battery-low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub node_address: String,
    pub asset_name: String,
    pub tag_type: TagType,
    pub timestamp: DateTime<Utc>,
    /// Measured value in `unit` for temperatures, percent for battery.
    pub value: Option<f64>,
    pub threshold: f64,
    pub unit: Option<TemperatureUnit>,
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite()))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value_to_string(value))
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| value_to_string(Some(item)))
            .collect(),
        Some(other) => value_to_string(Some(other)).into_iter().collect(),
        None => Vec::new(),
    })
}

fn value_to_string(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
