//! Turns the raw tag list of one poll into view-ready markers.

use std::collections::HashMap;

use crate::model::{Battery, BatteryStatus, ChildTag, Marker, Position, Tag, TagType};
use crate::time_format::parse_timestamp;

pub const UNNAMED_ASSET: &str = "Unnamed Asset";

/// Voltage reported by an empty cell.
pub const BATTERY_MIN_VOLTAGE: f64 = 2.0;
/// Voltage reported by a fresh cell.
pub const BATTERY_MAX_VOLTAGE: f64 = 3.0;

/// Map position used for tags that never reported GPS.
pub const DEFAULT_POSITION: Position = Position {
    lat: 39.8283,
    lng: -98.5795,
};

const SUPERTAG_TOKENS: [&str; 2] = ["D29B3BE8F2CC9A1A7051", "D29B3BE8F2CC9A1A7052"];
const DOOR_SENSOR_TOKENS: [&str; 1] = ["0B0F0EA3C1B6F6D5E4A2"];
const TEMPERATURE_TAG_TOKENS: [&str; 2] = ["6D3A4E3C91B7A2F5E8C0", "6D3A4E3C91B7A2F5E8C1"];

pub fn build_markers(tags: &[Tag]) -> Vec<Marker> {
    let names_by_address: HashMap<&str, &str> = tags
        .iter()
        .filter_map(|tag| Some((tag.node_address.as_deref()?, display_name(tag))))
        .collect();

    let mut children_by_parent: HashMap<&str, Vec<ChildTag>> = HashMap::new();
    for tag in tags {
        let (Some(address), Some(parent)) = (
            tag.node_address.as_deref(),
            tag.source_supertag_id.as_deref(),
        ) else {
            continue;
        };
        if address == parent {
            continue;
        }
        children_by_parent.entry(parent).or_default().push(ChildTag {
            node_address: address.to_string(),
            name: display_name(tag).to_string(),
            tag_type: resolve_tag_type(tag.registration_token.as_deref()),
        });
    }

    tags.iter()
        .map(|tag| {
            let node_address = tag.node_address.clone().unwrap_or_default();
            let parent_address = tag
                .source_supertag_id
                .clone()
                .filter(|parent| *parent != node_address);
            let parent_name = parent_address
                .as_deref()
                .and_then(|parent| names_by_address.get(parent))
                .map(|name| name.to_string());
            let children = tag
                .node_address
                .as_deref()
                .and_then(|address| children_by_parent.get(address))
                .cloned()
                .unwrap_or_default();
            let (position, has_location) = match (tag.latitude, tag.longitude) {
                (Some(lat), Some(lng)) => (Position { lat, lng }, true),
                _ => (DEFAULT_POSITION, false),
            };

            Marker {
                name: display_name(tag).to_string(),
                mac_address: tag.mac_address.clone(),
                tag_type: resolve_tag_type(tag.registration_token.as_deref()),
                battery: normalize_battery(tag.battery_status.as_deref(), tag.battery_voltage),
                temperature: tag.temperature,
                position,
                has_location,
                last_update: tag.last_event_time.as_deref().and_then(parse_timestamp),
                parent_address,
                parent_name,
                children,
                alert_types: tag.alert_types.clone(),
                node_address,
            }
        })
        .collect()
}

pub fn resolve_tag_type(registration_token: Option<&str>) -> TagType {
    let Some(token) = registration_token.map(str::trim) else {
        return TagType::BleTag;
    };

    let matches = |tokens: &[&str]| tokens.iter().any(|t| t.eq_ignore_ascii_case(token));
    if matches(&SUPERTAG_TOKENS) {
        TagType::SuperTag
    } else if matches(&DOOR_SENSOR_TOKENS) {
        TagType::DoorSensor
    } else if matches(&TEMPERATURE_TAG_TOKENS) {
        TagType::TemperatureTag
    } else {
        TagType::BleTag
    }
}

pub fn normalize_battery(status: Option<&str>, voltage: Option<f64>) -> Battery {
    if status.is_some_and(|s| s.trim().eq_ignore_ascii_case("low")) {
        return Battery {
            status: BatteryStatus::Low,
            level: None,
        };
    }

    match voltage {
        Some(volts) => Battery {
            status: BatteryStatus::Ok,
            level: Some(battery_percent(volts)),
        },
        None => Battery {
            status: BatteryStatus::Unknown,
            level: None,
        },
    }
}

pub fn battery_percent(volts: f64) -> u8 {
    let span = BATTERY_MAX_VOLTAGE - BATTERY_MIN_VOLTAGE;
    let percent = (volts - BATTERY_MIN_VOLTAGE) / span * 100.0;
    if percent.is_nan() {
        return 0;
    }
    percent.clamp(0.0, 100.0).round() as u8
}

fn display_name(tag: &Tag) -> &str {
    tag.node_name.as_deref().unwrap_or(UNNAMED_ASSET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn tag(address: &str, name: Option<&str>, parent: Option<&str>) -> Tag {
        Tag {
            node_address: Some(address.to_string()),
            node_name: name.map(str::to_string),
            source_supertag_id: parent.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_battery_linear_map() {
        assert_eq!(battery_percent(2.0), 0);
        assert_eq!(battery_percent(2.5), 50);
        assert_eq!(battery_percent(3.0), 100);
        assert_eq!(battery_percent(3.6), 100);
        assert_eq!(battery_percent(1.2), 0);
    }

    #[test]
    fn test_battery_level_always_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let volts = rng.gen_range(-10.0..10.0);
            let battery = normalize_battery(None, Some(volts));
            assert_eq!(battery.status, BatteryStatus::Ok);
            assert!(battery.level.unwrap() <= 100);
        }
    }

    #[test]
    fn test_low_flag_wins_over_voltage() {
        let battery = normalize_battery(Some("LOW"), Some(2.9));
        assert_eq!(
            battery,
            Battery {
                status: BatteryStatus::Low,
                level: None
            }
        );
    }

    #[test]
    fn test_missing_voltage_is_unknown() {
        let battery = normalize_battery(Some("ok"), None);
        assert_eq!(battery.status, BatteryStatus::Unknown);
        assert_eq!(battery.level, None);
    }

    #[test]
    fn test_resolve_tag_type() {
        assert_eq!(resolve_tag_type(Some("D29B3BE8F2CC9A1A7051")), TagType::SuperTag);
        assert_eq!(resolve_tag_type(Some("0b0f0ea3c1b6f6d5e4a2")), TagType::DoorSensor);
        assert_eq!(resolve_tag_type(Some("6D3A4E3C91B7A2F5E8C1")), TagType::TemperatureTag);
        assert_eq!(resolve_tag_type(Some("FFFF")), TagType::BleTag);
        assert_eq!(resolve_tag_type(None), TagType::BleTag);
    }

    #[test]
    fn test_children_resolved_once() {
        let tags = vec![
            tag("hub-1", Some("Hub One"), None),
            tag("a", Some("Pallet A"), Some("hub-1")),
            tag("b", None, Some("hub-1")),
            tag("c", Some("Pallet C"), Some("hub-2")),
        ];

        let markers = build_markers(&tags);
        let hub = &markers[0];
        let addresses: Vec<&str> = hub.children.iter().map(|c| c.node_address.as_str()).collect();
        assert_eq!(addresses, vec!["a", "b"]);
        assert_eq!(hub.children[1].name, UNNAMED_ASSET);

        assert_eq!(markers[1].parent_name.as_deref(), Some("Hub One"));
        assert!(markers[1].is_leashed());

        // leashed to a hub outside this poll
        assert_eq!(markers[3].parent_address.as_deref(), Some("hub-2"));
        assert_eq!(markers[3].parent_name, None);
    }

    #[test]
    fn test_self_reference_ignored() {
        let markers = build_markers(&[tag("x", Some("Loop"), Some("x"))]);
        assert!(markers[0].children.is_empty());
        assert!(!markers[0].is_leashed());
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let markers = build_markers(&[Tag::default()]);
        let marker = &markers[0];
        assert_eq!(marker.name, UNNAMED_ASSET);
        assert_eq!(marker.node_address, "");
        assert_eq!(marker.position, DEFAULT_POSITION);
        assert!(!marker.has_location);
        assert_eq!(marker.temperature, None);
        assert_eq!(marker.last_update, None);
        assert_eq!(marker.tag_type, TagType::BleTag);
    }

    #[test]
    fn test_last_update_parsed() {
        let mut raw = tag("t", Some("Temp"), None);
        raw.last_event_time = Some("2024-05-01T08:00:00Z".to_string());
        raw.latitude = Some(1.5);
        raw.longitude = Some(2.5);

        let marker = &build_markers(&[raw])[0];
        assert_eq!(marker.last_update.unwrap().timestamp(), 1_714_550_400);
        assert_eq!(marker.position, Position { lat: 1.5, lng: 2.5 });
        assert!(marker.has_location);
    }
}
