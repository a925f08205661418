use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{Alert, Marker, TagType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Name,
    LastUpdate,
    Battery,
    Temperature,
    Type,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// List options; deserialized straight from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerQuery {
    pub search: Option<String>,
    /// Comma separated tag type labels.
    pub types: Option<String>,
    pub leashed_only: bool,
    pub alerts_only: bool,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl MarkerQuery {
    /// `None` means no type filter. Labels that name no known type match
    /// nothing.
    fn tag_types(&self) -> Option<HashSet<TagType>> {
        let labels: Vec<&str> = self
            .types
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .collect();
        if labels.is_empty() {
            return None;
        }
        Some(labels.into_iter().filter_map(TagType::from_label).collect())
    }
}

/// Filters and sorts markers without touching the network.
///
/// Sorting is stable and places markers missing the sort value last in both
/// directions.
pub fn filter_and_sort<'a>(markers: &'a [Marker], alerts: &[Alert], query: &MarkerQuery) -> Vec<&'a Marker> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let types = query.tag_types();
    let alerting: HashSet<&str> = alerts.iter().map(|a| a.node_address.as_str()).collect();

    let mut selected: Vec<&Marker> = markers
        .iter()
        .filter(|m| needle.as_deref().map_or(true, |n| matches_search(m, n)))
        .filter(|m| types.as_ref().map_or(true, |t| t.contains(&m.tag_type)))
        .filter(|m| !query.leashed_only || m.is_leashed())
        .filter(|m| !query.alerts_only || alerting.contains(m.node_address.as_str()))
        .collect();

    sort_markers(&mut selected, query.sort, query.order);
    selected
}

pub fn sort_markers(markers: &mut [&Marker], key: SortKey, order: SortOrder) {
    markers.sort_by(|a, b| match key {
        SortKey::Name => order.apply(compare_names(&a.name, &b.name)),
        SortKey::Type => order.apply(a.tag_type.label().cmp(b.tag_type.label())),
        SortKey::LastUpdate => missing_last(a.last_update, b.last_update, order),
        SortKey::Battery => missing_last(a.battery.level, b.battery.level, order),
        SortKey::Temperature => missing_last(a.temperature, b.temperature, order),
    });
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn missing_last<T: PartialOrd>(a: Option<T>, b: Option<T>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => order.apply(a.partial_cmp(&b).unwrap_or(Ordering::Equal)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn matches_search(marker: &Marker, needle: &str) -> bool {
    let hit = |field: Option<&str>| field.is_some_and(|f| f.to_lowercase().contains(needle));
    hit(Some(marker.name.as_str()))
        || hit(Some(marker.node_address.as_str()))
        || hit(marker.mac_address.as_deref())
        || hit(marker.parent_name.as_deref())
}
