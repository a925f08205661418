use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Marker, Position};

/// Grid cell edge at zoom 0, in degrees.
const CELL_DEGREES_AT_ZOOM_0: f64 = 60.0;
pub const MAX_ZOOM: u8 = 22;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub center: Position,
    pub count: usize,
    pub node_addresses: Vec<String>,
}

/// Groups located markers into grid cells that halve in size per zoom level.
/// Markers without GPS are left out.
pub fn cluster_markers(markers: &[Marker], zoom: u8) -> Vec<Cluster> {
    let cell = CELL_DEGREES_AT_ZOOM_0 / f64::from(1u32 << zoom.min(MAX_ZOOM));

    let mut cells: BTreeMap<(i64, i64), Vec<&Marker>> = BTreeMap::new();
    for marker in markers.iter().filter(|m| m.has_location) {
        let key = (
            (marker.position.lat / cell).floor() as i64,
            (marker.position.lng / cell).floor() as i64,
        );
        cells.entry(key).or_default().push(marker);
    }

    let mut clusters: Vec<Cluster> = cells
        .into_values()
        .map(|members| {
            let count = members.len();
            let lat = members.iter().map(|m| m.position.lat).sum::<f64>() / count as f64;
            let lng = members.iter().map(|m| m.position.lng).sum::<f64>() / count as f64;
            Cluster {
                center: Position { lat, lng },
                count,
                node_addresses: members.iter().map(|m| m.node_address.clone()).collect(),
            }
        })
        .collect();

    clusters.sort_by(|a, b| b.count.cmp(&a.count));
    clusters
}
