use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;

pub const SUPERTAG_TOKEN: &str = "D29B3BE8F2CC9A1A7051";
pub const DOOR_SENSOR_TOKEN: &str = "0B0F0EA3C1B6F6D5E4A2";
pub const TEMPERATURE_TAG_TOKEN: &str = "6D3A4E3C91B7A2F5E8C0";

#[derive(Debug, Clone, Serialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    #[serde(skip)]
    pub center: (f64, f64),
}

/// One tag as the tracking API reports it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub node_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub mac_address: String,
    pub registration_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_status: Option<String>,
    pub last_event_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_supertag_id: Option<String>,
    #[serde(skip)]
    pub site_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct Fleet {
    pub organizations: Vec<Organization>,
    pub sites: Vec<Site>,
    pub tags: Vec<TagRecord>,
}

impl Fleet {
    pub fn generate(rng: &mut impl Rng, orgs: usize, sites_per_org: usize, hubs_per_site: usize) -> Self {
        let mut fleet = Fleet {
            organizations: Vec::new(),
            sites: Vec::new(),
            tags: Vec::new(),
        };

        for o in 0..orgs {
            let org = Organization {
                id: uuid::Uuid::new_v4().to_string(),
                name: format!("Organization {}", o + 1),
            };

            for s in 0..sites_per_org {
                let site = Site {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: format!("{} Yard {}", org.name, s + 1),
                    organization_id: org.id.clone(),
                    center: (rng.gen_range(30.0..48.0), rng.gen_range(-120.0..-75.0)),
                };
                for h in 0..hubs_per_site {
                    fleet.add_hub(rng, &site, h);
                }
                fleet.sites.push(site);
            }
            fleet.organizations.push(org);
        }

        fleet
    }

    fn add_hub(&mut self, rng: &mut impl Rng, site: &Site, index: usize) {
        let hub = generate_tag(rng, site, SUPERTAG_TOKEN, None);
        let hub_address = hub.node_address.clone();
        let hub_name = format!("Hub {}", index + 1);
        self.tags.push(TagRecord {
            node_name: Some(hub_name),
            ..hub
        });

        let children = rng.gen_range(0..6);
        for _ in 0..children {
            let token = if rng.gen_bool(0.5) {
                TEMPERATURE_TAG_TOKEN
            } else {
                DOOR_SENSOR_TOKEN
            };
            let mut child = generate_tag(rng, site, token, Some(hub_address.clone()));
            // leashed tags report through their hub and often lack GPS
            if rng.gen_bool(0.7) {
                child.latitude = None;
                child.longitude = None;
            }
            self.tags.push(child);
        }
    }

    pub fn site_tags(&self, site_id: &str) -> Vec<&TagRecord> {
        self.tags.iter().filter(|t| t.site_id == site_id).collect()
    }

    pub fn find_tag(&self, node_address: &str) -> Option<&TagRecord> {
        self.tags.iter().find(|t| t.node_address == node_address)
    }

    /// Advances every tag's readings by one reporting cycle.
    pub fn advance(&mut self, rng: &mut impl Rng) {
        let now = Utc::now();
        for tag in &mut self.tags {
            // some tags miss a cycle
            if rng.gen_bool(0.1) {
                continue;
            }
            if let (Some(lat), Some(lng)) = (tag.latitude, tag.longitude) {
                tag.latitude = Some(lat + rng.gen_range(-0.001..0.001));
                tag.longitude = Some(lng + rng.gen_range(-0.001..0.001));
            }
            if tag.temperature.is_some() {
                tag.temperature = Some(generate_temperature(rng));
            }
            if let Some(volts) = tag.battery_voltage {
                tag.battery_voltage = Some((volts - rng.gen_range(0.0..0.002)).max(2.0));
            }
            tag.last_event_time = now;
        }
    }
}

fn generate_tag(
    rng: &mut impl Rng,
    site: &Site,
    token: &str,
    parent: Option<String>,
) -> TagRecord {
    let address = format!("{:012X}", rng.gen::<u64>() & 0xFFFF_FFFF_FFFF);
    let mac = address
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":");

    let (battery_voltage, battery_status) = if rng.gen_bool(0.2) {
        // flag-only firmware
        (None, Some(if rng.gen_bool(0.1) { "Low" } else { "OK" }.to_string()))
    } else {
        (Some(rng.gen_range(2.2..3.1)), None)
    };

    TagRecord {
        node_name: rng.gen_bool(0.85).then(|| format!("Asset {}", &address[8..])),
        node_address: address,
        mac_address: mac,
        registration_token: token.to_string(),
        latitude: Some(site.center.0 + rng.gen_range(-0.05..0.05)),
        longitude: Some(site.center.1 + rng.gen_range(-0.05..0.05)),
        temperature: (token == TEMPERATURE_TAG_TOKEN).then(|| generate_temperature(rng)),
        battery_voltage,
        battery_status,
        last_event_time: Utc::now() - Duration::minutes(rng.gen_range(0..120)),
        source_supertag_id: parent,
        site_id: site.id.clone(),
    }
}

fn generate_temperature(rng: &mut impl Rng) -> f64 {
    let fahrenheit = if rng.gen_bool(0.05) {
        rng.gen_range(-20.0..130.0) // 5% outliers
    } else {
        rng.gen_range(34.0..45.0) // cold chain
    };
    (fahrenheit * 10.0_f64).round() / 10.0
}

/// Straight-line walk from a random start to the tag's position, one point
/// per `step` inside [start, end].
pub fn location_history(
    rng: &mut impl Rng,
    tag: &TagRecord,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
) -> Vec<LocationPoint> {
    let (Some(lat), Some(lng)) = (tag.latitude, tag.longitude) else {
        return Vec::new();
    };
    if end <= start || step <= Duration::zero() {
        return Vec::new();
    }

    let from = (lat + rng.gen_range(-0.05..0.05), lng + rng.gen_range(-0.05..0.05));
    let steps = ((end - start).num_seconds() / step.num_seconds().max(1)).clamp(1, 500);

    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            LocationPoint {
                latitude: from.0 + (lat - from.0) * t,
                longitude: from.1 + (lng - from.1) * t,
                timestamp: start + (end - start) * i as i32 / steps as i32,
            }
        })
        .collect()
}
