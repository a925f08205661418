//! Persistent user preferences, the desktop counterpart of browser storage.
//!
//! Everything lives in one JSON document. A missing file means defaults; a
//! malformed one is logged and replaced by defaults on the next write.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::alerts::AlertThresholds;
use crate::errors::Result;
use crate::listing::{SortKey, SortOrder};
use crate::session::{AuthScheme, Credential};
use crate::units::TemperatureUnit;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapStyle {
    #[default]
    Streets,
    Satellite,
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Map,
    List,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub auth_token: Option<String>,
    pub auth_scheme: Option<AuthScheme>,
    pub auth_expiry: Option<DateTime<Utc>>,
    pub selected_organization_id: Option<String>,
    pub selected_site_id: Option<String>,
    pub map_style: MapStyle,
    pub temperature_unit: TemperatureUnit,
    pub alert_thresholds: AlertThresholds,
    pub view_mode: ViewMode,
    pub show_alerts_panel: bool,
    pub list_sort: SortKey,
    pub list_order: SortOrder,
    pub list_search: Option<String>,
}

impl Preferences {
    /// The stored credential, if one exists and has not expired.
    pub fn credential(&self, now: DateTime<Utc>) -> Option<Credential> {
        let credential = Credential {
            scheme: self.auth_scheme.unwrap_or(AuthScheme::Bearer),
            token: self.auth_token.clone()?,
            expires_at: self.auth_expiry,
        };
        credential.is_valid(now).then_some(credential)
    }
}

pub struct PreferenceStore {
    path: Option<PathBuf>,
    prefs: RwLock<Preferences>,
}

impl PreferenceStore {
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let prefs = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Preferences>(&bytes) {
                Ok(prefs) => {
                    info!("Loaded preferences from {}", path.display());
                    prefs
                }
                Err(e) => {
                    warn!(
                        "Ignoring malformed preferences in {}: {}",
                        path.display(),
                        e
                    );
                    Preferences::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No preferences at {}, using defaults", path.display());
                Preferences::default()
            }
            Err(e) => {
                warn!("Failed to read preferences {}: {}", path.display(), e);
                Preferences::default()
            }
        };

        Self {
            path: Some(path),
            prefs: RwLock::new(prefs),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            prefs: RwLock::new(Preferences::default()),
        }
    }

    pub async fn get(&self) -> Preferences {
        self.prefs.read().await.clone()
    }

    /// Applies `change` and writes the whole document back. The change only
    /// becomes visible once the write has succeeded.
    pub async fn update<F, R>(&self, change: F) -> Result<R>
    where
        F: FnOnce(&mut Preferences) -> R,
    {
        let mut prefs = self.prefs.write().await;
        let mut next = prefs.clone();
        let out = change(&mut next);
        if let Some(path) = &self.path {
            let bytes = serde_json::to_vec_pretty(&next)?;
            if let Err(e) = tokio::fs::write(path, bytes).await {
                warn!("Failed to write preferences {}: {}", path.display(), e);
                return Err(e.into());
            }
            debug!("Preferences written to {}", path.display());
        }
        *prefs = next;
        Ok(out)
    }

    pub async fn credential(&self, now: DateTime<Utc>) -> Option<Credential> {
        self.prefs.read().await.credential(now)
    }

    pub async fn save_credential(&self, credential: &Credential) -> Result<()> {
        self.update(|prefs| {
            prefs.auth_token = Some(credential.token.clone());
            prefs.auth_scheme = Some(credential.scheme);
            prefs.auth_expiry = credential.expires_at;
        })
        .await
    }

    pub async fn clear_credential(&self) -> Result<()> {
        self.update(|prefs| {
            prefs.auth_token = None;
            prefs.auth_scheme = None;
            prefs.auth_expiry = None;
        })
        .await
    }
}
