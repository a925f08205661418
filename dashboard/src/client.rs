use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::model::{LocationPoint, Organization, Site, SuperTagConfig, Tag};
use crate::storage::PreferenceStore;

pub const DEFAULT_PAGE_SIZE: u32 = 500;
const MAX_PAGES: u32 = 50;
const NO_PARAMS: [(&str, &str); 0] = [];

/// Paging and ordering for a tag list request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: String,
    pub sort: String,
}

impl Default for TagQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: "nodeName".to_string(),
            sort: "asc".to_string(),
        }
    }
}

/// Client for the remote tracking API.
///
/// Every request picks up the current credential from the preference store,
/// so a login or logout takes effect on the next call.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    store: Arc<PreferenceStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, store: Arc<PreferenceStore>) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        })
    }

    pub async fn fetch_organizations(&self) -> Result<Vec<Organization>> {
        let organizations = self.get_json("organizations", &NO_PARAMS).await?;
        Ok(drop_unidentified(organizations, |o: &Organization| &o.id, "organization"))
    }

    pub async fn fetch_sites(&self, organization_id: &str) -> Result<Vec<Site>> {
        let sites = self
            .get_json("sites", &[("organizationId", organization_id)])
            .await?;
        Ok(drop_unidentified(sites, |s: &Site| &s.id, "site"))
    }

    pub async fn fetch_tags(&self, site_id: &str, query: &TagQuery) -> Result<Vec<Tag>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Params<'a> {
            site_id: &'a str,
            #[serde(flatten)]
            query: &'a TagQuery,
        }

        self.get_json("tags", &Params { site_id, query }).await
    }

    /// Walks the tag pages of a site until a short page comes back.
    pub async fn fetch_all_tags(&self, site_id: &str) -> Result<Vec<Tag>> {
        let mut query = TagQuery::default();
        let mut tags = Vec::new();

        loop {
            let page = self.fetch_tags(site_id, &query).await?;
            let short = (page.len() as u32) < query.page_size;
            tags.extend(page);

            if short {
                break;
            }
            if query.page >= MAX_PAGES {
                warn!(
                    "Site {} still returning full pages after {} pages, stopping",
                    site_id, MAX_PAGES
                );
                break;
            }
            query.page += 1;
        }

        debug!("Fetched {} tags for site {}", tags.len(), site_id);
        Ok(tags)
    }

    pub async fn fetch_location_history(
        &self,
        node_address: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocationPoint>> {
        self.get_json(
            "location-history",
            &[
                ("nodeAddress", node_address.to_string()),
                ("start", start.to_rfc3339()),
                ("end", end.to_rfc3339()),
            ],
        )
        .await
    }

    pub async fn fetch_supertag_config(&self, node_address: &str) -> Result<SuperTagConfig> {
        self.get_json("supertag-config", &[("nodeAddress", node_address)])
            .await
    }

    async fn get_json<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let credential = self
            .store
            .credential(Utc::now())
            .await
            .ok_or(Error::Unauthenticated)?;

        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);

        let request = self
            .http
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/json");
        let response = credential.apply(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("GET {} failed with {}", url, status);
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

/// Records without an id cannot be selected, so they are left out of the list.
fn drop_unidentified<T>(records: Vec<T>, id: impl Fn(&T) -> &String, kind: &str) -> Vec<T> {
    let total = records.len();
    let kept: Vec<T> = records.into_iter().filter(|r| !id(r).is_empty()).collect();
    if kept.len() < total {
        warn!("Dropped {} {} record(s) without an id", total - kept.len(), kind);
    }
    kept
}
