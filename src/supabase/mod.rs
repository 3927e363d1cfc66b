pub mod models;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Url,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::SupabaseConfig,
    error::{DashboardError, Result},
};

pub use self::models::{Direction, FilterOp, SelectQuery};

/// Fixed per-call timeout. Calls are never retried.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Anything that can answer a `SelectQuery` with raw JSON rows.
///
/// `SupabaseClient` is the production implementation; tests substitute
/// in-memory sources to count fetches.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>>;
}

/// Runs `query` and decodes every row into `T`.
pub async fn select_as<T, S>(source: &S, query: &SelectQuery) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    S: RecordSource + ?Sized,
{
    decode_rows(query.table(), source.select(query).await?)
}

/// Decodes raw rows from `table`; one bad row fails the whole batch.
pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| DashboardError::Decode(format!("unexpected row in {table}: {e}")))
        })
        .collect()
}

/// Stands in for the store when it is not configured. Every query fails with
/// the configuration problem so each section can report it.
#[derive(Debug, Clone)]
pub struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    pub fn new(err: &DashboardError) -> Self {
        let reason = match err {
            DashboardError::Configuration(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self { reason }
    }
}

#[async_trait]
impl RecordSource for Unconfigured {
    async fn select(&self, _query: &SelectQuery) -> Result<Vec<Value>> {
        Err(DashboardError::Configuration(self.reason.clone()))
    }
}

// ---------------------------------------------------------------------------
// SupabaseClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
}

impl SupabaseClient {
    /// Fails with `DashboardError::Configuration` if the URL or key is missing.
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(build_headers(&config.key)?)
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.url.trim_end_matches('/').to_owned(),
            }),
        })
    }

    fn url(&self, query: &SelectQuery) -> Result<Url> {
        let endpoint = format!("{}/rest/v1/{}", self.inner.base_url, query.table());
        Url::parse_with_params(&endpoint, query.params())
            .map_err(|e| DashboardError::configuration(format!("invalid SUPABASE_URL: {e}")))
    }
}

#[async_trait]
impl RecordSource for SupabaseClient {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>> {
        let url = self.url(query)?;
        debug!(table = %query.table(), url = %url, "Querying Supabase");

        let resp = self
            .inner
            .http
            .get(url)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            warn!(table = %query.table(), status = status.as_u16(), body = %body, "Supabase returned error status");
            return Err(DashboardError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let rows = serde_json::from_slice::<Vec<Value>>(&bytes).map_err(|e| {
            DashboardError::Decode(format!("{} response is not a JSON array: {e}", query.table()))
        })?;
        debug!(table = %query.table(), rows = rows.len(), "Supabase query complete");
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Header helpers
// ---------------------------------------------------------------------------

/// The store wants the project key twice: as `apikey` and as a bearer token.
fn build_headers(key: &str) -> Result<HeaderMap> {
    let invalid = |_: InvalidHeaderValue| DashboardError::configuration("SUPABASE_KEY is not a valid header value");

    let mut apikey = HeaderValue::from_str(key).map_err(invalid)?;
    apikey.set_sensitive(true);
    let mut bearer = HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert("apikey", apikey);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
