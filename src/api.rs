use crate::error::Error;
use crate::types::{
    FetchUpdatesRequest, FetchUpdatesResponse, FindFullHashesRequest, FindFullHashesResponse,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://safebrowsing.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The two remote calls the engine makes. The synchronizer fetches list
/// diffs; the matcher resolves prefix hits into full hashes.
#[async_trait]
pub trait ThreatApi: Send + Sync {
    async fn fetch_threat_list_updates(
        &self,
        request: &FetchUpdatesRequest,
    ) -> Result<FetchUpdatesResponse, Error>;

    async fn find_full_hashes(
        &self,
        request: &FindFullHashesRequest,
    ) -> Result<FindFullHashesResponse, Error>;
}

#[derive(Clone)]
pub struct HttpThreatApi {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpThreatApi {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn post<B, R>(&self, method: &str, body: &B) -> Result<R, Error>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/v4/{}?key={}", self.endpoint, method, self.api_key);
        debug!(method, "calling threat service");
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::RemoteService(format!(
                "{method} failed with status {status}: {detail}"
            )));
        }
        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl ThreatApi for HttpThreatApi {
    async fn fetch_threat_list_updates(
        &self,
        request: &FetchUpdatesRequest,
    ) -> Result<FetchUpdatesResponse, Error> {
        self.post("threatListUpdates:fetch", request).await
    }

    async fn find_full_hashes(
        &self,
        request: &FindFullHashesRequest,
    ) -> Result<FindFullHashesResponse, Error> {
        self.post("fullHashes:find", request).await
    }
}
