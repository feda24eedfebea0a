use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;

pub const DEFAULT_STATUS_URL: &str = "https://mc.chargepoint.com/map-prod/v3/station/info";
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/119.0.0.0 Safari/537.36";

const REQUEST_TIMEOUT_SECONDS: u64 = 30;

#[async_trait]
pub trait StationSource: Send + Sync {
    /// Raw response body for one station. Decoding is left to the caller.
    async fn fetch_station(&self, station_id: &str) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<T> StationSource for &T
where
    T: StationSource + ?Sized,
{
    async fn fetch_station(&self, station_id: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_station(station_id).await
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to station endpoint failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("station endpoint returned {status}")]
    Status { status: StatusCode },
    #[error("failed to read station response body: {0}")]
    Body(#[source] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ChargePointHttpClient {
    http: reqwest::Client,
    status_url: String,
}

impl ChargePointHttpClient {
    pub fn new(status_url: impl Into<String>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            http,
            status_url: status_url.into(),
        })
    }
}

#[async_trait]
impl StationSource for ChargePointHttpClient {
    async fn fetch_station(&self, station_id: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http
            .get(&self.status_url)
            .query(&[("deviceId", station_id)])
            .send()
            .await
            .map_err(FetchError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body = response.bytes().await.map_err(FetchError::Body)?;
        Ok(body.to_vec())
    }
}
