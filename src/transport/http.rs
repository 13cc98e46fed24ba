//! Blocking HTTP collaborators built on reqwest.
//!
//! - [`HttpTripSource`]: the backend scan endpoint
//! - [`UpstreamTripSource`]: the operator's events feed, no backend needed
//! - [`HttpAlertSink`]: the backend alert endpoint

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::trip::{Trip, TripQuery};

use super::traits::{AlertRequest, AlertSink, TripSource};
use super::wire::{EventsResponse, ScanResponse};

/// Per-request timeout for every HTTP collaborator.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default public address of the operator's booking site.
pub const UPSTREAM_BASE_URL: &str = "https://www.praamid.ee";

fn build_client() -> Result<Client, FetchError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| FetchError::transport(e.to_string()))
}

fn trim_base(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

fn read_success(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(FetchError::Status {
        code: status.as_u16(),
        body: body.trim().to_string(),
    })
}

/// Fetches trips from the backend's `GET /api/scan`.
#[derive(Debug, Clone)]
pub struct HttpTripSource {
    base_url: String,
    client: Client,
}

impl HttpTripSource {
    /// Creates a source for the backend at `base_url` (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        Ok(Self {
            base_url: trim_base(base_url),
            client: build_client()?,
        })
    }
}

impl TripSource for HttpTripSource {
    fn fetch(&self, query: &TripQuery) -> Result<Vec<Trip>, FetchError> {
        let url = format!("{}/api/scan", self.base_url);
        debug!(%url, date = %query.date, direction = %query.direction, "fetching scan");

        let response = self
            .client
            .get(&url)
            .query(&query.query_pairs())
            .send()
            .map_err(|e| FetchError::transport(e.to_string()))?;

        let scan: ScanResponse = read_success(response)?
            .json()
            .map_err(|e| FetchError::Decode { message: e.to_string() })?;

        Ok(scan.into_trips())
    }
}

/// Fetches trips straight from the operator's events feed.
#[derive(Debug, Clone)]
pub struct UpstreamTripSource {
    base_url: String,
    client: Client,
}

impl UpstreamTripSource {
    /// Creates a source for the operator site at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        Ok(Self {
            base_url: trim_base(base_url),
            client: build_client()?,
        })
    }

    /// Creates a source for the public operator site.
    pub fn public() -> Result<Self, FetchError> {
        Self::new(UPSTREAM_BASE_URL)
    }
}

impl TripSource for UpstreamTripSource {
    fn fetch(&self, query: &TripQuery) -> Result<Vec<Trip>, FetchError> {
        let url = format!("{}/online/events", self.base_url);
        debug!(%url, date = %query.date, direction = %query.direction, "fetching operator events");

        let date = query.date.format("%Y-%m-%d").to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("direction", query.direction.code()),
                ("departure-date", date.as_str()),
                ("time-shift", "300"),
            ])
            .send()
            .map_err(|e| FetchError::transport(e.to_string()))?;

        let events: EventsResponse = read_success(response)?
            .json()
            .map_err(|e| FetchError::Decode { message: e.to_string() })?;

        Ok(events.into_trips(query))
    }
}

/// Posts alerts to the backend's `POST /api/alert`.
///
/// Delivery failures are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct HttpAlertSink {
    url: String,
    client: Client,
}

impl HttpAlertSink {
    /// Creates a sink for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        Ok(Self {
            url: format!("{}/api/alert", trim_base(base_url)),
            client: build_client()?,
        })
    }
}

impl AlertSink for HttpAlertSink {
    fn dispatch(&self, request: &AlertRequest) {
        let channel = request.channel();
        match self.client.post(&self.url).json(request).send() {
            Ok(resp) if resp.status().is_success() => {
                info!(?channel, "alert queued by backend");
            }
            Ok(resp) => {
                warn!(?channel, status = resp.status().as_u16(), "alert rejected by backend");
            }
            Err(e) => {
                warn!(?channel, error = %e, "alert delivery failed");
            }
        }
    }
}
