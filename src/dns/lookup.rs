//! Out-of-band hostname lookup.
//!
//! Blackholed hosts are resolved through an HTTP lookup API instead of the
//! local resolver, which would only hand back the sinkhole address again.

use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LookupSettings;
use crate::error::LookupError;

/// User-Agent header value for HTTP requests.
const USER_AGENT: &str = concat!("hostpatch/", env!("CARGO_PKG_VERSION"));

/// Trait for resolving a hostname to an IPv4 address.
pub trait HostLookup: Send + Sync + Clone + 'static {
    /// Resolve `host` to its first A-record address.
    fn lookup(&self, host: &str) -> impl Future<Output = Result<Ipv4Addr, LookupError>> + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    domain: &'a str,
    dns_server: &'a str,
}

/// Response body, reduced to `records.a.response.answer[].ipInfo.query`.
#[derive(Debug, Deserialize)]
struct LookupResponse {
    records: Option<RecordSet>,
}

#[derive(Debug, Deserialize)]
struct RecordSet {
    a: Option<RecordResult>,
}

#[derive(Debug, Deserialize)]
struct RecordResult {
    response: Option<RecordAnswers>,
}

#[derive(Debug, Deserialize)]
struct RecordAnswers {
    answer: Option<Vec<AnswerEntry>>,
}

#[derive(Debug, Deserialize)]
struct AnswerEntry {
    #[serde(rename = "ipInfo")]
    ip_info: Option<IpInfo>,
}

#[derive(Debug, Deserialize)]
struct IpInfo {
    query: Option<String>,
}

impl LookupResponse {
    /// First answer carrying an `ipInfo.query` value.
    fn first_address(self) -> Option<String> {
        self.records?
            .a?
            .response?
            .answer?
            .into_iter()
            .find_map(|entry| entry.ip_info?.query)
    }
}

/// Lookup client for the nslookup.io records API.
#[derive(Clone)]
pub struct NslookupClient {
    client: Client,
    endpoint: String,
    dns_server: String,
}

impl NslookupClient {
    /// Create a new client posting to `endpoint` with the given provider id.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        endpoint: impl Into<String>,
        dns_server: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(LookupError::ClientBuild)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            dns_server: dns_server.into(),
        })
    }

    pub fn from_settings(settings: &LookupSettings) -> Result<Self, LookupError> {
        Self::new(
            settings.endpoint.clone(),
            settings.dns_server.clone(),
            settings.timeout(),
        )
    }
}

impl HostLookup for NslookupClient {
    async fn lookup(&self, host: &str) -> Result<Ipv4Addr, LookupError> {
        let request = LookupRequest {
            domain: host,
            dns_server: &self.dns_server,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|source| LookupError::Network {
                host: host.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::HttpStatus {
                host: host.to_string(),
                status: status.as_u16(),
            });
        }

        let body: LookupResponse = response.json().await.map_err(|source| LookupError::Body {
            host: host.to_string(),
            source,
        })?;

        let value = body.first_address().ok_or_else(|| LookupError::NoAnswer {
            host: host.to_string(),
        })?;

        value.parse().map_err(|_| LookupError::InvalidAddress {
            host: host.to_string(),
            value,
        })
    }
}
