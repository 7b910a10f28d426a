use crate::config::Config;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::future::Future;

/// One interface entry as reported by the counter source. A missing name
/// drops the entry downstream; missing counters read as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: Option<String>,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to router failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("router returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to decode router response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Anything that can report the current cumulative counters of every
/// monitored channel at one point in time.
pub trait CounterSource {
    fn fetch_counters(
        &self,
    ) -> impl Future<Output = Result<Vec<InterfaceCounters>, FetchError>> + Send;
}

// RouterOS REST serializes the byte counters as JSON strings.
#[derive(Debug, Deserialize)]
struct InterfaceDto {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "rx-byte")]
    rx_byte: Option<String>,
    #[serde(default, rename = "tx-byte")]
    tx_byte: Option<String>,
}

impl InterfaceDto {
    fn into_counters(self) -> InterfaceCounters {
        InterfaceCounters {
            name: self.name,
            rx_bytes: parse_counter(self.rx_byte.as_deref()),
            tx_bytes: parse_counter(self.tx_byte.as_deref()),
        }
    }
}

fn parse_counter(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse::<u64>().ok())
}

/// MikroTik REST client. Every request carries HTTP Basic credentials; the
/// router's byte counters come from `GET /rest/interface`.
#[derive(Clone)]
pub struct RouterClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl RouterClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.http_timeout());
        if let Some(path) = &config.router_ca_path {
            let pem = std::fs::read(path)
                .with_context(|| format!("failed to read router CA bundle {}", path.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("router CA bundle {} is not valid PEM", path.display()))?;
            builder = builder.add_root_certificate(cert);
        }
        if config.router_accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build().context("failed to build router HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url_for(&config.router_addr),
            username: config.router_username.clone(),
            password: config.router_password.clone(),
        })
    }
}

impl CounterSource for RouterClient {
    async fn fetch_counters(&self) -> Result<Vec<InterfaceCounters>, FetchError> {
        let response = self
            .http
            .get(format!("{}rest/interface", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let interfaces = response
            .json::<Vec<InterfaceDto>>()
            .await
            .map_err(FetchError::Decode)?;
        Ok(interfaces
            .into_iter()
            .map(InterfaceDto::into_counters)
            .collect())
    }
}

// Accepts "192.168.88.1" as well as "host:8443"; RouterOS REST is https-only.
fn base_url_for(router_addr: &str) -> String {
    format!("https://{}/", router_addr.trim().trim_end_matches('/'))
}
