use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_SAMPLES_PER_DAY: usize = 10;

#[derive(Clone, Debug)]
pub struct Config {
    pub router_addr: String,
    pub router_username: String,
    pub router_password: String,
    pub router_ca_path: Option<PathBuf>,
    pub router_accept_invalid_certs: bool,
    pub data_dir: PathBuf,
    pub capture_interval_seconds: u64,
    pub max_samples_per_day: usize,
    pub http_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let router_addr = required_var("TRAFFIC_ROUTER_ADDR")?;
        let router_username = required_var("TRAFFIC_ROUTER_USERNAME")?;
        let router_password = required_var("TRAFFIC_ROUTER_PASSWORD")?;

        let router_ca_path = env::var("TRAFFIC_ROUTER_CA_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let router_accept_invalid_certs = env::var("TRAFFIC_ROUTER_ACCEPT_INVALID_CERTS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let data_dir = env::var("TRAFFIC_DATA_DIR")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let capture_interval_seconds = env::var("TRAFFIC_CAPTURE_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v != 0)
            .unwrap_or(300);

        let max_samples_per_day = env::var("TRAFFIC_MAX_SAMPLES_PER_DAY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_SAMPLES_PER_DAY);
        // A cap below 2 cannot hold both day endpoints; floor it rather than
        // let the retention pass silently exceed the configured number.
        let max_samples_per_day = if max_samples_per_day < 2 {
            tracing::warn!(
                configured = max_samples_per_day,
                "TRAFFIC_MAX_SAMPLES_PER_DAY below 2 cannot keep a day's first and last sample; using 2"
            );
            2
        } else {
            max_samples_per_day
        };

        let http_timeout_seconds = env::var("TRAFFIC_HTTP_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v != 0)
            .unwrap_or(10);

        Ok(Self {
            router_addr,
            router_username,
            router_password,
            router_ca_path,
            router_accept_invalid_certs,
            data_dir,
            capture_interval_seconds,
            max_samples_per_day,
            http_timeout_seconds,
        })
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs(self.capture_interval_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

fn required_var(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .with_context(|| format!("{key} is required"))
}
