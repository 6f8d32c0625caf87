use crate::errors::{ClientError, ClientResult};
use std::time::Duration;

/// How inbound frames are matched to outstanding requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMode {
    /// No request id on the wire; one request in flight, next frame answers it.
    Positional,
    /// Client-generated id echoed by the server; many requests in flight.
    Tagged,
}

impl std::str::FromStr for CorrelationMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(Self::Positional),
            "tagged" => Ok(Self::Tagged),
            other => Err(ClientError::Config(format!(
                "CORRELATION_MODE: expected positional|tagged, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pricing_server_url: String,
    pub correlation_mode: CorrelationMode,
    pub max_in_flight: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub debounce: Duration,
    pub grid_points: usize,
    pub grid_interval: Duration,
    pub grid_concurrency: usize,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> ClientResult<Self> {
        dotenvy::dotenv().ok();

        let correlation_mode = env_var_or("CORRELATION_MODE", "positional").parse()?;
        let max_in_flight = parse_var::<usize>("MAX_IN_FLIGHT", "16")?;
        let request_timeout_ms = parse_var::<u64>("REQUEST_TIMEOUT_MS", "10000")?;
        let connect_timeout_ms = parse_var::<u64>("CONNECT_TIMEOUT_MS", "5000")?;
        let debounce_ms = parse_var::<u64>("DEBOUNCE_MS", "200")?;
        let grid_points = parse_var::<usize>("GRID_POINTS", "11")?;
        let grid_interval_ms = parse_var::<u64>("GRID_INTERVAL_MS", "3")?;
        let grid_concurrency = parse_var::<usize>("GRID_CONCURRENCY", "1")?;
        let server_port = parse_var::<u16>("SERVER_PORT", "3001")?;

        let cfg = Self {
            pricing_server_url: env_var_or("PRICING_SERVER_URL", "ws://localhost:8080/"),
            correlation_mode,
            max_in_flight,
            request_timeout: Duration::from_millis(request_timeout_ms),
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            debounce: Duration::from_millis(debounce_ms),
            grid_points,
            grid_interval: Duration::from_millis(grid_interval_ms),
            grid_concurrency,
            server_port,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if !self.pricing_server_url.starts_with("ws://") && !self.pricing_server_url.starts_with("wss://") {
            return Err(ClientError::Config(format!(
                "PRICING_SERVER_URL must be a ws:// or wss:// url: {}",
                self.pricing_server_url
            )));
        }
        if self.max_in_flight == 0 {
            return Err(ClientError::Config("MAX_IN_FLIGHT must be at least 1".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Config("REQUEST_TIMEOUT_MS must be positive".into()));
        }
        if self.grid_points == 0 {
            return Err(ClientError::Config("GRID_POINTS must be at least 1".into()));
        }
        if self.grid_concurrency == 0 {
            return Err(ClientError::Config("GRID_CONCURRENCY must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pricing_server_url: "ws://localhost:8080/".to_string(),
            correlation_mode: CorrelationMode::Positional,
            max_in_flight: 16,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            debounce: Duration::from_millis(200),
            grid_points: 11,
            grid_interval: Duration::from_millis(3),
            grid_concurrency: 1,
            server_port: 3001,
        }
    }
}

fn parse_var<T>(key: &str, default: &str) -> ClientResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_var_or(key, default)
        .parse::<T>()
        .map_err(|e| ClientError::Config(format!("{key}: {e}")))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
