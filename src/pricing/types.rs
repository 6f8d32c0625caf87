use crate::errors::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};

// ── Contract side ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractSide {
    Call,
    Put,
}

impl ContractSide {
    pub const BOTH: [ContractSide; 2] = [ContractSide::Call, ContractSide::Put];
}

impl std::fmt::Display for ContractSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

// ── Parameters (immutable value, replaced on every edit) ──

/// One settled parameter vector. `steps` only matters to the binomial pricer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingParameters {
    pub spot: f64,
    pub strike: f64,
    pub rate: f64,
    pub volatility: f64,
    pub maturity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
}

impl PricingParameters {
    /// Rejects vectors the server cannot price. Runs before any request is sent.
    pub fn validate(&self) -> ClientResult<()> {
        let fields = [
            ("spot", self.spot),
            ("strike", self.strike),
            ("rate", self.rate),
            ("volatility", self.volatility),
            ("maturity", self.maturity),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(ClientError::Validation(format!("{name} must be finite, got {value}")));
            }
        }
        for (name, value) in [
            ("spot", self.spot),
            ("strike", self.strike),
            ("volatility", self.volatility),
            ("maturity", self.maturity),
        ] {
            if value <= 0.0 {
                return Err(ClientError::Validation(format!("{name} must be positive, got {value}")));
            }
        }
        if self.steps == Some(0) {
            return Err(ClientError::Validation("steps must be at least 1".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn with_spot_vol(&self, spot: f64, volatility: f64) -> Self {
        Self { spot, volatility, ..*self }
    }
}

impl Default for PricingParameters {
    fn default() -> Self {
        Self {
            spot: 100.0,
            strike: 100.0,
            rate: 0.05,
            volatility: 0.2,
            maturity: 1.0,
            steps: None,
        }
    }
}

// ── Request / result ──

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingRequest {
    pub params: PricingParameters,
    pub side: ContractSide,
}

impl PricingRequest {
    #[inline]
    pub fn new(params: PricingParameters, side: ContractSide) -> Self {
        Self { params, side }
    }
}

/// Server answer for one request. `None` numerics mean the server could not
/// compute that quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingResult {
    pub price: Option<f64>,
    pub delta: Option<f64>,
    pub vega: Option<f64>,
    pub server_ts: f64,
    pub request: PricingRequest,
}

impl PricingResult {
    pub fn server_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        if !self.server_ts.is_finite() {
            return None;
        }
        chrono::DateTime::from_timestamp_millis(self.server_ts as i64)
    }
}

/// Call and put results produced by a single settle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DualPricing {
    pub call: PricingResult,
    pub put: PricingResult,
}

impl DualPricing {
    #[inline]
    pub fn params(&self) -> PricingParameters {
        self.call.request.params
    }

    /// One-line summary for notifications.
    pub fn summary(&self) -> String {
        format!(
            "Updated Call {} / Put {}",
            fmt_price(self.call.price),
            fmt_price(self.put.price)
        )
    }
}

fn fmt_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("${p:.4}"),
        None => "N/A".to_string(),
    }
}

// ── Connection state machine ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ── Grid ──

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridCell {
    pub spot: f64,
    pub volatility: f64,
    pub price: Option<f64>,
}
