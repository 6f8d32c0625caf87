//! Wire format spoken with the pricing server.
//!
//! Request frame: the parameter fields plus `type` ("call" | "put"), and an
//! `id` when the client runs in tagged mode:
//! `{"spot":100.0,"strike":100.0,"rate":0.05,"volatility":0.2,"maturity":1.0,"type":"call"}`
//!
//! Response frame: `{"type":"price_result","data":{"price":..,"delta":..,"vega":..,"ts_server":..}}`
//! where the numeric fields may be null. Servers that support tagging echo
//! the request `id` at the top level.

use super::types::{ContractSide, PricingParameters, PricingRequest, PricingResult};
use crate::errors::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PRICE_RESULT: &str = "price_result";

#[derive(Serialize)]
struct RequestFrame<'a> {
    #[serde(flatten)]
    params: &'a PricingParameters,
    #[serde(rename = "type")]
    side: ContractSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
}

#[derive(Deserialize)]
struct ResponseFrame {
    #[serde(rename = "type")]
    kind: String,
    data: Option<PriceData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PriceData {
    pub price: Option<f64>,
    pub delta: Option<f64>,
    pub vega: Option<f64>,
    pub ts_server: f64,
}

impl PriceData {
    #[inline]
    pub fn into_result(self, request: PricingRequest) -> PricingResult {
        PricingResult {
            price: self.price,
            delta: self.delta,
            vega: self.vega,
            server_ts: self.ts_server,
            request,
        }
    }
}

/// An inbound frame after parsing. The id is extracted even when the body is
/// malformed so a tagged failure still lands on the right request.
#[derive(Debug)]
pub struct DecodedFrame {
    pub id: Option<Uuid>,
    pub body: ClientResult<PriceData>,
}

pub fn encode_request(request: &PricingRequest, id: Option<Uuid>) -> ClientResult<String> {
    let frame = RequestFrame {
        params: &request.params,
        side: request.side,
        id,
    };
    Ok(serde_json::to_string(&frame)?)
}

pub fn decode_response(text: &str) -> DecodedFrame {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return DecodedFrame {
                id: None,
                body: Err(ClientError::Protocol(format!("invalid json: {e}"))),
            }
        }
    };

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());

    let body = serde_json::from_value::<ResponseFrame>(value)
        .map_err(ClientError::from)
        .and_then(|frame| {
            if frame.kind != PRICE_RESULT {
                return Err(ClientError::Protocol(format!(
                    "unexpected frame type: {}",
                    frame.kind
                )));
            }
            frame
                .data
                .ok_or_else(|| ClientError::Protocol("price_result without data".into()))
        });

    DecodedFrame { id, body }
}
