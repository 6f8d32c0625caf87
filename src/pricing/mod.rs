pub mod protocol;
pub mod types;

#[cfg(test)]
pub mod fake;

use crate::errors::ClientResult;
use futures_util::future::BoxFuture;
use types::{PricingRequest, PricingResult};

/// Anything that can price a single request. The dispatcher and the grid
/// depend on this seam, never on a concrete connection.
/// Send + Sync required for use across tokio tasks.
pub trait Pricer: Send + Sync + 'static {
    fn price(&self, request: PricingRequest) -> BoxFuture<'_, ClientResult<PricingResult>>;
}
