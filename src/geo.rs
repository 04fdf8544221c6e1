// src/geo.rs

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::model::GeoPoint;

pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("geolocation is not supported in this environment")]
    Unsupported,

    #[error("position acquisition failed: {0}")]
    Unavailable(String),
}

/// One-shot position source. Acquisition happens before event construction
/// and is never allowed to fail a submission; see `acquire_location`.
#[async_trait]
pub trait GeolocationSource: Send + Sync {
    async fn current_position(&self) -> Result<GeoPoint, GeoError>;
}

/// Always yields the same coordinates. Used when the operator supplies a
/// position explicitly.
pub struct FixedPosition(pub GeoPoint);

#[async_trait]
impl GeolocationSource for FixedPosition {
    async fn current_position(&self) -> Result<GeoPoint, GeoError> {
        Ok(self.0)
    }
}

/// The no-geolocation environment.
pub struct Unsupported;

#[async_trait]
impl GeolocationSource for Unsupported {
    async fn current_position(&self) -> Result<GeoPoint, GeoError> {
        Err(GeoError::Unsupported)
    }
}

/// Awaits one position with a timeout. Denied, unsupported, failed, or
/// slow sources all degrade to `None`; the submission proceeds without a
/// location.
pub async fn acquire_location(
    source: &dyn GeolocationSource,
    timeout: Duration,
) -> Option<GeoPoint> {
    match tokio::time::timeout(timeout, source.current_position()).await {
        Ok(Ok(position)) => Some(position),
        Ok(Err(e)) => {
            warn!("Error getting location: {}. Proceeding without one.", e);
            None
        }
        Err(_) => {
            warn!(
                "Location acquisition timed out after {:?}. Proceeding without one.",
                timeout
            );
            None
        }
    }
}
