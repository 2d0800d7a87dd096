use async_trait::async_trait;
use serde::Serialize;

use crate::error::SensorError;
use crate::geo::PositionSample;

/// Options passed with every single-shot position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRequest {
    pub high_accuracy: bool,
    /// Oldest cached fix the sensor may return; `0` forces a fresh one.
    pub max_age_ms: u64,
    pub timeout_ms: u64,
}

/// Platform location primitive: one request, one answer.
#[async_trait]
pub trait PositionSensor: Send + Sync {
    fn sensor_tag(&self) -> &'static str;

    /// `false` when the device has no location capability at all.
    fn is_available(&self) -> bool {
        true
    }

    async fn request_position(&self, request: SensorRequest)
        -> Result<PositionSample, SensorError>;
}
