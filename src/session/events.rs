use serde::Serialize;

use crate::error::LocationError;
use crate::geo::{AccuracyBand, PositionSample};
use crate::geofence::GeofenceResult;

use super::state::{CheckInAffordance, SessionStatus};

/// Change notifications pushed to the host UI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GeoEvent {
    StatusChanged {
        status: SessionStatus,
    },
    #[serde(rename_all = "camelCase")]
    PositionUpdated {
        sample: PositionSample,
        band: AccuracyBand,
    },
    ResultsUpdated {
        results: Vec<GeofenceResult>,
        affordance: CheckInAffordance,
    },
    Failed {
        error: LocationError,
    },
}

impl GeoEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GeoEvent::StatusChanged { .. } => "geo-status-changed",
            GeoEvent::PositionUpdated { .. } => "geo-position-updated",
            GeoEvent::ResultsUpdated { .. } => "geo-results-updated",
            GeoEvent::Failed { .. } => "geo-failed",
        }
    }
}
