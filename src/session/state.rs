use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::LocationError;
use crate::geo::PositionSample;
use crate::geofence::{nearest_within, GeofenceResult, OfficeId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Acquiring,
    Evaluating,
    Ready,
    Failed,
}

/// What the check-in button should look like right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CheckInAffordance {
    NoFix,
    OutsideGeofence,
    #[serde(rename_all = "camelCase")]
    AccuracyInsufficient {
        accuracy_meters: f64,
        required_meters: f64,
    },
    #[serde(rename_all = "camelCase")]
    Ready {
        office_id: OfficeId,
        accuracy_meters: f64,
    },
}

impl CheckInAffordance {
    pub fn is_ready(&self) -> bool {
        matches!(self, CheckInAffordance::Ready { .. })
    }

    /// Tooltip text for the check-in button.
    pub fn hint(&self) -> String {
        match self {
            CheckInAffordance::NoFix => "Locate yourself before checking in".to_string(),
            CheckInAffordance::OutsideGeofence => {
                "You must be within an office geofence to check in".to_string()
            }
            CheckInAffordance::AccuracyInsufficient {
                accuracy_meters,
                required_meters,
            } => format!(
                "Location accuracy ({accuracy_meters:.1}m) is not sufficient. Need {required_meters}m or better. Try clicking the locate button again."
            ),
            CheckInAffordance::Ready {
                accuracy_meters, ..
            } => format!("Check in at this location (Accuracy: {accuracy_meters:.1}m)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: SessionStatus,
    pub last_position: Option<PositionSample>,
    pub last_results: Vec<GeofenceResult>,
    pub attempts_used: u32,
    pub last_error: Option<LocationError>,
    /// Bumped by every locate; commits carrying an older value are dropped.
    #[serde(skip)]
    pub generation: u64,
    /// Bumped by every evaluation; only the newest one may store results.
    #[serde(skip)]
    pub evaluation: u64,
    #[serde(skip)]
    pub in_flight: Option<CancellationToken>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new locate and hands back the token of the one it replaces.
    pub fn begin_locate(&mut self, cancel: CancellationToken) -> (u64, Option<CancellationToken>) {
        self.generation = self.generation.wrapping_add(1);
        self.status = SessionStatus::Acquiring;
        self.attempts_used = 0;
        self.last_error = None;
        let previous = self.in_flight.replace(cancel);
        (self.generation, previous)
    }

    /// Results computed for the previous fix no longer apply and are dropped.
    pub fn record_position(&mut self, sample: PositionSample) {
        self.status = SessionStatus::Evaluating;
        self.last_position = Some(sample);
        self.last_results.clear();
        self.attempts_used = 0;
        self.in_flight = None;
    }

    pub fn begin_evaluation(&mut self) -> u64 {
        self.evaluation = self.evaluation.wrapping_add(1);
        self.evaluation
    }

    pub fn record_results(&mut self, results: Vec<GeofenceResult>) {
        self.status = SessionStatus::Ready;
        self.last_results = results;
        self.last_error = None;
    }

    /// Terminal failure; position and results from earlier locates stay.
    pub fn fail(&mut self, error: LocationError) {
        self.status = SessionStatus::Failed;
        self.last_error = Some(error);
        self.attempts_used = 0;
        self.in_flight = None;
    }

    pub fn within_any(&self) -> bool {
        self.last_results.iter().any(|result| result.is_within)
    }

    pub fn check_in_affordance(&self, desired_accuracy_meters: f64) -> CheckInAffordance {
        let Some(position) = &self.last_position else {
            return CheckInAffordance::NoFix;
        };

        let Some(nearest) = nearest_within(&self.last_results) else {
            return CheckInAffordance::OutsideGeofence;
        };

        if position.accuracy_meters() > desired_accuracy_meters {
            return CheckInAffordance::AccuracyInsufficient {
                accuracy_meters: position.accuracy_meters(),
                required_meters: desired_accuracy_meters,
            };
        }

        CheckInAffordance::Ready {
            office_id: nearest.office_id,
            accuracy_meters: position.accuracy_meters(),
        }
    }
}
