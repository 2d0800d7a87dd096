use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LocationError;
use crate::geo::PositionSample;

use super::evaluator::GeofenceEvaluator;
use super::http::BackendClient;
use super::model::{Geofence, GeofenceResult, OfficeId};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const CHECK_LOCATION_PATH: &str = "attendance/check-location";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationCheckRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub office_id: Option<OfficeId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeofenceStatus {
    pub office_id: OfficeId,
    #[serde(default)]
    pub office_name: Option<String>,
    pub distance: f64,
    pub is_within_geofence: bool,
}

/// Delegates membership to the backend's check-location endpoint.
pub struct RemoteEvaluator {
    backend: BackendClient,
}

impl RemoteEvaluator {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl GeofenceEvaluator for RemoteEvaluator {
    fn evaluator_tag(&self) -> &'static str {
        "remote"
    }

    async fn evaluate(
        &self,
        position: &PositionSample,
        geofences: &[Geofence],
    ) -> Result<Vec<GeofenceResult>, LocationError> {
        if geofences.is_empty() {
            return Ok(Vec::new());
        }

        let body = check_request(position, geofences);
        let statuses: Vec<GeofenceStatus> = self
            .backend
            .post_json(CHECK_LOCATION_PATH, &body)
            .await
            .map_err(LocationError::RemoteEvaluationFailed)?;

        let results = align_results(geofences, statuses)?;
        log_info!(
            "Backend checked {} office(s); within any: {}",
            results.len(),
            results.iter().any(|r| r.is_within)
        );
        Ok(results)
    }
}

/// A single geofence is checked by id so the backend skips the others.
fn check_request(position: &PositionSample, geofences: &[Geofence]) -> LocationCheckRequest {
    let office_id = match geofences {
        [only] => Some(only.office_id),
        _ => None,
    };

    LocationCheckRequest {
        latitude: position.coordinate().latitude(),
        longitude: position.coordinate().longitude(),
        accuracy: Some(position.accuracy_meters()),
        office_id,
    }
}

/// Reorders backend statuses to match `geofences` one-to-one.
///
/// Statuses for offices the caller did not ask about are dropped; a missing
/// status is an error because the caller relies on one result per geofence.
pub fn align_results(
    geofences: &[Geofence],
    statuses: Vec<GeofenceStatus>,
) -> Result<Vec<GeofenceResult>, LocationError> {
    geofences
        .iter()
        .map(|fence| {
            let status = statuses
                .iter()
                .find(|status| status.office_id == fence.office_id)
                .ok_or_else(|| {
                    LocationError::RemoteEvaluationFailed(format!(
                        "backend returned no status for office {}",
                        fence.office_id
                    ))
                })?;

            if !status.distance.is_finite() || status.distance < 0.0 {
                return Err(LocationError::RemoteEvaluationFailed(format!(
                    "backend returned invalid distance {} for office {}",
                    status.distance, fence.office_id
                )));
            }

            let locally_within = fence.covers(status.distance);
            if locally_within != status.is_within_geofence {
                log_warn!(
                    "Backend membership for office {} ({}) disagrees with local radius {:.1}m at {:.1}m",
                    fence.office_id,
                    status.is_within_geofence,
                    fence.radius_meters,
                    status.distance
                );
            }

            Ok(GeofenceResult {
                office_id: fence.office_id,
                office_name: status.office_name.clone().or_else(|| fence.office_name.clone()),
                distance_meters: status.distance,
                is_within: status.is_within_geofence,
            })
        })
        .collect()
}
