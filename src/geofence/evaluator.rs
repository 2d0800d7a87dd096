use async_trait::async_trait;

use crate::error::LocationError;
use crate::geo::PositionSample;

use super::model::{Geofence, GeofenceResult};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Decides which office geofences contain a fix.
///
/// Implementations return exactly one result per input geofence, in input
/// order, so local and remote evaluation are interchangeable.
#[async_trait]
pub trait GeofenceEvaluator: Send + Sync {
    fn evaluator_tag(&self) -> &'static str;

    async fn evaluate(
        &self,
        position: &PositionSample,
        geofences: &[Geofence],
    ) -> Result<Vec<GeofenceResult>, LocationError>;
}

/// In-process circle math.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEvaluator;

#[async_trait]
impl GeofenceEvaluator for LocalEvaluator {
    fn evaluator_tag(&self) -> &'static str {
        "local"
    }

    async fn evaluate(
        &self,
        position: &PositionSample,
        geofences: &[Geofence],
    ) -> Result<Vec<GeofenceResult>, LocationError> {
        Ok(evaluate_geofences(position, geofences))
    }
}

pub fn evaluate_geofences(position: &PositionSample, geofences: &[Geofence]) -> Vec<GeofenceResult> {
    geofences
        .iter()
        .map(|fence| {
            let result = fence.check(position);
            log_debug!(
                "Location check: ({:.6}, {:.6}) to office {} - distance {:.1}m, within: {}",
                position.coordinate().latitude(),
                position.coordinate().longitude(),
                fence.office_id,
                result.distance_meters,
                result.is_within
            );
            result
        })
        .collect()
}

/// Closest result among those inside their geofence; ties keep the first.
pub fn nearest_within(results: &[GeofenceResult]) -> Option<&GeofenceResult> {
    nearest_matching(results.iter().filter(|result| result.is_within))
}

/// Closest result regardless of membership; ties keep the first.
pub fn nearest(results: &[GeofenceResult]) -> Option<&GeofenceResult> {
    nearest_matching(results.iter())
}

fn nearest_matching<'a>(
    candidates: impl Iterator<Item = &'a GeofenceResult>,
) -> Option<&'a GeofenceResult> {
    let mut best: Option<&'a GeofenceResult> = None;
    for current in candidates {
        if best.map_or(true, |b| current.distance_meters < b.distance_meters) {
            best = Some(current);
        }
    }
    best
}
