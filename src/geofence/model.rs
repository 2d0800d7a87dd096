use serde::{Deserialize, Serialize};

use crate::error::LocationError;
use crate::geo::{distance, Coordinate, PositionSample};

pub type OfficeId = i64;

/// Office record as served by the office directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Office {
    pub id: OfficeId,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Geofence radius in meters.
    pub radius: f64,
}

impl Office {
    pub fn geofence(&self) -> Result<Geofence, LocationError> {
        let center = Coordinate::try_new(self.latitude, self.longitude)?;
        Geofence::new(self.id, center, self.radius).map(|fence| fence.named(self.name.clone()))
    }
}

/// Circular acceptance area around an office.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub office_id: OfficeId,
    pub office_name: Option<String>,
    pub center: Coordinate,
    pub radius_meters: f64,
}

impl Geofence {
    pub fn new(
        office_id: OfficeId,
        center: Coordinate,
        radius_meters: f64,
    ) -> Result<Self, LocationError> {
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(LocationError::InvalidCoordinate(format!(
                "office {office_id} has non-positive geofence radius {radius_meters}"
            )));
        }
        Ok(Self {
            office_id,
            office_name: None,
            center,
            radius_meters,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.office_name = Some(name.into());
        self
    }

    /// The boundary counts as inside.
    pub fn covers(&self, distance_meters: f64) -> bool {
        distance_meters <= self.radius_meters
    }

    pub fn check(&self, position: &PositionSample) -> GeofenceResult {
        let distance_meters = distance(&position.coordinate(), &self.center);
        GeofenceResult {
            office_id: self.office_id,
            office_name: self.office_name.clone(),
            distance_meters,
            is_within: self.covers(distance_meters),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceResult {
    pub office_id: OfficeId,
    pub office_name: Option<String>,
    pub distance_meters: f64,
    pub is_within: bool,
}
