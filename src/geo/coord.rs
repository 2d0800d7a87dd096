use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::LocationError;

/// A validated WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(LocationError::InvalidCoordinate(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::InvalidCoordinate(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// One fix reported by the position sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    coordinate: Coordinate,
    /// Radius of uncertainty in meters, never negative.
    accuracy_meters: f64,
    timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn try_new(
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, LocationError> {
        let coordinate = Coordinate::try_new(latitude, longitude)?;
        if !accuracy_meters.is_finite() || accuracy_meters < 0.0 {
            return Err(LocationError::PositionUnavailable(format!(
                "sensor reported invalid accuracy {accuracy_meters}"
            )));
        }
        Ok(Self {
            coordinate,
            accuracy_meters,
            timestamp,
        })
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn accuracy_meters(&self) -> f64 {
        self.accuracy_meters
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn accuracy_band(&self) -> AccuracyBand {
        AccuracyBand::from_meters(self.accuracy_meters)
    }
}

/// Coarse precision bucket shown on the accuracy badge.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AccuracyBand {
    High,
    Medium,
    Low,
}

impl AccuracyBand {
    const HIGH_MAX_METERS: f64 = 20.0;
    const MEDIUM_MAX_METERS: f64 = 50.0;

    pub fn from_meters(accuracy_meters: f64) -> Self {
        if accuracy_meters > Self::MEDIUM_MAX_METERS {
            AccuracyBand::Low
        } else if accuracy_meters > Self::HIGH_MAX_METERS {
            AccuracyBand::Medium
        } else {
            AccuracyBand::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccuracyBand::High => "high",
            AccuracyBand::Medium => "medium",
            AccuracyBand::Low => "low",
        }
    }
}
