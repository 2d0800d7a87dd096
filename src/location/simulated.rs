use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;

use crate::error::{SensorError, SensorErrorKind};
use crate::geo::{Coordinate, PositionSample, EARTH_RADIUS_METERS};

use super::sensor::{PositionSensor, SensorRequest};

/// Noisy fixes around a true location whose accuracy tightens on every
/// request, the way a GNSS receiver converges after a cold start.
pub struct SimulatedSensor {
    truth: Coordinate,
    accuracy: Mutex<f64>,
    floor_meters: f64,
    convergence: f64,
    fix_latency: Duration,
}

impl SimulatedSensor {
    pub fn new(truth: Coordinate, initial_accuracy_meters: f64) -> Self {
        Self {
            truth,
            accuracy: Mutex::new(initial_accuracy_meters.max(0.0)),
            floor_meters: 5.0,
            convergence: 0.45,
            fix_latency: Duration::from_millis(300),
        }
    }

    pub fn with_fix_latency(mut self, latency: Duration) -> Self {
        self.fix_latency = latency;
        self
    }

    /// Next reported accuracy: shrink towards the floor, with some jitter.
    fn next_accuracy(&self, high_accuracy: bool) -> f64 {
        let mut guard = match self.accuracy.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = *guard;
        let factor = if high_accuracy {
            self.convergence
        } else {
            // Network positioning barely improves.
            0.9
        };
        *guard = (current * factor).max(self.floor_meters);

        let jitter: f64 = rand::thread_rng().gen_range(0.9..1.1);
        (current * jitter).max(self.floor_meters)
    }

    /// Offsets the true location by a random vector inside the accuracy circle.
    fn scatter(&self, accuracy_meters: f64) -> (f64, f64) {
        let mut rng = rand::thread_rng();
        let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
        let offset = rng.gen_range(0.0..=accuracy_meters);

        let d_lat = (offset * bearing.cos() / EARTH_RADIUS_METERS).to_degrees();
        let lat_cos = self.truth.latitude().to_radians().cos().max(1e-6);
        let d_lon = (offset * bearing.sin() / (EARTH_RADIUS_METERS * lat_cos)).to_degrees();

        (
            (self.truth.latitude() + d_lat).clamp(-90.0, 90.0),
            wrap_longitude(self.truth.longitude() + d_lon),
        )
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    if longitude > 180.0 {
        longitude - 360.0
    } else if longitude < -180.0 {
        longitude + 360.0
    } else {
        longitude
    }
}

#[async_trait]
impl PositionSensor for SimulatedSensor {
    fn sensor_tag(&self) -> &'static str {
        "simulated"
    }

    async fn request_position(
        &self,
        request: SensorRequest,
    ) -> Result<PositionSample, SensorError> {
        let timeout = Duration::from_millis(request.timeout_ms);
        if self.fix_latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(SensorError::timeout(request.timeout_ms));
        }

        let accuracy = self.next_accuracy(request.high_accuracy);
        let (latitude, longitude) = self.scatter(accuracy);

        tokio::time::sleep(self.fix_latency).await;

        PositionSample::try_new(latitude, longitude, accuracy, Utc::now())
            .map_err(|err| SensorError::new(SensorErrorKind::PositionUnavailable, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::distance;

    fn request(timeout_ms: u64) -> SensorRequest {
        SensorRequest {
            high_accuracy: true,
            max_age_ms: 0,
            timeout_ms,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accuracy_converges_and_fix_stays_inside_circle() {
        let truth = Coordinate::try_new(40.7128, -74.0060).unwrap();
        let sensor = SimulatedSensor::new(truth, 300.0);

        let first = sensor.request_position(request(10_000)).await.unwrap();
        let mut last = first.clone();
        for _ in 0..4 {
            last = sensor.request_position(request(10_000)).await.unwrap();
        }

        assert!(last.accuracy_meters() < first.accuracy_meters());
        assert!(last.accuracy_meters() >= 5.0);
        // Scatter radius is bounded by the reported accuracy (plus rounding).
        assert!(distance(&truth, &last.coordinate()) <= last.accuracy_meters() + 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fix_times_out() {
        let truth = Coordinate::try_new(0.0, 0.0).unwrap();
        let sensor = SimulatedSensor::new(truth, 50.0).with_fix_latency(Duration::from_secs(2));

        let err = sensor.request_position(request(1_000)).await.unwrap_err();
        assert_eq!(err.kind, SensorErrorKind::Timeout);
    }
}
