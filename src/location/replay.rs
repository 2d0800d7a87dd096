//! Sensor that answers from a scripted trace.
//!
//! Traces are JSON arrays of steps, for example:
//!
//! ```json
//! [
//!   { "kind": "error", "code": 3 },
//!   { "kind": "fix", "latitude": 40.7128, "longitude": -74.006, "accuracy": 35.0, "delayMs": 800 }
//! ]
//! ```
//!
//! Every request is recorded so callers can inspect the options the
//! acquirer used.

use std::{
    collections::VecDeque,
    fs,
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{SensorError, SensorErrorKind};
use crate::geo::PositionSample;

use super::sensor::{PositionSensor, SensorRequest};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReplayStep {
    #[serde(rename_all = "camelCase")]
    Fix {
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        #[serde(default)]
        delay_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        code: u16,
        #[serde(default)]
        message: String,
        #[serde(default)]
        delay_ms: u64,
    },
    /// The sensor never answers; only the caller's timeout ends the request.
    Hang,
}

impl ReplayStep {
    pub fn fix(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        ReplayStep::Fix {
            latitude,
            longitude,
            accuracy,
            delay_ms: 0,
        }
    }

    pub fn error(kind: SensorErrorKind) -> Self {
        ReplayStep::Error {
            code: kind.code(),
            message: String::new(),
            delay_ms: 0,
        }
    }

    pub fn delayed(self, delay: Duration) -> Self {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            ReplayStep::Fix {
                latitude,
                longitude,
                accuracy,
                ..
            } => ReplayStep::Fix {
                latitude,
                longitude,
                accuracy,
                delay_ms: millis,
            },
            ReplayStep::Error { code, message, .. } => ReplayStep::Error {
                code,
                message,
                delay_ms: millis,
            },
            ReplayStep::Hang => ReplayStep::Hang,
        }
    }
}

pub struct ReplaySensor {
    steps: Mutex<VecDeque<ReplayStep>>,
    requests: Mutex<Vec<SensorRequest>>,
    available: bool,
}

impl ReplaySensor {
    pub fn new(steps: impl IntoIterator<Item = ReplayStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            available: true,
        }
    }

    /// Fixes at one spot whose accuracy follows `accuracies`.
    pub fn with_accuracies(latitude: f64, longitude: f64, accuracies: &[f64]) -> Self {
        Self::new(
            accuracies
                .iter()
                .map(|accuracy| ReplayStep::fix(latitude, longitude, *accuracy)),
        )
    }

    /// A device without any location capability.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read sensor trace from {}", path.display()))?;
        let steps: Vec<ReplayStep> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse sensor trace {}", path.display()))?;
        Ok(Self::new(steps))
    }

    pub fn push(&self, step: ReplayStep) {
        lock(&self.steps).push_back(step);
    }

    pub fn requests(&self) -> Vec<SensorRequest> {
        lock(&self.requests).clone()
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.steps).len()
    }
}

#[async_trait]
impl PositionSensor for ReplaySensor {
    fn sensor_tag(&self) -> &'static str {
        "replay"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn request_position(
        &self,
        request: SensorRequest,
    ) -> Result<PositionSample, SensorError> {
        lock(&self.requests).push(request);
        let step = lock(&self.steps).pop_front();

        match step {
            Some(ReplayStep::Fix {
                latitude,
                longitude,
                accuracy,
                delay_ms,
            }) => {
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                PositionSample::try_new(latitude, longitude, accuracy, Utc::now()).map_err(|err| {
                    SensorError::new(SensorErrorKind::PositionUnavailable, err.to_string())
                })
            }
            Some(ReplayStep::Error {
                code,
                message,
                delay_ms,
            }) => {
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(SensorError::from_code(code, message))
            }
            Some(ReplayStep::Hang) => std::future::pending().await,
            None => Err(SensorError::new(
                SensorErrorKind::PositionUnavailable,
                "replay trace exhausted",
            )),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
