use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::error::{LocationError, SensorError, SensorErrorKind};
use crate::geo::PositionSample;

use super::policy::AccuracyPolicy;
use super::sensor::{PositionSensor, SensorRequest};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Fresh fixes only.
const MAX_FIX_AGE_MS: u64 = 0;

/// Turns single-shot sensor requests into one acceptable fix.
///
/// Each acquisition is a bounded loop: request a fix, stop when it meets the
/// policy's desired accuracy, otherwise wait and ask again with a longer
/// timeout until `max_attempts` sensor calls have been made. The last fix
/// obtained is returned when the budget runs out.
#[derive(Clone)]
pub struct PositionAcquirer {
    sensor: Arc<dyn PositionSensor>,
}

impl PositionAcquirer {
    pub fn new(sensor: Arc<dyn PositionSensor>) -> Self {
        Self { sensor }
    }

    pub fn sensor_tag(&self) -> &'static str {
        self.sensor.sensor_tag()
    }

    pub fn is_available(&self) -> bool {
        self.sensor.is_available()
    }

    pub async fn acquire(&self, policy: &AccuracyPolicy) -> Result<PositionSample, LocationError> {
        self.acquire_with(policy, &CancellationToken::new(), |_| {})
            .await
    }

    /// Runs one acquisition.
    ///
    /// `on_attempt` receives the number of sensor calls made so far each time
    /// a call is issued, and `0` once the acquisition reaches a terminal
    /// outcome. Cancelling `cancel` ends the loop at its next suspension
    /// point with [`LocationError::Superseded`].
    pub async fn acquire_with<F>(
        &self,
        policy: &AccuracyPolicy,
        cancel: &CancellationToken,
        mut on_attempt: F,
    ) -> Result<PositionSample, LocationError>
    where
        F: FnMut(u32) + Send,
    {
        let result = self.run_attempts(policy, cancel, &mut on_attempt).await;
        on_attempt(0);
        result
    }

    async fn run_attempts<F>(
        &self,
        policy: &AccuracyPolicy,
        cancel: &CancellationToken,
        on_attempt: &mut F,
    ) -> Result<PositionSample, LocationError>
    where
        F: FnMut(u32) + Send,
    {
        if !self.sensor.is_available() {
            log_warn!("{} sensor has no location capability", self.sensor.sensor_tag());
            return Err(LocationError::SensorUnsupported);
        }

        let max_attempts = policy.effective_max_attempts();
        let mut last_sample: Option<PositionSample> = None;
        let mut attempts_used: u32 = 0;

        while attempts_used < max_attempts {
            if attempts_used > 0 {
                sleep_or_cancel(policy.retry_delay(), cancel).await?;
            }

            let request = SensorRequest {
                high_accuracy: policy.high_accuracy,
                max_age_ms: MAX_FIX_AGE_MS,
                timeout_ms: policy.timeout_for_attempt(attempts_used),
            };
            attempts_used += 1;
            on_attempt(attempts_used);

            log_info!(
                "Attempt {}/{}: requesting fresh position with options {:?}",
                attempts_used,
                max_attempts,
                request
            );

            let outcome = self.request_once(request, cancel).await?;
            let has_budget = attempts_used < max_attempts;

            match outcome {
                Ok(sample) => {
                    let accuracy = sample.accuracy_meters();
                    log_info!("Got position with accuracy: {:.1}m", accuracy);

                    if policy.accepts(accuracy) {
                        log_info!("Achieved desired accuracy: {:.1}m", accuracy);
                        return Ok(sample);
                    }

                    if !has_budget {
                        log_info!(
                            "Reached maximum accuracy attempts. Using best available: {:.1}m",
                            accuracy
                        );
                        return Ok(sample);
                    }

                    log_debug!(
                        "Accuracy {:.1}m above target {:.1}m; retrying with timeout {}ms",
                        accuracy,
                        policy.desired_accuracy_meters,
                        policy.timeout_for_attempt(attempts_used)
                    );
                    last_sample = Some(sample);
                }
                Err(err) if err.kind == SensorErrorKind::Timeout => {
                    if has_budget {
                        log_info!(
                            "Timeout error. Attempt {}: increasing timeout to {}ms",
                            attempts_used,
                            policy.timeout_for_attempt(attempts_used)
                        );
                        continue;
                    }

                    if let Some(sample) = last_sample.take() {
                        log_warn!(
                            "Final attempt timed out; using earlier fix with accuracy {:.1}m",
                            sample.accuracy_meters()
                        );
                        return Ok(sample);
                    }

                    log_warn!("Location request timed out after {} attempt(s)", attempts_used);
                    return Err(LocationError::from_sensor(
                        err,
                        attempts_used,
                        request.timeout_ms,
                    ));
                }
                Err(err) => {
                    log_warn!("Geolocation error: {}", err);
                    return Err(LocationError::from_sensor(
                        err,
                        attempts_used,
                        request.timeout_ms,
                    ));
                }
            }
        }

        // Every branch returns on the last attempt.
        last_sample.ok_or(LocationError::PositionUnavailable(
            "no fix obtained".to_string(),
        ))
    }

    /// One sensor call, bounded by the request timeout and the cancel token.
    ///
    /// The outer `Err` means the acquisition was superseded; the inner result
    /// is the sensor's own answer.
    async fn request_once(
        &self,
        request: SensorRequest,
        cancel: &CancellationToken,
    ) -> Result<Result<PositionSample, SensorError>, LocationError> {
        let timeout = Duration::from_millis(request.timeout_ms);

        tokio::select! {
            _ = cancel.cancelled() => {
                log_debug!("acquisition cancelled while waiting for the sensor");
                Err(LocationError::Superseded)
            }
            outcome = tokio::time::timeout(timeout, self.sensor.request_position(request)) => {
                Ok(match outcome {
                    Ok(answer) => answer,
                    Err(_) => Err(SensorError::timeout(request.timeout_ms)),
                })
            }
        }
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), LocationError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(LocationError::Superseded),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::replay::{ReplaySensor, ReplayStep};
    use assert_matches::assert_matches;
    use std::sync::Mutex;

    fn acquirer(sensor: &Arc<ReplaySensor>) -> PositionAcquirer {
        PositionAcquirer::new(sensor.clone())
    }

    fn timeouts(sensor: &ReplaySensor) -> Vec<u64> {
        sensor.requests().iter().map(|r| r.timeout_ms).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn stops_as_soon_as_accuracy_is_met() {
        let sensor = Arc::new(ReplaySensor::with_accuracies(
            40.0,
            -74.0,
            &[300.0, 150.0, 40.0, 10.0],
        ));
        let seen = Mutex::new(Vec::new());

        let sample = acquirer(&sensor)
            .acquire_with(&AccuracyPolicy::default(), &CancellationToken::new(), |n| {
                seen.lock().unwrap().push(n)
            })
            .await
            .unwrap();

        assert_eq!(sample.accuracy_meters(), 40.0);
        assert_eq!(sensor.calls(), 3);
        assert_eq!(sensor.remaining(), 1);
        // Counter ends back at zero.
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_best_effort_when_attempts_run_out() {
        let sensor = Arc::new(ReplaySensor::with_accuracies(
            40.0,
            -74.0,
            &[300.0, 200.0, 150.0, 10.0],
        ));

        let sample = acquirer(&sensor)
            .acquire(&AccuracyPolicy::default())
            .await
            .unwrap();

        assert_eq!(sample.accuracy_meters(), 150.0);
        assert_eq!(sensor.calls(), 3);
        assert_eq!(timeouts(&sensor), vec![10_000, 15_000, 20_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_timeouts_with_growing_timeout() {
        let sensor = Arc::new(ReplaySensor::new([
            ReplayStep::error(SensorErrorKind::Timeout),
            ReplayStep::error(SensorErrorKind::Timeout),
            ReplayStep::fix(40.0, -74.0, 50.0),
        ]));
        let started = tokio::time::Instant::now();

        let sample = acquirer(&sensor)
            .acquire(&AccuracyPolicy::default())
            .await
            .unwrap();

        assert_eq!(sample.accuracy_meters(), 50.0);
        assert_eq!(timeouts(&sensor), vec![10_000, 15_000, 20_000]);
        // Two retry delays of 500ms each.
        assert!(started.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_is_not_retried() {
        let sensor = Arc::new(ReplaySensor::new([
            ReplayStep::error(SensorErrorKind::PermissionDenied),
            ReplayStep::fix(40.0, -74.0, 5.0),
        ]));

        let err = acquirer(&sensor)
            .acquire(&AccuracyPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(err, LocationError::PermissionDenied);
        assert_eq!(sensor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_and_unknown_fail_immediately() {
        let sensor = Arc::new(ReplaySensor::new([
            ReplayStep::error(SensorErrorKind::PositionUnavailable),
            ReplayStep::error(SensorErrorKind::Unknown(42)),
        ]));
        let acquirer = acquirer(&sensor);

        assert_matches!(
            acquirer.acquire(&AccuracyPolicy::default()).await,
            Err(LocationError::PositionUnavailable(_))
        );
        assert_matches!(
            acquirer.acquire(&AccuracyPolicy::default()).await,
            Err(LocationError::Unknown { code: 42, .. })
        );
        assert_eq!(sensor.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fix_with_invalid_accuracy_is_position_unavailable() {
        let sensor = Arc::new(ReplaySensor::new([
            ReplayStep::fix(40.0, -74.0, -5.0),
            ReplayStep::fix(40.0, -74.0, f64::NAN),
            ReplayStep::fix(40.0, -74.0, 10.0),
        ]));
        let acquirer = acquirer(&sensor);

        assert_matches!(
            acquirer.acquire(&AccuracyPolicy::default()).await,
            Err(LocationError::PositionUnavailable(_))
        );
        assert_matches!(
            acquirer.acquire(&AccuracyPolicy::default()).await,
            Err(LocationError::PositionUnavailable(_))
        );
        assert_eq!(sensor.calls(), 2);

        let sample = acquirer.acquire(&AccuracyPolicy::default()).await.unwrap();
        assert!(sample.accuracy_meters() >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_timeouts_fail_with_timeout() {
        let sensor = Arc::new(ReplaySensor::new([
            ReplayStep::error(SensorErrorKind::Timeout),
            ReplayStep::error(SensorErrorKind::Timeout),
            ReplayStep::error(SensorErrorKind::Timeout),
        ]));

        let err = acquirer(&sensor)
            .acquire(&AccuracyPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LocationError::Timeout {
                attempts: 3,
                timeout_ms: 20_000
            }
        );
        assert_eq!(sensor.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn final_timeout_falls_back_to_earlier_fix() {
        let sensor = Arc::new(ReplaySensor::new([
            ReplayStep::fix(40.0, -74.0, 300.0),
            ReplayStep::fix(40.0, -74.0, 180.0),
            ReplayStep::error(SensorErrorKind::Timeout),
        ]));

        let sample = acquirer(&sensor)
            .acquire(&AccuracyPolicy::default())
            .await
            .unwrap();

        assert_eq!(sample.accuracy_meters(), 180.0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sensor_is_bounded_by_request_timeout() {
        let sensor = Arc::new(ReplaySensor::new([
            ReplayStep::Hang,
            ReplayStep::fix(40.0, -74.0, 20.0),
        ]));
        let started = tokio::time::Instant::now();

        let sample = acquirer(&sensor)
            .acquire(&AccuracyPolicy::default())
            .await
            .unwrap();

        assert_eq!(sample.accuracy_meters(), 20.0);
        assert!(started.elapsed() >= Duration::from_millis(10_500));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_capability_fails_without_calling_sensor() {
        let sensor = Arc::new(ReplaySensor::unavailable());

        let err = acquirer(&sensor)
            .acquire(&AccuracyPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(err, LocationError::SensorUnsupported);
        assert_eq!(sensor.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_high_accuracy_flag_and_fresh_fix_requirement() {
        let sensor = Arc::new(ReplaySensor::with_accuracies(40.0, -74.0, &[10.0]));
        let policy = AccuracyPolicy {
            high_accuracy: false,
            ..AccuracyPolicy::default()
        };

        acquirer(&sensor).acquire(&policy).await.unwrap();

        let requests = sensor.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].high_accuracy);
        assert_eq!(requests[0].max_age_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_supersedes_in_flight_request() {
        let sensor = Arc::new(ReplaySensor::new([
            ReplayStep::fix(40.0, -74.0, 10.0).delayed(Duration::from_secs(5))
        ]));
        let acquirer = acquirer(&sensor);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = acquirer
            .acquire_with(&AccuracyPolicy::default(), &cancel, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err, LocationError::Superseded);
    }
}
