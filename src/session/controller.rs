use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{info, warn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::LocationError;
use crate::geo::{AccuracyBand, PositionSample};
use crate::geofence::{
    geofences_for, nearest, nearest_within, Geofence, GeofenceEvaluator, GeofenceResult,
    OfficeDirectory,
};
use crate::location::{AccuracyPolicy, PositionAcquirer, PositionSensor};
use crate::settings::SettingsStore;

use super::events::GeoEvent;
use super::state::{CheckInAffordance, SessionState, SessionStatus};

const EVENT_CAPACITY: usize = 32;

/// Ties acquisition and geofence evaluation together for one host UI.
///
/// Cheap to clone; clones share state. A new `locate()` supersedes one that
/// is still running: the older call is cancelled and whatever it resolves is
/// never written to the session state.
#[derive(Clone)]
pub struct GeoSessionController {
    state: Arc<Mutex<SessionState>>,
    policy: Arc<RwLock<AccuracyPolicy>>,
    acquirer: PositionAcquirer,
    evaluator: Arc<dyn GeofenceEvaluator>,
    offices: Arc<dyn OfficeDirectory>,
    events: broadcast::Sender<GeoEvent>,
    settings: Option<Arc<SettingsStore>>,
}

impl GeoSessionController {
    pub fn new(
        sensor: Arc<dyn PositionSensor>,
        evaluator: Arc<dyn GeofenceEvaluator>,
        offices: Arc<dyn OfficeDirectory>,
        policy: AccuracyPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            policy: Arc::new(RwLock::new(policy)),
            acquirer: PositionAcquirer::new(sensor),
            evaluator,
            offices,
            events,
            settings: None,
        }
    }

    /// Policy setters also save to `store` from now on.
    pub fn with_settings(mut self, store: Arc<SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GeoEvent> {
        self.events.subscribe()
    }

    pub fn sensor_available(&self) -> bool {
        self.acquirer.is_available()
    }

    /// Acquires a fresh fix and evaluates it against the office directory.
    ///
    /// Returns the fix even when evaluation fails; that failure is recorded in
    /// the session state and published as [`GeoEvent::Failed`].
    pub async fn locate(&self) -> Result<PositionSample, LocationError> {
        let cancel = CancellationToken::new();
        let (generation, previous) = self.lock_state().begin_locate(cancel.clone());
        if let Some(previous) = previous {
            info!("Superseding in-flight locate request");
            previous.cancel();
        }
        self.emit(GeoEvent::StatusChanged {
            status: SessionStatus::Acquiring,
        });

        let policy = self.policy();
        let state = self.state.clone();
        let outcome = self
            .acquirer
            .acquire_with(&policy, &cancel, move |attempts| {
                let mut guard = lock(&state);
                if guard.generation == generation {
                    guard.attempts_used = attempts;
                }
            })
            .await;

        let sample = match outcome {
            Ok(sample) => sample,
            Err(err) => {
                if !self.commit(generation, |state| state.fail(err.clone())) {
                    return Err(LocationError::Superseded);
                }
                warn!("Location error: {}", err);
                self.emit(GeoEvent::Failed { error: err.clone() });
                self.emit(GeoEvent::StatusChanged {
                    status: SessionStatus::Failed,
                });
                return Err(err);
            }
        };

        let mut evaluation_id = 0;
        if !self.commit(generation, |state| {
            state.record_position(sample.clone());
            evaluation_id = state.begin_evaluation();
        }) {
            return Err(LocationError::Superseded);
        }
        info!(
            "Located user at {:.6}, {:.6} with accuracy: {:.1}m",
            sample.coordinate().latitude(),
            sample.coordinate().longitude(),
            sample.accuracy_meters()
        );
        self.emit(GeoEvent::PositionUpdated {
            sample: sample.clone(),
            band: sample.accuracy_band(),
        });
        self.emit(GeoEvent::StatusChanged {
            status: SessionStatus::Evaluating,
        });

        let evaluation = match self.offices.list_offices().await {
            Ok(offices) => {
                self.evaluator
                    .evaluate(&sample, &geofences_for(&offices))
                    .await
            }
            Err(err) => Err(err),
        };
        self.finish_evaluation(generation, evaluation_id, evaluation);

        Ok(sample)
    }

    /// Re-checks the last fix against `geofences` without touching the sensor.
    pub async fn evaluate_against(
        &self,
        geofences: &[Geofence],
    ) -> Result<Vec<GeofenceResult>, LocationError> {
        let (generation, evaluation_id, position, acquiring) = {
            let mut state = self.lock_state();
            let position = state.last_position.clone().ok_or(LocationError::NoPosition)?;
            let acquiring = state.status == SessionStatus::Acquiring;
            let evaluation_id = if acquiring {
                state.evaluation
            } else {
                state.status = SessionStatus::Evaluating;
                state.begin_evaluation()
            };
            (state.generation, evaluation_id, position, acquiring)
        };
        if !acquiring {
            self.emit(GeoEvent::StatusChanged {
                status: SessionStatus::Evaluating,
            });
        }

        let evaluation = self.evaluator.evaluate(&position, geofences).await;
        if acquiring {
            // A locate owns the status; only hand the answer back.
            return evaluation;
        }
        self.finish_evaluation(generation, evaluation_id, evaluation.clone());
        evaluation
    }

    /// Re-checks the last fix against the current office list.
    pub async fn refresh(&self) -> Result<Vec<GeofenceResult>, LocationError> {
        let offices = self.offices.list_offices().await?;
        self.evaluate_against(&geofences_for(&offices)).await
    }

    fn finish_evaluation(
        &self,
        generation: u64,
        evaluation_id: u64,
        evaluation: Result<Vec<GeofenceResult>, LocationError>,
    ) {
        match evaluation {
            Ok(results) => {
                if !self.commit_evaluation(generation, evaluation_id, |state| {
                    state.record_results(results.clone())
                }) {
                    return;
                }
                let affordance = self.check_in_affordance();
                let accuracy = self.current_accuracy().unwrap_or_default();
                if results.iter().any(|result| result.is_within) {
                    info!("User is within a geofence. Location accuracy: {:.1}m", accuracy);
                } else {
                    info!("User is outside all geofences. Location accuracy: {:.1}m", accuracy);
                }
                self.emit(GeoEvent::ResultsUpdated {
                    results,
                    affordance,
                });
                self.emit(GeoEvent::StatusChanged {
                    status: SessionStatus::Ready,
                });
            }
            Err(err) => {
                if !self.commit_evaluation(generation, evaluation_id, |state| {
                    state.fail(err.clone())
                }) {
                    return;
                }
                warn!("Error checking geofence status: {}", err);
                self.emit(GeoEvent::Failed { error: err });
                self.emit(GeoEvent::StatusChanged {
                    status: SessionStatus::Failed,
                });
            }
        }
    }

    pub fn can_check_in(&self) -> bool {
        self.check_in_affordance().is_ready()
    }

    pub fn check_in_affordance(&self) -> CheckInAffordance {
        let desired = self.policy().desired_accuracy_meters;
        self.lock_state().check_in_affordance(desired)
    }

    pub fn current_accuracy(&self) -> Option<f64> {
        self.lock_state()
            .last_position
            .as_ref()
            .map(|position| position.accuracy_meters())
    }

    pub fn current_accuracy_band(&self) -> Option<AccuracyBand> {
        self.current_accuracy().map(AccuracyBand::from_meters)
    }

    pub fn nearest_office_within(&self) -> Option<GeofenceResult> {
        nearest_within(&self.lock_state().last_results).cloned()
    }

    pub fn nearest_office(&self) -> Option<GeofenceResult> {
        nearest(&self.lock_state().last_results).cloned()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_state().status
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn policy(&self) -> AccuracyPolicy {
        match self.policy.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Takes effect from the next `locate()`; a running one keeps its snapshot.
    pub fn set_policy(&self, policy: AccuracyPolicy) {
        *self.write_policy() = policy.clone();
        self.save(|store| store.update_policy(policy));
    }

    pub fn set_desired_accuracy(&self, meters: f64) {
        self.write_policy().desired_accuracy_meters = meters;
        info!("Set desired accuracy to {} meters", meters);
        self.save(|store| store.set_desired_accuracy(meters));
    }

    pub fn set_high_accuracy(&self, enabled: bool) {
        let changed = {
            let mut policy = self.write_policy();
            let changed = policy.high_accuracy != enabled;
            policy.high_accuracy = enabled;
            changed
        };
        if changed {
            info!(
                "High accuracy mode {}",
                if enabled { "enabled" } else { "disabled" }
            );
            self.save(|store| store.set_high_accuracy(enabled));
        }
    }

    fn save<F>(&self, write: F)
    where
        F: FnOnce(&SettingsStore) -> anyhow::Result<()>,
    {
        if let Some(store) = &self.settings {
            if let Err(err) = write(store) {
                warn!("Failed to save location settings: {:#}", err);
            }
        }
    }

    fn commit<F>(&self, generation: u64, apply: F) -> bool
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.lock_state();
        if state.generation != generation {
            info!("Discarding stale result from locate #{}", generation);
            return false;
        }
        apply(&mut state);
        true
    }

    /// Like `commit`, but a newer evaluation of the same fix also wins.
    fn commit_evaluation<F>(&self, generation: u64, evaluation_id: u64, apply: F) -> bool
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.lock_state();
        if state.generation != generation || state.evaluation != evaluation_id {
            info!("Discarding stale evaluation #{}", evaluation_id);
            return false;
        }
        apply(&mut state);
        true
    }

    fn emit(&self, event: GeoEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    fn write_policy(&self) -> std::sync::RwLockWriteGuard<'_, AccuracyPolicy> {
        match self.policy.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
