use std::sync::Arc;

use assert_matches::assert_matches;
use tokio::sync::broadcast::error::TryRecvError;

use geocheck_lib::geofence::{LocalEvaluator, StaticOfficeDirectory};
use geocheck_lib::location::{ReplaySensor, ReplayStep};
use geocheck_lib::{
    AccuracyBand, AccuracyPolicy, CheckInAffordance, GeoEvent, GeoSessionController,
    LocationError, Office, SensorErrorKind, SessionStatus,
};

const HQ_LAT: f64 = 40.7128;
const HQ_LON: f64 = -74.0060;

fn offices() -> Vec<Office> {
    vec![
        Office {
            id: 1,
            name: "Headquarters".into(),
            address: Some("1 Main St".into()),
            latitude: HQ_LAT,
            longitude: HQ_LON,
            radius: 100.0,
        },
        Office {
            id: 2,
            name: "Uptown".into(),
            address: None,
            latitude: 40.7831,
            longitude: -73.9712,
            radius: 150.0,
        },
    ]
}

fn controller(sensor: ReplaySensor, policy: AccuracyPolicy) -> GeoSessionController {
    GeoSessionController::new(
        Arc::new(sensor),
        Arc::new(LocalEvaluator),
        Arc::new(StaticOfficeDirectory::new(offices())),
        policy,
    )
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<GeoEvent>) -> Vec<GeoEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
    events
}

#[tokio::test(start_paused = true)]
async fn converging_fix_inside_office_allows_check_in() {
    let sensor = ReplaySensor::with_accuracies(HQ_LAT, HQ_LON, &[300.0, 150.0, 40.0]);
    let controller = controller(sensor, AccuracyPolicy::default());
    let mut rx = controller.subscribe();

    let sample = controller.locate().await.unwrap();
    assert_eq!(sample.accuracy_meters(), 40.0);
    assert_eq!(controller.status(), SessionStatus::Ready);
    assert_eq!(controller.current_accuracy_band(), Some(AccuracyBand::Medium));
    assert!(controller.can_check_in());
    assert_matches!(
        controller.check_in_affordance(),
        CheckInAffordance::Ready { office_id: 1, .. }
    );

    let nearest = controller.nearest_office_within().unwrap();
    assert_eq!(nearest.office_id, 1);
    assert!(nearest.distance_meters < 1.0);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.last_results.len(), 2);
    assert!(!snapshot.last_results[1].is_within);
    assert!(snapshot.last_error.is_none());

    let names: Vec<_> = drain(&mut rx).iter().map(GeoEvent::name).collect();
    assert_eq!(
        names,
        vec![
            "geo-status-changed",
            "geo-position-updated",
            "geo-status-changed",
            "geo-results-updated",
            "geo-status-changed",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn fix_far_from_every_office_blocks_check_in() {
    // Roughly 1.1 km south of headquarters.
    let sensor = ReplaySensor::with_accuracies(HQ_LAT - 0.01, HQ_LON, &[15.0]);
    let controller = controller(sensor, AccuracyPolicy::default());

    controller.locate().await.unwrap();

    assert!(!controller.can_check_in());
    assert_eq!(
        controller.check_in_affordance(),
        CheckInAffordance::OutsideGeofence
    );
    assert!(controller.nearest_office_within().is_none());

    let nearest = controller.nearest_office().unwrap();
    assert_eq!(nearest.office_id, 1);
    assert!(nearest.distance_meters > 1_000.0);
}

#[tokio::test(start_paused = true)]
async fn coarse_fix_inside_office_asks_for_better_accuracy() {
    let sensor = ReplaySensor::with_accuracies(HQ_LAT, HQ_LON, &[300.0, 250.0, 180.0]);
    let controller = controller(sensor, AccuracyPolicy::default());

    let sample = controller.locate().await.unwrap();
    assert_eq!(sample.accuracy_meters(), 180.0);

    let affordance = controller.check_in_affordance();
    assert_matches!(
        affordance,
        CheckInAffordance::AccuracyInsufficient { required_meters, .. } if required_meters == 100.0
    );
    assert!(affordance.hint().contains("Need 100m or better"));

    // Relaxing the threshold re-grades the existing fix.
    controller.set_desired_accuracy(200.0);
    assert!(controller.can_check_in());
}

#[tokio::test(start_paused = true)]
async fn denied_permission_fails_without_retry() {
    let controller = controller(
        ReplaySensor::new(vec![ReplayStep::error(SensorErrorKind::PermissionDenied)]),
        AccuracyPolicy::default(),
    );
    let mut rx = controller.subscribe();

    let err = controller.locate().await.unwrap_err();
    assert_eq!(err, LocationError::PermissionDenied);
    assert_eq!(controller.status(), SessionStatus::Failed);
    assert_eq!(controller.check_in_affordance(), CheckInAffordance::NoFix);

    let events = drain(&mut rx);
    assert_matches!(
        events.as_slice(),
        [
            GeoEvent::StatusChanged { status: SessionStatus::Acquiring },
            GeoEvent::Failed { error: LocationError::PermissionDenied },
            GeoEvent::StatusChanged { status: SessionStatus::Failed },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn relocate_after_moving_updates_membership() {
    let sensor = ReplaySensor::with_accuracies(HQ_LAT, HQ_LON, &[20.0]);
    sensor.push(ReplayStep::fix(40.7831, -73.9712, 25.0));
    let controller = controller(sensor, AccuracyPolicy::default());

    controller.locate().await.unwrap();
    assert_eq!(controller.nearest_office_within().unwrap().office_id, 1);

    controller.locate().await.unwrap();
    assert_eq!(controller.nearest_office_within().unwrap().office_id, 2);
    assert_matches!(
        controller.check_in_affordance(),
        CheckInAffordance::Ready { office_id: 2, .. }
    );
}

#[tokio::test(start_paused = true)]
async fn refresh_without_fix_reports_no_position() {
    let controller = controller(ReplaySensor::new(Vec::new()), AccuracyPolicy::default());

    assert_eq!(controller.refresh().await, Err(LocationError::NoPosition));
    assert_eq!(controller.status(), SessionStatus::Idle);
}
