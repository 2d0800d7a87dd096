pub mod error;
pub mod geo;
pub mod geofence;
pub mod location;
pub mod session;
pub mod settings;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};

pub use error::{LocationError, SensorError, SensorErrorKind};
pub use geo::{distance, AccuracyBand, Coordinate, PositionSample};
pub use geofence::{Geofence, GeofenceEvaluator, GeofenceResult, Office, OfficeDirectory};
pub use location::{AccuracyPolicy, PositionAcquirer, PositionSensor, SensorRequest};
pub use session::{CheckInAffordance, GeoEvent, GeoSessionController, SessionState, SessionStatus};
pub use settings::{GeoSettings, SettingsStore};

use geofence::{BackendClient, HttpOfficeDirectory, LocalEvaluator, RemoteEvaluator, StaticOfficeDirectory};
use location::{ReplaySensor, SimulatedSensor};

/// Map center used when no office is configured (New York City).
const DEFAULT_CENTER: (f64, f64) = (40.7128, -74.0060);
const SIMULATED_INITIAL_ACCURACY_METERS: f64 = 250.0;

/// Wires sensor, office directory and evaluator from settings. Policy
/// changes made through the controller are saved back to `settings`.
///
/// `GEOCHECK_TRACE` selects a replayed sensor trace; otherwise fixes are
/// simulated around the first configured office. A backend token switches
/// the office list to the backend, and `remoteEvaluation` additionally
/// delegates membership checks to it.
pub fn build_controller(settings: &Arc<SettingsStore>) -> Result<GeoSessionController> {
    let backend = settings.backend();
    let offices = settings.offices();

    let sensor: Arc<dyn PositionSensor> = match std::env::var("GEOCHECK_TRACE") {
        Ok(path) => Arc::new(ReplaySensor::from_file(&PathBuf::from(path))?),
        Err(_) => {
            let (lat, lon) = offices
                .first()
                .map(|office| (office.latitude, office.longitude))
                .unwrap_or(DEFAULT_CENTER);
            let truth = Coordinate::try_new(lat, lon)
                .map_err(|err| anyhow::anyhow!("invalid simulation center: {err}"))?;
            Arc::new(SimulatedSensor::new(truth, SIMULATED_INITIAL_ACCURACY_METERS))
        }
    };

    let (directory, evaluator): (Arc<dyn OfficeDirectory>, Arc<dyn GeofenceEvaluator>) =
        match &backend.token {
            Some(token) => {
                let client = BackendClient::new(backend.api_url.clone(), Some(token.clone()));
                let evaluator: Arc<dyn GeofenceEvaluator> = if backend.remote_evaluation {
                    Arc::new(RemoteEvaluator::new(client.clone()))
                } else {
                    Arc::new(LocalEvaluator)
                };
                (Arc::new(HttpOfficeDirectory::new(client)), evaluator)
            }
            None => {
                if backend.remote_evaluation {
                    warn!("Remote evaluation needs a backend token; checking geofences locally");
                }
                (
                    Arc::new(StaticOfficeDirectory::new(offices)),
                    Arc::new(LocalEvaluator),
                )
            }
        };

    info!(
        "Using {} sensor with {} geofence evaluation",
        sensor.sensor_tag(),
        evaluator.evaluator_tag()
    );

    Ok(
        GeoSessionController::new(sensor, evaluator, directory, settings.policy())
            .with_settings(settings.clone()),
    )
}

async fn locate_once() -> Result<()> {
    let settings_path = std::env::var("GEOCHECK_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("geocheck.json"));
    let settings = Arc::new(SettingsStore::new(settings_path)?);
    settings.apply_env_overrides();

    let controller = build_controller(&settings)?;
    if !controller.sensor_available() {
        bail!(LocationError::SensorUnsupported);
    }

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => debug!("{} {}", event.name(), payload),
                Err(err) => warn!("Failed to encode {} event: {}", event.name(), err),
            }
        }
    });

    let sample = controller
        .locate()
        .await
        .context("Location error")?;

    let band = sample.accuracy_band();
    info!(
        "Location updated with {:.1}m accuracy ({})",
        sample.accuracy_meters(),
        band.as_str()
    );

    match controller.nearest_office_within() {
        Some(office) => info!(
            "Nearest office within geofence: {} ({:.1}m)",
            office.office_name.as_deref().unwrap_or("unnamed"),
            office.distance_meters
        ),
        None => match controller.nearest_office() {
            Some(office) => info!(
                "Outside all geofences; nearest office {} is {:.1}m away",
                office.office_name.as_deref().unwrap_or("unnamed"),
                office.distance_meters
            ),
            None => info!("No offices configured"),
        },
    }

    if let Some(err) = controller.snapshot().last_error {
        warn!("{}", err);
    }

    let affordance = controller.check_in_affordance();
    info!("{}", affordance.hint());

    println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
    Ok(())
}

pub fn run() {
    let debug_mode = std::env::var("GEOCHECK_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // RUST_LOG, when set, takes precedence over the default level.
    env_logger::Builder::new()
        .filter_level(if debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    info!("geocheck starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(locate_once()) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
