pub mod directory;
pub mod evaluator;
pub mod http;
pub mod model;
pub mod remote;

pub use directory::{geofences_for, HttpOfficeDirectory, OfficeDirectory, StaticOfficeDirectory};
pub use evaluator::{evaluate_geofences, nearest, nearest_within, GeofenceEvaluator, LocalEvaluator};
pub use http::BackendClient;
pub use model::{Geofence, GeofenceResult, Office, OfficeId};
pub use remote::RemoteEvaluator;
