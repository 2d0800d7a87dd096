use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::LocationError;

use super::http::BackendClient;
use super::model::{Geofence, Office};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Source of office geofences. Read on every evaluation, never cached here.
#[async_trait]
pub trait OfficeDirectory: Send + Sync {
    async fn list_offices(&self) -> Result<Vec<Office>, LocationError>;
}

/// Fixed office list, e.g. loaded from settings.
#[derive(Default)]
pub struct StaticOfficeDirectory {
    offices: RwLock<Vec<Office>>,
}

impl StaticOfficeDirectory {
    pub fn new(offices: Vec<Office>) -> Self {
        Self {
            offices: RwLock::new(offices),
        }
    }

    pub fn replace(&self, offices: Vec<Office>) {
        let mut guard = match self.offices.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = offices;
    }
}

#[async_trait]
impl OfficeDirectory for StaticOfficeDirectory {
    async fn list_offices(&self) -> Result<Vec<Office>, LocationError> {
        let guard = match self.offices.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.clone())
    }
}

/// `GET {api_url}/offices`.
pub struct HttpOfficeDirectory {
    backend: BackendClient,
}

impl HttpOfficeDirectory {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl OfficeDirectory for HttpOfficeDirectory {
    async fn list_offices(&self) -> Result<Vec<Office>, LocationError> {
        let offices: Vec<Office> = self
            .backend
            .get_json("offices")
            .await
            .map_err(|err| {
                log_error!("Error loading offices: {}", err);
                LocationError::DirectoryUnavailable(err)
            })?;
        log_info!("Loaded {} office locations", offices.len());
        Ok(offices)
    }
}

/// Geofences for every office with a usable location; bad records are skipped.
pub fn geofences_for(offices: &[Office]) -> Vec<Geofence> {
    offices
        .iter()
        .filter_map(|office| match office.geofence() {
            Ok(fence) => Some(fence),
            Err(err) => {
                log_warn!("Skipping office {} ({}): {}", office.id, office.name, err);
                None
            }
        })
        .collect()
}
