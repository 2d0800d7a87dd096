use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::geofence::Office;
use crate::location::AccuracyPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8051/api/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub api_url: String,
    pub token: Option<String>,
    /// Ask the backend for geofence membership instead of computing it locally.
    pub remote_evaluation: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            token: None,
            remote_evaluation: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GeoSettings {
    pub policy: AccuracyPolicy,
    pub backend: BackendSettings,
    /// Used when no backend token is configured.
    pub offices: Vec<Office>,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<GeoSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring unreadable settings at {}: {}",
                    path.display(),
                    err
                );
                GeoSettings::default()
            })
        } else {
            GeoSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> GeoSettings {
        self.read().clone()
    }

    pub fn policy(&self) -> AccuracyPolicy {
        self.read().policy.clone()
    }

    pub fn backend(&self) -> BackendSettings {
        self.read().backend.clone()
    }

    pub fn offices(&self) -> Vec<Office> {
        self.read().offices.clone()
    }

    pub fn update_policy(&self, policy: AccuracyPolicy) -> Result<()> {
        self.update(|data| data.policy = policy)
    }

    pub fn set_desired_accuracy(&self, meters: f64) -> Result<()> {
        self.update(|data| data.policy.desired_accuracy_meters = meters)
    }

    pub fn set_high_accuracy(&self, enabled: bool) -> Result<()> {
        self.update(|data| data.policy.high_accuracy = enabled)
    }

    pub fn update_backend(&self, backend: BackendSettings) -> Result<()> {
        self.update(|data| data.backend = backend)
    }

    /// Startup overrides that are not persisted.
    pub fn apply_env_overrides(&self) {
        let mut guard = self.write();
        if let Ok(url) = std::env::var("GEOCHECK_API_URL") {
            guard.backend.api_url = url;
        }
        if let Ok(token) = std::env::var("GEOCHECK_TOKEN") {
            guard.backend.token = Some(token).filter(|t| !t.is_empty());
        }
    }

    fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut GeoSettings),
    {
        let mut guard = self.write();
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &GeoSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, GeoSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, GeoSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
