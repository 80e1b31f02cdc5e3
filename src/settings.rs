use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::features::{validate_gestational_week, SensorMode};

const MODEL_DIR_ENV: &str = "KICKWISE_MODEL_DIR";
const DEBUG_ENV: &str = "KICKWISE_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    /// Directory holding `model.json` and its weight shards.
    pub model_dir: PathBuf,
    pub tick_interval_ms: u64,
    pub default_fixed_duration_minutes: u32,
    pub default_gestational_week: u32,
    pub default_sensor_mode: SensorMode,
    /// Log every clock tick instead of only transitions.
    pub debug_ticks: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/fetal-health"),
            tick_interval_ms: 1000,
            default_fixed_duration_minutes: 60,
            default_gestational_week: 28,
            default_sensor_mode: SensorMode::Manual,
            debug_ticks: false,
        }
    }
}

impl EngineSettings {
    /// Applies `KICKWISE_MODEL_DIR` and `KICKWISE_DEBUG` on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.model_dir = PathBuf::from(dir);
            }
        }

        if let Ok(value) = std::env::var(DEBUG_ENV) {
            self.debug_ticks = value == "1" || value.eq_ignore_ascii_case("true");
        }

        self
    }

    /// Fields the session engine would reject at every use.
    pub fn validate(&self) -> Result<()> {
        validate_gestational_week(self.default_gestational_week)
            .context("Invalid defaultGestationalWeek")?;
        if self.default_fixed_duration_minutes == 0 {
            anyhow::bail!("defaultFixedDurationMinutes must be at least 1");
        }
        Ok(())
    }

    /// Replaces invalid fields with their defaults, warning for each one.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if let Err(err) = validate_gestational_week(self.default_gestational_week) {
            log::warn!("Ignoring defaultGestationalWeek: {err}");
            self.default_gestational_week = defaults.default_gestational_week;
        }
        if self.default_fixed_duration_minutes == 0 {
            log::warn!("Ignoring defaultFixedDurationMinutes: must be at least 1");
            self.default_fixed_duration_minutes = defaults.default_fixed_duration_minutes;
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<EngineSettings>(&contents)
                .map(EngineSettings::sanitized)
                .unwrap_or_else(|err| {
                    log::warn!(
                        "Ignoring unreadable settings file {}: {err}",
                        path.display()
                    );
                    EngineSettings::default()
                })
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> EngineSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: EngineSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: EngineSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        *self.write() = data.sanitized();
        Ok(())
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    // A poisoned lock still holds a complete settings value.
    fn read(&self) -> RwLockReadGuard<'_, EngineSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
