pub mod assessment;
pub mod chat;
pub mod error;
pub mod features;
pub mod inference;
pub mod models;
pub mod service;
pub mod session;
pub mod settings;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;

pub use assessment::{AssessmentResult, StatusTier};
pub use error::{EngineError, EngineResult};
pub use features::{FeatureVector, SensorMode};
pub use inference::{AssessmentModel, ModelHandle, WeightsSource};
pub use models::{CountingMethod, KickSession, SessionOutcome};
pub use service::AssessmentService;
pub use session::{SessionController, SessionSnapshot, SessionStatus};
pub use settings::{EngineSettings, SettingsStore};
pub use utils::logging::init_logging;

const DEFAULT_SETTINGS_FILE: &str = "kickwise.json";

/// Process-wide wiring: settings, the shared assessment service and the
/// session controller that uses it.
pub struct AppState {
    pub settings: SettingsStore,
    pub service: Arc<AssessmentService>,
    pub sessions: SessionController,
}

impl AppState {
    pub fn new(settings_path: Option<PathBuf>) -> Result<Self> {
        let settings_path = settings_path.unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
        let settings = SettingsStore::new(settings_path)?;
        let effective = settings.current().with_env_overrides();

        log::info!(
            "Kickwise starting (model dir {})",
            effective.model_dir.display()
        );

        let service = AssessmentService::new(effective);
        let sessions = SessionController::new(Arc::clone(&service));

        Ok(Self {
            settings,
            service,
            sessions,
        })
    }
}
