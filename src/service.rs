use std::sync::Arc;

use crate::{
    assessment::{self, AssessmentResult},
    chat::{self, GuidanceBucket},
    features::{self, SensorMode},
    inference::{AssessmentModel, ModelInfo},
    log_error, log_info,
    settings::EngineSettings,
};

const ENABLE_LOGS: bool = true;

/// Application-scoped entry point: owns the shared model and turns counts
/// into assessments. Every path ends in a result or a fixed guidance text.
pub struct AssessmentService {
    model: AssessmentModel,
    settings: EngineSettings,
}

impl AssessmentService {
    pub fn new(settings: EngineSettings) -> Arc<Self> {
        Arc::new(Self {
            model: AssessmentModel::new(settings.model_dir.clone()),
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn model(&self) -> &AssessmentModel {
        &self.model
    }

    pub async fn model_info(&self) -> ModelInfo {
        self.model.handle().await.describe()
    }

    /// Runs features, classifier and generator for one counting window.
    pub async fn assess(
        &self,
        kick_count: u32,
        duration_minutes: u32,
        gestational_week: u32,
        sensor_mode: SensorMode,
    ) -> AssessmentResult {
        let vector =
            match features::extract(kick_count, duration_minutes, gestational_week, sensor_mode) {
                Ok(vector) => vector,
                Err(err) => {
                    log_error!("Rejected assessment input: {err}");
                    return assessment::unavailable(kick_count, duration_minutes);
                }
            };

        let handle = self.model.handle().await;
        match handle.predict(&vector) {
            Ok(prediction) => {
                log_info!(
                    "Assessed {kick_count} kicks / {duration_minutes} min as class {} ({:.2}, {})",
                    prediction.class,
                    prediction.confidence,
                    handle.weights_source().as_str()
                );
                assessment::generate(
                    prediction.class,
                    prediction.confidence,
                    kick_count,
                    duration_minutes,
                )
                .with_model_output(handle.weights_source(), prediction.probabilities)
            }
            Err(err) => {
                log_error!("Inference failed: {err}");
                assessment::unavailable(kick_count, duration_minutes)
            }
        }
    }

    /// Assessment with the configured gestational week and sensor mode.
    pub async fn assess_with_defaults(
        &self,
        kick_count: u32,
        duration_minutes: u32,
    ) -> AssessmentResult {
        self.assess(
            kick_count,
            duration_minutes,
            self.settings.default_gestational_week,
            self.settings.default_sensor_mode,
        )
        .await
    }

    /// Answers a chat message about fetal movement.
    ///
    /// Returns `None` when the text is not about fetal movement; the general
    /// assistant handles those. Detection is keyword-only, so a question such
    /// as "How often should I feel my baby move?" is not claimed here even
    /// though `chat_reply` would map it to the normal-range guidance.
    pub async fn respond_to_chat(&self, text: &str) -> Option<String> {
        if !chat::is_fetal_health_intent(text) {
            return None;
        }
        Some(self.chat_reply(text).await)
    }

    /// Formatted report when the text carries a usable count, otherwise the
    /// guidance text for its bucket.
    pub async fn chat_reply(&self, text: &str) -> String {
        match chat::extract(text).complete() {
            Some((kick_count, duration_minutes)) => {
                let result = self.assess_with_defaults(kick_count, duration_minutes).await;
                chat::format_report(&result, kick_count, duration_minutes)
            }
            None => GuidanceBucket::select(text).text().to_string(),
        }
    }
}
