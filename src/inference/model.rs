use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    error::{EngineError, EngineResult},
    features::FeatureVector,
};

use super::{
    artifact::load_classifier,
    network::{architecture_summary, Classifier, CLASS_COUNT},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WeightsSource {
    Pretrained,
    FallbackUntrained,
}

impl WeightsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightsSource::Pretrained => "pretrained",
            WeightsSource::FallbackUntrained => "fallback-untrained",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub architecture: String,
    pub weights_source: WeightsSource,
    pub loaded: bool,
    pub model_dir: PathBuf,
    pub load_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub class: usize,
    pub confidence: f32,
    pub probabilities: [f32; CLASS_COUNT],
}

/// A ready classifier plus where its weights came from.
#[derive(Debug)]
pub struct ModelHandle {
    classifier: Classifier,
    weights_source: WeightsSource,
    model_dir: PathBuf,
    load_error: Option<String>,
}

impl ModelHandle {
    pub fn pretrained(classifier: Classifier, model_dir: PathBuf) -> Self {
        Self {
            classifier,
            weights_source: WeightsSource::Pretrained,
            model_dir,
            load_error: None,
        }
    }

    pub fn fallback(model_dir: PathBuf, cause: &EngineError) -> Self {
        Self {
            classifier: Classifier::untrained(&mut rand::thread_rng()),
            weights_source: WeightsSource::FallbackUntrained,
            model_dir,
            load_error: Some(cause.to_string()),
        }
    }

    pub fn weights_source(&self) -> WeightsSource {
        self.weights_source
    }

    pub fn describe(&self) -> ModelInfo {
        ModelInfo {
            architecture: architecture_summary(),
            weights_source: self.weights_source,
            loaded: true,
            model_dir: self.model_dir.clone(),
            load_error: self.load_error.clone(),
        }
    }

    /// Classifies one feature vector. Never mutates the handle.
    pub fn predict(&self, vector: &FeatureVector) -> EngineResult<Prediction> {
        if !vector.is_finite() {
            return Err(EngineError::Inference("feature vector has non-finite values".into()));
        }

        let output = self.classifier.forward(&vector.to_array());
        let probabilities: [f32; CLASS_COUNT] = output
            .as_slice()
            .and_then(|values| values.try_into().ok())
            .ok_or_else(|| {
                EngineError::Inference(format!(
                    "expected {CLASS_COUNT} outputs, got {}",
                    output.len()
                ))
            })?;

        let total: f32 = probabilities.iter().sum();
        if probabilities.iter().any(|p| !p.is_finite()) || (total - 1.0).abs() > 1e-4 {
            return Err(EngineError::Inference(format!(
                "output is not a distribution: {probabilities:?}"
            )));
        }

        let class = probabilities
            .iter()
            .enumerate()
            .fold(0, |best, (index, p)| if *p > probabilities[best] { index } else { best });

        Ok(Prediction {
            class,
            confidence: probabilities[class],
            probabilities,
        })
    }
}

/// Lazily loaded, shared classifier.
///
/// The first caller loads the artifact while holding the slot lock, so
/// concurrent first calls wait for and share that single load.
pub struct AssessmentModel {
    model_dir: PathBuf,
    slot: Mutex<Option<Arc<ModelHandle>>>,
    loads: AtomicUsize,
}

impl AssessmentModel {
    pub fn new(model_dir: PathBuf) -> Self {
        Self {
            model_dir,
            slot: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    pub async fn handle(&self) -> Arc<ModelHandle> {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Arc::clone(handle);
        }

        let handle = Arc::new(self.load().await);
        *slot = Some(Arc::clone(&handle));
        handle
    }

    /// Replaces the shared handle. Callers holding the previous `Arc` keep it.
    pub async fn reload(&self) -> Arc<ModelHandle> {
        let handle = Arc::new(self.load().await);
        *self.slot.lock().await = Some(Arc::clone(&handle));
        handle
    }

    pub async fn predict(&self, vector: &FeatureVector) -> EngineResult<Prediction> {
        self.handle().await.predict(vector)
    }

    /// Number of artifact loads performed so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Loads the pretrained artifact, substituting an untrained network of the
    /// same shape on any failure. Never fails.
    pub async fn load(&self) -> ModelHandle {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let dir = self.model_dir.clone();

        let loaded = tokio::task::spawn_blocking(move || load_classifier(&dir))
            .await
            .map_err(|err| EngineError::ModelLoad(format!("loader task failed: {err}")))
            .and_then(|result| result.map_err(|err| EngineError::ModelLoad(format!("{err:#}"))));

        match loaded {
            Ok(classifier) => {
                log_info!(
                    "Loaded pretrained classifier from {}",
                    self.model_dir.display()
                );
                ModelHandle::pretrained(classifier, self.model_dir.clone())
            }
            Err(err) => {
                log_warn!(
                    "Falling back to untrained classifier ({}); assessments are not clinical",
                    err
                );
                ModelHandle::fallback(self.model_dir.clone(), &err)
            }
        }
    }
}
