pub mod artifact;
pub mod model;
pub mod network;

pub use artifact::{load_classifier, save_classifier};
pub use model::{AssessmentModel, ModelHandle, ModelInfo, Prediction, WeightsSource};
pub use network::{Classifier, CLASS_COUNT, INPUT_WIDTH};
