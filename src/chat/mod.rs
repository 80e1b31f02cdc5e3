//! Fetal-health slice of the chat assistant: intent detection, count
//! extraction and the fixed reply texts.

pub mod guidance;
pub mod intent;

pub use guidance::{format_report, GuidanceBucket};
pub use intent::{extract, is_fetal_health_intent, ExtractedCounts};
