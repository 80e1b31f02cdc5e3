use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{assessment::AssessmentResult, features::SensorMode};

/// Kicks that complete a count-to-target session.
pub const TARGET_KICKS: u32 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CountingMethod {
    /// Complete once [`TARGET_KICKS`] have been recorded.
    CountToTarget,
    /// Complete once the target duration has elapsed.
    FixedDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KickSession {
    pub id: String,
    pub method: CountingMethod,
    pub started_at: DateTime<Utc>,
    /// Set once, when the completion rule first holds.
    pub ended_at: Option<DateTime<Utc>>,
    pub kick_count: u32,
    pub target_duration_minutes: Option<u32>,
    pub target_kicks: Option<u32>,
    pub sensor_mode: SensorMode,
    pub gestational_week: u32,
}

/// A submitted session with its assessment, ready for an external store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub session: KickSession,
    pub duration_minutes: u32,
    pub assessment: AssessmentResult,
}
