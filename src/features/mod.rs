//! Kick-count to cardiotocography feature mapping.
//!
//! The classifier was trained on CTG exam summaries, so a counting session is
//! projected onto the same 21 columns: a few fields follow the observed kick
//! rate and the rest hold population-level constants. This is a coarse proxy
//! rather than a real CTG signal.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const FEATURE_COUNT: usize = 21;

/// Column order expected by the classifier input layer.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "baseline value",
    "accelerations",
    "fetal_movement",
    "uterine_contractions",
    "light_decelerations",
    "severe_decelerations",
    "prolongued_decelerations",
    "abnormal_short_term_variability",
    "mean_value_of_short_term_variability",
    "percentage_of_time_with_abnormal_long_term_variability",
    "mean_value_of_long_term_variability",
    "histogram_width",
    "histogram_min",
    "histogram_max",
    "histogram_number_of_peaks",
    "histogram_number_of_zeroes",
    "histogram_mode",
    "histogram_mean",
    "histogram_median",
    "histogram_variance",
    "histogram_tendency",
];

pub const DEFAULT_GESTATIONAL_WEEK: u32 = 28;
const GESTATIONAL_WEEK_RANGE: std::ops::RangeInclusive<u32> = 1..=45;

/// Kicks per minute above which accelerations are reported.
const ACTIVE_RATE: f32 = 0.5;
/// Kicks per minute below which variability markers are raised.
const LOW_RATE: f32 = 0.3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SensorMode {
    /// Kicks are tapped in by hand.
    #[default]
    Manual,
    /// Device resting on the abdomen reports the kicks.
    OnAbdomen,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub baseline_value: f32,
    pub accelerations: f32,
    pub fetal_movement: f32,
    pub uterine_contractions: f32,
    pub light_decelerations: f32,
    pub severe_decelerations: f32,
    pub prolongued_decelerations: f32,
    pub abnormal_short_term_variability: f32,
    pub mean_value_of_short_term_variability: f32,
    pub percentage_of_time_with_abnormal_long_term_variability: f32,
    pub mean_value_of_long_term_variability: f32,
    pub histogram_width: f32,
    pub histogram_min: f32,
    pub histogram_max: f32,
    pub histogram_number_of_peaks: f32,
    pub histogram_number_of_zeroes: f32,
    pub histogram_mode: f32,
    pub histogram_mean: f32,
    pub histogram_median: f32,
    pub histogram_variance: f32,
    pub histogram_tendency: f32,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f32; FEATURE_COUNT] {
        [
            self.baseline_value,
            self.accelerations,
            self.fetal_movement,
            self.uterine_contractions,
            self.light_decelerations,
            self.severe_decelerations,
            self.prolongued_decelerations,
            self.abnormal_short_term_variability,
            self.mean_value_of_short_term_variability,
            self.percentage_of_time_with_abnormal_long_term_variability,
            self.mean_value_of_long_term_variability,
            self.histogram_width,
            self.histogram_min,
            self.histogram_max,
            self.histogram_number_of_peaks,
            self.histogram_number_of_zeroes,
            self.histogram_mode,
            self.histogram_mean,
            self.histogram_median,
            self.histogram_variance,
            self.histogram_tendency,
        ]
    }

    pub fn named(&self) -> impl Iterator<Item = (&'static str, f32)> {
        FEATURE_NAMES.into_iter().zip(self.to_array())
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|value| value.is_finite())
    }
}

pub fn validate_gestational_week(week: u32) -> EngineResult<()> {
    if GESTATIONAL_WEEK_RANGE.contains(&week) {
        Ok(())
    } else {
        Err(EngineError::MalformedInput(format!(
            "gestational week {week} outside {}..={}",
            GESTATIONAL_WEEK_RANGE.start(),
            GESTATIONAL_WEEK_RANGE.end()
        )))
    }
}

/// Builds the classifier input for one counting window.
///
/// `duration_minutes` must be non-zero. `gestational_week` and `sensor_mode`
/// are validated but do not yet influence any column.
pub fn extract(
    kick_count: u32,
    duration_minutes: u32,
    gestational_week: u32,
    _sensor_mode: SensorMode,
) -> EngineResult<FeatureVector> {
    if duration_minutes == 0 {
        return Err(EngineError::MalformedInput(
            "duration must be at least one minute".into(),
        ));
    }
    validate_gestational_week(gestational_week)?;

    let rate = kick_count as f32 / duration_minutes as f32;
    let low_activity = rate < LOW_RATE;

    Ok(FeatureVector {
        baseline_value: 133.0,
        accelerations: if rate > ACTIVE_RATE { 0.1 } else { 0.0 },
        fetal_movement: (rate / 10.0).min(0.5),
        uterine_contractions: 0.004,
        light_decelerations: if low_activity { 0.002 } else { 0.0 },
        severe_decelerations: 0.0,
        prolongued_decelerations: 0.0,
        abnormal_short_term_variability: if low_activity { 60.0 } else { 45.0 },
        mean_value_of_short_term_variability: if low_activity { 0.5 } else { 1.3 },
        percentage_of_time_with_abnormal_long_term_variability: if low_activity {
            40.0
        } else {
            10.0
        },
        mean_value_of_long_term_variability: if low_activity { 4.0 } else { 8.2 },
        histogram_width: 70.0,
        histogram_min: 93.0,
        histogram_max: 163.0,
        histogram_number_of_peaks: 4.0,
        histogram_number_of_zeroes: 0.0,
        histogram_mode: 137.0,
        histogram_mean: 135.0,
        histogram_median: 138.0,
        histogram_variance: 18.0,
        histogram_tendency: 0.0,
    })
}
