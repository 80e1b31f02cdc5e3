use serde::Serialize;

use crate::assessment::AssessmentResult;

const DISCLAIMER: &str = "This is not a medical diagnosis. If you are worried about your baby's movements, contact your healthcare provider or maternity unit straight away; do not wait for your next appointment.";

const NORMAL_RANGE_GUIDANCE: &str = "Most guidance suggests feeling at least 10 movements within 2 hours, usually counted at a time of day when your baby is active. Every baby has its own pattern, so what matters most is knowing what is normal for yours. Tell me how many kicks you felt and over how long (for example \"I felt 10 kicks in 2 hours\") and I can assess the pattern.";

const REDUCED_MOVEMENT_GUIDANCE: &str = "A noticeable decrease in your baby's movements should always be checked. Lie on your left side and count movements for the next 2 hours. If you feel fewer than 10 movements, or you are simply worried, contact your healthcare provider or maternity unit right away. You can also tell me your count (for example \"6 kicks in 2 hours\") for an assessment.";

const GENERAL_GUIDANCE: &str = "Tracking your baby's movements daily from around 28 weeks helps you learn their usual pattern. Choose a time when your baby is usually active, count each kick, flutter, swish or roll, and note how long it takes to reach 10. Share your count and the time it took (for example \"12 kicks in 90 minutes\") and I can assess it.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GuidanceBucket {
    /// Questions about how much movement is expected.
    NormalRange,
    ReducedMovement,
    General,
}

impl GuidanceBucket {
    pub fn select(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|word| lowered.contains(word));

        if mentions(&["how many", "how often", "normal"]) {
            GuidanceBucket::NormalRange
        } else if mentions(&["reduced", "fewer", "less"]) {
            GuidanceBucket::ReducedMovement
        } else {
            GuidanceBucket::General
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            GuidanceBucket::NormalRange => NORMAL_RANGE_GUIDANCE,
            GuidanceBucket::ReducedMovement => REDUCED_MOVEMENT_GUIDANCE,
            GuidanceBucket::General => GENERAL_GUIDANCE,
        }
    }
}

pub fn format_report(
    result: &AssessmentResult,
    kick_count: u32,
    duration_minutes: u32,
) -> String {
    let mut lines = vec![
        format!(
            "{} Fetal movement assessment: {}",
            result.status_tier.emoji(),
            result.status_tier.as_str()
        ),
        format!(
            "Recorded: {kick_count} kicks in {duration_minutes} minutes ({:.1} kicks/hour)",
            result.kicks_per_hour
        ),
    ];

    if result.predicted_class.is_some() {
        lines.push(format!("Confidence: {:.0}%", result.confidence * 100.0));
    }
    lines.push(result.message.clone());
    lines.push(format!("Recommendation: {}", result.recommendation));

    if result.predicted_class.is_some() && !result.is_clinical() {
        lines.push(
            "Note: the trained assessment model is unavailable, so this result is not a clinical assessment."
                .to_string(),
        );
    }

    lines.push(String::new());
    lines.push(DISCLAIMER.to_string());
    lines.join("\n")
}
