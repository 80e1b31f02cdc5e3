use super::{AssessmentResult, StatusTier};

fn wording(tier: StatusTier) -> (&'static str, &'static str) {
    match tier {
        StatusTier::Normal => (
            "Your baby's movement pattern looks normal and healthy.",
            "Keep up your daily kick counts and mention any change in your baby's usual pattern at your next visit.",
        ),
        StatusTier::Suspect => (
            "Some variations in your baby's movement pattern warrant attention.",
            "Discuss these results with your healthcare provider, sooner if movements keep decreasing.",
        ),
        StatusTier::Concerning => (
            "Your baby's movement pattern suggests possible concern.",
            "Contact your healthcare provider or maternity unit immediately.",
        ),
        StatusTier::Unknown => (
            "We were unable to assess your baby's movement pattern.",
            "Continue monitoring movements and consult your healthcare provider if anything feels different.",
        ),
    }
}

/// Kicks per hour rounded to one decimal. Zero for an empty window.
pub fn kicks_per_hour(kick_count: u32, duration_minutes: u32) -> f64 {
    if duration_minutes == 0 {
        return 0.0;
    }
    let rate = kick_count as f64 / duration_minutes as f64 * 60.0;
    (rate * 10.0).round() / 10.0
}

pub fn generate(
    class: usize,
    confidence: f32,
    kick_count: u32,
    duration_minutes: u32,
) -> AssessmentResult {
    let status_tier = StatusTier::from_class(class);
    let (message, recommendation) = wording(status_tier);

    AssessmentResult {
        predicted_class: Some(class),
        confidence: if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        },
        status_tier,
        message: message.to_string(),
        recommendation: recommendation.to_string(),
        kicks_per_hour: kicks_per_hour(kick_count, duration_minutes),
        weights_source: None,
        probabilities: None,
    }
}

/// Result used when inference itself failed.
pub fn unavailable(kick_count: u32, duration_minutes: u32) -> AssessmentResult {
    let (message, recommendation) = wording(StatusTier::Unknown);
    AssessmentResult {
        predicted_class: None,
        confidence: 0.0,
        status_tier: StatusTier::Unknown,
        message: message.to_string(),
        recommendation: recommendation.to_string(),
        kicks_per_hour: kicks_per_hour(kick_count, duration_minutes),
        weights_source: None,
        probabilities: None,
    }
}
