use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const INTENT_KEYWORDS: [&str; 13] = [
    "kick",
    "kicks",
    "movement",
    "movements",
    "fetal",
    "baby moving",
    "kick count",
    "fetal movement",
    "baby kicks",
    "how many kicks",
    "kick pattern",
    "reduced kicks",
    "fewer kicks",
];

static KICKS: OnceLock<Regex> = OnceLock::new();
static DURATION: OnceLock<Regex> = OnceLock::new();

// The leading group keeps a match from starting inside a decimal such as "1.5".
fn kicks_pattern() -> &'static Regex {
    KICKS.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^\w.,])(\d+(?:\.\d+)?)\s*kicks?\b")
            .expect("kick pattern is valid")
    })
}

fn duration_pattern() -> &'static Regex {
    DURATION.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^\w.,])(\d+(?:\.\d+)?)\s*(hours?|hrs?|minutes?|mins?)\b")
            .expect("duration pattern is valid")
    })
}

/// Fractional durations are rounded to whole minutes.
fn to_minutes(value: &str, unit: &str) -> Option<u32> {
    let value: f64 = value.parse().ok()?;
    let per_unit = if unit.starts_with('h') { 60.0 } else { 1.0 };
    let minutes = (value * per_unit).round();
    (minutes.is_finite() && minutes <= f64::from(u32::MAX)).then_some(minutes as u32)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedCounts {
    pub kick_count: Option<u32>,
    pub duration_minutes: Option<u32>,
}

impl ExtractedCounts {
    /// Both values present with a non-zero window.
    pub fn complete(&self) -> Option<(u32, u32)> {
        match (self.kick_count, self.duration_minutes) {
            (Some(kicks), Some(minutes)) if minutes > 0 => Some((kicks, minutes)),
            _ => None,
        }
    }
}

pub fn is_fetal_health_intent(text: &str) -> bool {
    let lowered = text.to_lowercase();
    INTENT_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// First `<n> kick(s)` and first `<n> hour|hr|minute|min(s)` in the text.
/// Fractional kick counts and numbers that do not fit are treated as absent.
pub fn extract(text: &str) -> ExtractedCounts {
    let kick_count = kicks_pattern()
        .captures(text)
        .and_then(|caps| caps[1].parse::<u32>().ok());

    let duration_minutes = duration_pattern()
        .captures(text)
        .and_then(|caps| to_minutes(&caps[1], &caps[2].to_lowercase()));

    ExtractedCounts {
        kick_count,
        duration_minutes,
    }
}
