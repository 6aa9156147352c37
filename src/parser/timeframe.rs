use super::normalize::Fragment;

/// Wire values used when a fragment carries no time frame.
pub const NOT_FOUND_TIME: i64 = -1;
pub const NOT_FOUND_UNIT: &str = "not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Year,
}

impl TimeUnit {
    pub fn seconds(self) -> i64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 60 * 60,
            TimeUnit::Day => 24 * 60 * 60,
            TimeUnit::Week => 7 * 24 * 60 * 60,
            TimeUnit::Year => 365 * 24 * 60 * 60,
        }
    }
}

const UNITS: &[(&str, TimeUnit)] = &[
    ("second", TimeUnit::Second),
    ("seconds", TimeUnit::Second),
    ("minute", TimeUnit::Minute),
    ("minutes", TimeUnit::Minute),
    ("hour", TimeUnit::Hour),
    ("hours", TimeUnit::Hour),
    ("day", TimeUnit::Day),
    ("days", TimeUnit::Day),
    ("week", TimeUnit::Week),
    ("weeks", TimeUnit::Week),
    ("year", TimeUnit::Year),
    ("years", TimeUnit::Year),
];

/// A quantity plus the vocabulary word it was paired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFrame {
    pub quantity: u64,
    pub unit: TimeUnit,
    word: &'static str,
}

impl TimeFrame {
    /// Build from a unit word; `None` if the word is outside the vocabulary.
    pub fn new(quantity: u64, word: &str) -> Option<Self> {
        let (word, unit) = lookup_unit(word)?;
        Some(TimeFrame { quantity, unit, word })
    }

    /// The lower-cased vocabulary word, singular or plural as matched.
    pub fn unit_word(&self) -> &'static str {
        self.word
    }

    /// Saturates at `i64::MAX` instead of overflowing.
    pub fn total_seconds(&self) -> i64 {
        i64::try_from(self.quantity)
            .unwrap_or(i64::MAX)
            .saturating_mul(self.unit.seconds())
    }
}

fn lookup_unit(word: &str) -> Option<(&'static str, TimeUnit)> {
    let lowered = word.to_lowercase();
    UNITS
        .iter()
        .find(|(w, _)| *w == lowered)
        .map(|(w, u)| (*w, *u))
}

/// First adjacent (integer, unit) pair scanning left to right.
///
/// Only plain base-10 integers count; "three" or "1.5" never match, and a
/// non-numeric token just moves the scan along.
pub fn extract_time_frame(fragment: &Fragment) -> Option<TimeFrame> {
    fragment.tokens().windows(2).find_map(|pair| {
        let quantity = pair[0].parse::<u64>().ok()?;
        TimeFrame::new(quantity, &pair[1])
    })
}
