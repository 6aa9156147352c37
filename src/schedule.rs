use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::parser::records::DirectiveRecord;
use crate::parser::timeframe::TimeFrame;

const DAY_SECS: i64 = 24 * 60 * 60;

/// How far out a directive reaches from the procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Immediate,
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl Category {
    pub fn for_frame(tf: &TimeFrame) -> Self {
        match tf.total_seconds() {
            s if s <= DAY_SECS => Category::Immediate,
            s if s <= 7 * DAY_SECS => Category::ShortTerm,
            s if s <= 28 * DAY_SECS => Category::MediumTerm,
            _ => Category::LongTerm,
        }
    }
}

/// A record plus its absolute end time relative to the procedure.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledDirective {
    #[serde(flatten)]
    pub record: DirectiveRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

pub fn ends_at(procedure: DateTime<Utc>, tf: &TimeFrame) -> Option<DateTime<Utc>> {
    let span = Duration::try_seconds(tf.total_seconds())?;
    procedure.checked_add_signed(span)
}

/// Attach end times; records without a time frame pass through unscheduled.
pub fn schedule(records: Vec<DirectiveRecord>, procedure: DateTime<Utc>) -> Vec<ScheduledDirective> {
    records
        .into_iter()
        .map(|record| {
            let (ends_at, category) = match &record.time_frame {
                Some(tf) => (ends_at(procedure, tf), Some(Category::for_frame(tf))),
                None => (None, None),
            };
            ScheduledDirective {
                record,
                ends_at,
                category,
            }
        })
        .collect()
}
