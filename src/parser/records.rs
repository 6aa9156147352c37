use serde::{Deserialize, Serialize};

use super::classify::{Classification, DirectiveKind};
use super::normalize::Fragment;
use super::timeframe::{extract_time_frame, TimeFrame, NOT_FOUND_TIME, NOT_FOUND_UNIT};

/// One patient directive. Serializes to `{type, time, unit, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "WireRecord")]
pub struct DirectiveRecord {
    pub kind: DirectiveKind,
    pub time_frame: Option<TimeFrame>,
    pub message: String,
}

impl DirectiveRecord {
    pub fn from_fragment(kind: DirectiveKind, fragment: &Fragment) -> Self {
        DirectiveRecord {
            kind,
            time_frame: extract_time_frame(fragment),
            message: fragment.message(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.time_frame.is_some()
    }

    pub fn time(&self) -> i64 {
        self.time_frame
            .map(|tf| i64::try_from(tf.quantity).unwrap_or(i64::MAX))
            .unwrap_or(NOT_FOUND_TIME)
    }

    pub fn unit(&self) -> &'static str {
        self.time_frame
            .map(|tf| tf.unit_word())
            .unwrap_or(NOT_FOUND_UNIT)
    }
}

/// The JSON shape exchanged with clients and with the LLM path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(rename = "type")]
    pub kind: i64,
    pub time: i64,
    pub unit: String,
    pub message: String,
}

impl From<DirectiveRecord> for WireRecord {
    fn from(r: DirectiveRecord) -> Self {
        WireRecord {
            kind: i64::from(r.kind.wire_value()),
            time: r.time(),
            unit: r.unit().to_string(),
            message: r.message,
        }
    }
}

impl TryFrom<WireRecord> for DirectiveRecord {
    type Error = anyhow::Error;

    /// Unknown `type` values are rejected; an unusable time or unit only
    /// downgrades the record to one without a time frame.
    fn try_from(w: WireRecord) -> anyhow::Result<Self> {
        let kind = DirectiveKind::from_wire(w.kind)
            .ok_or_else(|| anyhow::anyhow!("unknown directive type {}", w.kind))?;
        let time_frame = u64::try_from(w.time)
            .ok()
            .and_then(|q| TimeFrame::new(q, w.unit.trim()));
        Ok(DirectiveRecord {
            kind,
            time_frame,
            message: w.message,
        })
    }
}

/// Run the extractor over one bucket, keeping fragment order and count.
pub fn build_records(bucket: &[Fragment], kind: DirectiveKind) -> Vec<DirectiveRecord> {
    bucket
        .iter()
        .map(|f| DirectiveRecord::from_fragment(kind, f))
        .collect()
}

/// Do-not records first, then do records.
pub fn build_all(classification: &Classification) -> Vec<DirectiveRecord> {
    let mut records = build_records(classification.bucket(DirectiveKind::DoNot), DirectiveKind::DoNot);
    records.extend(build_records(classification.bucket(DirectiveKind::Do), DirectiveKind::Do));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::timeframe::TimeUnit;

    fn frag(words: &[&str]) -> Fragment {
        Fragment::from_tokens(words.iter().copied()).unwrap()
    }

    #[test]
    fn drive_record_json() {
        let r = DirectiveRecord::from_fragment(
            DirectiveKind::DoNot,
            &frag(&["Do", "not", "drive", "for", "24", "hours"]),
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": 1,
                "time": 24,
                "unit": "hours",
                "message": "Do not drive for 24 hours"
            })
        );
    }

    #[test]
    fn sentinel_record_json() {
        let r = DirectiveRecord::from_fragment(DirectiveKind::Do, &frag(&["Take", "aspirin", "daily"]));
        assert!(!r.is_resolved());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], 0);
        assert_eq!(json["time"], -1);
        assert_eq!(json["unit"], "not found");
        assert_eq!(json["message"], "Take aspirin daily");
    }

    #[test]
    fn build_preserves_order_and_count() {
        let bucket = vec![
            frag(&["Avoid", "heavy", "lifting"]),
            frag(&["Stop"]),
            frag(&["Do", "not", "bathe", "for", "3", "days"]),
        ];
        let records = build_records(&bucket, DirectiveKind::DoNot);
        assert_eq!(records.len(), bucket.len());
        for (r, f) in records.iter().zip(&bucket) {
            assert_eq!(r.message, f.message());
            assert_eq!(r.kind, DirectiveKind::DoNot);
        }
        assert_eq!(records[2].time(), 3);
        assert_eq!(records[2].unit(), "days");
    }

    #[test]
    fn huge_quantity_saturates_on_the_wire() {
        let r = DirectiveRecord {
            kind: DirectiveKind::Do,
            time_frame: TimeFrame::new(u64::MAX, "days"),
            message: "Rest".into(),
        };
        assert_eq!(r.time(), i64::MAX);

        let r = DirectiveRecord::from_fragment(DirectiveKind::Do, &frag(&["Rest", "5000000000", "seconds"]));
        assert_eq!(serde_json::to_value(&r).unwrap()["time"], 5_000_000_000i64);
    }

    #[test]
    fn do_nots_come_first() {
        let c = Classification {
            do_nots: vec![frag(&["Avoid", "sun"])],
            dos: vec![frag(&["Eat", "well"]), frag(&["Drink", "water"])],
            unclassified: vec![],
        };
        let kinds: Vec<_> = build_all(&c).iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![DirectiveKind::DoNot, DirectiveKind::Do, DirectiveKind::Do]);
    }

    #[test]
    fn wire_round_trip_downgrades_bad_units() {
        let w: WireRecord = serde_json::from_str(
            r#"{"type": 1, "time": 2, "unit": "months", "message": "No swimming"}"#,
        )
        .unwrap();
        let r = DirectiveRecord::try_from(w).unwrap();
        assert!(r.time_frame.is_none());

        let w = WireRecord { kind: 0, time: 3, unit: "Days".into(), message: "Rest".into() };
        let r = DirectiveRecord::try_from(w).unwrap();
        assert_eq!(r.time_frame.map(|tf| tf.unit), Some(TimeUnit::Day));

        let w = WireRecord { kind: 0, time: -1, unit: "days".into(), message: "Rest".into() };
        assert!(DirectiveRecord::try_from(w).unwrap().time_frame.is_none());

        let w = WireRecord { kind: 7, time: 3, unit: "days".into(), message: "?".into() };
        assert!(DirectiveRecord::try_from(w).is_err());
    }
}
