pub mod classify;
pub mod normalize;
pub mod records;
pub mod timeframe;

use tracing::debug;

use classify::Classification;
use normalize::Fragment;
use records::DirectiveRecord;

/// Output of one pipeline run over a document's pages.
#[derive(Debug, Clone)]
pub struct Extraction {
    records: Vec<DirectiveRecord>,
    unclassified: Vec<Vec<Fragment>>,
}

impl Extraction {
    /// Every classified fragment, with or without a time frame.
    pub fn records(&self) -> &[DirectiveRecord] {
        &self.records
    }

    /// Only records whose time frame was found.
    pub fn resolved(&self) -> impl Iterator<Item = &DirectiveRecord> {
        self.records.iter().filter(|r| r.is_resolved())
    }

    /// Fragments that matched no trigger, grouped by page.
    pub fn unclassified(&self) -> &[Vec<Fragment>] {
        &self.unclassified
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved().count()
    }

    pub fn into_records(self) -> Vec<DirectiveRecord> {
        self.records
    }
}

/// Four-stage pipeline: page text → fragments → do/do-not buckets → records.
pub fn process_pages<S: AsRef<str>>(pages: &[S]) -> Extraction {
    let fragments = normalize::normalize_pages(pages);
    let classification = classify::classify(fragments);
    debug!(
        do_nots = classification.do_nots.len(),
        dos = classification.dos.len(),
        "classified fragments"
    );

    let records = records::build_all(&classification);
    let Classification { unclassified, .. } = classification;
    Extraction {
        records,
        unclassified,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use classify::DirectiveKind;

    fn fixture_pages() -> Vec<String> {
        let raw = std::fs::read_to_string("tests/fixtures/discharge.txt").unwrap();
        raw.split('\u{c}').map(str::to_string).collect()
    }

    #[test]
    fn bathe_and_drink() {
        let out = process_pages(&["Do not bathe for 3 days. Drink fluids."]);
        let json = serde_json::to_value(out.records()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"type": 1, "time": 3, "unit": "days", "message": "Do not bathe for 3 days"},
                {"type": 0, "time": -1, "unit": "not found", "message": "Drink fluids"}
            ])
        );
        assert_eq!(out.resolved_count(), 1);
    }

    #[test]
    fn empty_document() {
        let out = process_pages::<&str>(&[]);
        assert!(out.records().is_empty());
        let out = process_pages(&["", "   "]);
        assert!(out.records().is_empty());
        assert_eq!(out.unclassified().len(), 2);
    }

    #[test]
    fn single_token_stop() {
        let out = process_pages(&["Stop."]);
        assert_eq!(out.records().len(), 1);
        assert_eq!(out.records()[0].kind, DirectiveKind::DoNot);
        assert!(!out.records()[0].is_resolved());
    }

    #[test]
    fn fixture_document() {
        let pages = fixture_pages();
        assert_eq!(pages.len(), 2);
        let out = process_pages(&pages);

        let resolved: Vec<_> = out.resolved().map(|r| (r.kind, r.time(), r.unit())).collect();
        assert_eq!(
            resolved,
            vec![
                (DirectiveKind::DoNot, 24, "hours"),
                (DirectiveKind::DoNot, 2, "weeks"),
                (DirectiveKind::DoNot, 48, "hours"),
                (DirectiveKind::Do, 1, "week"),
                (DirectiveKind::Do, 30, "minutes"),
            ]
        );

        let first_do = out
            .records()
            .iter()
            .position(|r| r.kind == DirectiveKind::Do)
            .unwrap();
        assert!(out.records()[..first_do].iter().all(|r| r.kind == DirectiveKind::DoNot));
        assert!(out.records()[first_do..].iter().all(|r| r.kind == DirectiveKind::Do));

        let leftovers: Vec<String> = out.unclassified()[0].iter().map(Fragment::message).collect();
        assert_eq!(leftovers, vec!["DISCHARGE INSTRUCTIONS", "Procedure: Colonoscopy"]);
    }

    #[test]
    fn same_input_same_output() {
        let pages = fixture_pages();
        let a = serde_json::to_string(process_pages(&pages).records()).unwrap();
        let b = serde_json::to_string(process_pages(&pages).records()).unwrap();
        assert_eq!(a, b);
    }
}
