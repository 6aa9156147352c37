use super::normalize::Fragment;

const DO_NOT_TRIGGERS: &[&str] = &["do not", "avoid", "stop", "don't"];

// "do" on its own matches nearly every sentence containing those two letters
// ("doctor", "done"). Kept as-is; the do bucket is knowingly noisy.
const DO_TRIGGERS: &[&str] = &["do", "have", "start", "drink", "eat", "may", "when", "take"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Do,
    DoNot,
}

impl DirectiveKind {
    /// Integer used on the wire: 1 for do-not, 0 for do.
    pub fn wire_value(self) -> u8 {
        match self {
            DirectiveKind::Do => 0,
            DirectiveKind::DoNot => 1,
        }
    }

    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(DirectiveKind::Do),
            1 => Some(DirectiveKind::DoNot),
            _ => None,
        }
    }
}

/// Result of partitioning every page's fragments. A fragment lands in exactly
/// one of `do_nots`, `dos` or its page's `unclassified` list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub do_nots: Vec<Fragment>,
    pub dos: Vec<Fragment>,
    pub unclassified: Vec<Vec<Fragment>>,
}

impl Classification {
    pub fn bucket(&self, kind: DirectiveKind) -> &[Fragment] {
        match kind {
            DirectiveKind::Do => &self.dos,
            DirectiveKind::DoNot => &self.do_nots,
        }
    }
}

/// Decide which bucket a fragment belongs to; do-not triggers win.
pub fn classify_fragment(fragment: &Fragment) -> Option<DirectiveKind> {
    let sentence = fragment.message().to_lowercase();
    if contains_any(&sentence, DO_NOT_TRIGGERS) {
        Some(DirectiveKind::DoNot)
    } else if contains_any(&sentence, DO_TRIGGERS) {
        Some(DirectiveKind::Do)
    } else {
        None
    }
}

/// Partition fragments page by page, moving each into its bucket.
pub fn classify(pages: Vec<Vec<Fragment>>) -> Classification {
    let mut out = Classification {
        unclassified: Vec::with_capacity(pages.len()),
        ..Default::default()
    };

    for page in pages {
        let mut residual = Vec::new();
        for fragment in page {
            match classify_fragment(&fragment) {
                Some(DirectiveKind::DoNot) => out.do_nots.push(fragment),
                Some(DirectiveKind::Do) => out.dos.push(fragment),
                None => residual.push(fragment),
            }
        }
        out.unclassified.push(residual);
    }

    out
}

fn contains_any(sentence: &str, triggers: &[&str]) -> bool {
    triggers.iter().any(|t| sentence.contains(t))
}
