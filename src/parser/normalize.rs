use std::sync::LazyLock;

use regex::Regex;

/// Glyphs that end a sentence as far as splitting is concerned: question marks,
/// the bullet (and its UTF-8-read-as-Latin-1 form) and the middle dot.
static TERMINATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?|â€¢|•|·").unwrap());

/// A sentence-like run of non-empty tokens taken from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    tokens: Vec<String>,
}

impl Fragment {
    /// Returns `None` when no tokens survive, so empty fragments never exist.
    pub fn from_tokens<I, S>(tokens: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            None
        } else {
            Some(Fragment { tokens })
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Tokens rejoined with single spaces, original casing kept.
    pub fn message(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Split every page into fragments, keeping page order.
pub fn normalize_pages<S: AsRef<str>>(pages: &[S]) -> Vec<Vec<Fragment>> {
    pages.iter().map(|p| normalize_page(p.as_ref())).collect()
}

/// Clean one page of extracted text and split it into fragments.
///
/// Hard line breaks are dropped outright (not turned into spaces), alternate
/// terminators become `.`, and the text is split on `.` and then on whitespace.
pub fn normalize_page(text: &str) -> Vec<Fragment> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let joined = text.replace('\n', "");
    let unified = TERMINATOR_RE.replace_all(&joined, ".");

    unified
        .split('.')
        .filter_map(|raw| Fragment::from_tokens(raw.split_whitespace()))
        .collect()
}
