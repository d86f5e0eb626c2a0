use crate::lexicon::PhraseSet;

/// Best-effort disclosure signal: an explicit search flag OR answer wording
/// that implies a lookup happened. Can under- and over-report.
#[derive(Debug, Clone)]
pub struct SearchUsageDetector {
    phrases: PhraseSet,
}

impl SearchUsageDetector {
    pub fn new(phrases: PhraseSet) -> Self {
        Self { phrases }
    }

    pub fn detect(&self, answer: &str, search_was_performed: bool) -> bool {
        search_was_performed || self.phrases.matches(answer)
    }
}
