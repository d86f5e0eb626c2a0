//! Keyword routing of a question into a handling mode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lexicon::Lexicon;

/// Handling mode, fixed once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    General,
    Translate,
    Research,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::General => "general",
            Mode::Translate => "translate",
            Mode::Research => "research",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heuristic classifier. Favors precision: a missed intent falls back to
/// `general` rather than switching modes spuriously.
#[derive(Debug, Clone)]
pub struct ModeClassifier {
    lexicon: Lexicon,
}

impl ModeClassifier {
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    pub fn classify(&self, question: &str) -> Mode {
        if self.lexicon.translate_keywords.matches(question) {
            Mode::Translate
        } else if self.lexicon.research_keywords.matches(question) {
            Mode::Research
        } else {
            Mode::General
        }
    }
}

impl Default for ModeClassifier {
    fn default() -> Self {
        Self::new(Lexicon::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::PhraseSet;

    #[test]
    fn translation_beats_research() {
        let classifier = ModeClassifier::default();
        assert_eq!(
            classifier.classify("deep research 결과를 영어로 번역해줘"),
            Mode::Translate
        );
        assert_eq!(
            classifier.classify("Translate this deep research summary"),
            Mode::Translate
        );
    }

    #[test]
    fn unmatched_question_is_general() {
        let classifier = ModeClassifier::default();
        assert_eq!(classifier.classify("오늘 날씨 어때?"), Mode::General);
        assert_eq!(classifier.classify(""), Mode::General);
    }

    #[test]
    fn research_keywords_route_to_research() {
        let classifier = ModeClassifier::default();
        assert_eq!(
            classifier.classify("Deep Research: impact of X"),
            Mode::Research
        );
        assert_eq!(classifier.classify("전기차 시장 심층 조사"), Mode::Research);
    }

    #[test]
    fn fixture_lexicon_replaces_defaults() {
        let lexicon = Lexicon {
            translate_keywords: PhraseSet::new(["xlate"]),
            research_keywords: PhraseSet::new(["dig"]),
            ..Lexicon::default()
        };
        let classifier = ModeClassifier::new(lexicon);
        assert_eq!(classifier.classify("xlate and dig"), Mode::Translate);
        assert_eq!(classifier.classify("dig into it"), Mode::Research);
        assert_eq!(classifier.classify("translate me"), Mode::General);
    }
}
