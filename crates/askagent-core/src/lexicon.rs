//! Phrase lists that drive routing and the stop/disclosure heuristics.
//!
//! All matching is plain case-insensitive substring containment. The lists are
//! configuration: `[lexicon]` in the TOML file replaces any of them, and tests
//! substitute fixture sets without touching control flow.

use serde::{Deserialize, Serialize};

/// An ordered set of phrases matched by substring containment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhraseSet(Vec<String>);

impl PhraseSet {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            phrases
                .into_iter()
                .map(|phrase| phrase.into().to_lowercase())
                .filter(|phrase| !phrase.trim().is_empty())
                .collect(),
        )
    }

    /// First phrase contained in `text`, if any.
    pub fn find(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.0
            .iter()
            .find(|phrase| lowered.contains(&phrase.to_lowercase()))
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Every phrase list the agent consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    /// Translation intent. Checked before research intent.
    pub translate_keywords: PhraseSet,
    /// Multi-step research intent.
    pub research_keywords: PhraseSet,
    /// Section headers that mark a finished research report.
    pub report_markers: PhraseSet,
    /// Wording that implies the answer was backed by a search or lookup.
    pub disclosure_phrases: PhraseSet,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            translate_keywords: PhraseSet::new([
                "번역해줘",
                "번역 해줘",
                "번역해 줘",
                "번역 부탁",
                "이 문서 번역",
                "이 파일 번역",
                "translate",
                "translation",
            ]),
            research_keywords: PhraseSet::new([
                "deep research",
                "딥리서치",
                "딥 리서치",
                "심층 조사",
                "심층 분석",
                "심층 리서치",
                "자세히 조사",
                "조사해줘",
                "리서치해줘",
                "research report",
            ]),
            report_markers: PhraseSet::new([
                "## 요약",
                "## 주요 발견",
                "## 분석",
                "## 출처",
                "## summary",
                "## key findings",
                "## findings",
                "## analysis",
                "## sources",
            ]),
            disclosure_phrases: PhraseSet::new([
                "검색해 본 결과",
                "검색한 결과",
                "검색 결과",
                "공식 사이트",
                "공식 웹사이트",
                "공식 홈페이지",
                "확인 결과",
                "조사 결과",
                "search results show",
                "according to search results",
                "official site confirms",
            ]),
        }
    }
}
