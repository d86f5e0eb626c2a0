//! Mode-specific system instructions and user-turn composition.

use crate::classifier::Mode;

const BASE_PROMPT: &str = "\
당신은 기업 및 의료 현장의 실무자를 돕는 신뢰할 수 있는 AI 어시스턴트입니다.
- 사용자의 언어로 답변합니다. 질문이 한국어이면 한국어로 답합니다.
- 모르는 내용은 추측하지 말고 모른다고 밝힙니다.
- 의료·법률 관련 내용은 일반 정보임을 명시하고 전문가 상담을 권합니다.
- 개인정보나 민감한 정보를 요구하거나 노출하지 않습니다.";

const ANALYZE_PROMPT: &str = "\
[요약·분석 규칙]
- 핵심 결론을 먼저 제시하고, 근거를 항목별로 정리합니다.
- 문서가 주어지면 문서 내용에 근거해 요약하고 분석합니다.
- 외부 자료를 확인했다면 어떤 자료를 근거로 했는지 밝힙니다.";

const TRANSLATE_PROMPT: &str = "\
[번역 규칙]
- 원문의 의미, 어조, 서식을 보존하여 번역합니다.
- 번역문만 출력하고 불필요한 설명을 덧붙이지 않습니다.
- 대상 언어가 명시되지 않았다면 한국어는 영어로, 그 외 언어는 한국어로 번역합니다.
- 전문 용어는 업계에서 통용되는 표현을 사용합니다.";

const RESEARCH_PROMPT: &str = "\
[심층 리서치 규칙]
- 제공된 웹 검색 결과를 우선 근거로 사용하고, 인용한 자료는 번호로 표시합니다.
- 정보가 부족하면 부족한 부분을 명확히 밝힙니다.
- 충분한 정보가 모였다면 다음 구조의 보고서로 답변합니다:
  ## 요약
  ## 주요 발견
  ## 분석
  ## 출처";

const DOCUMENT_HEADER: &str = "=== 첨부 문서 ===";
const QUESTION_HEADER: &str = "=== 질문 ===";

/// Question used when a document arrives without any instruction.
pub const DEFAULT_DOCUMENT_QUESTION: &str = "이 문서 번역해줘";

pub fn system_instruction(mode: Mode) -> String {
    let section = match mode {
        Mode::General => ANALYZE_PROMPT,
        Mode::Translate => TRANSLATE_PROMPT,
        Mode::Research => RESEARCH_PROMPT,
    };
    [BASE_PROMPT, section].join("\n\n").trim().to_string()
}

/// Builds the user turn. With no document and no search context the question
/// is passed through untouched.
pub fn compose_user_content(question: &str, document: Option<&str>, search_context: &str) -> String {
    let document = document.filter(|text| !text.trim().is_empty());
    if document.is_none() && search_context.is_empty() {
        return question.to_string();
    }

    let mut parts = Vec::with_capacity(3);
    if !search_context.is_empty() {
        parts.push(search_context.trim_end().to_string());
    }
    if let Some(document) = document {
        parts.push(format!("{DOCUMENT_HEADER}\n{document}"));
    }
    parts.push(format!("{QUESTION_HEADER}\n{question}"));
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_mode_gets_its_own_section() {
        let general = system_instruction(Mode::General);
        let translate = system_instruction(Mode::Translate);
        let research = system_instruction(Mode::Research);

        assert!(general.contains("[요약·분석 규칙]"));
        assert!(translate.contains("[번역 규칙]"));
        assert!(!translate.contains("[요약·분석 규칙]"));
        assert!(research.contains("## 출처"));
        assert!(general.starts_with(BASE_PROMPT.lines().next().unwrap()));
    }

    #[test]
    fn bare_question_is_untouched() {
        assert_eq!(compose_user_content("질문", None, ""), "질문");
        assert_eq!(compose_user_content("질문", Some("  "), ""), "질문");
    }

    #[test]
    fn context_precedes_question() {
        let content = compose_user_content("q", Some("doc body"), "=== 웹 검색 결과 ===\n\n[1] t\n");
        let search = content.find("[1] t").unwrap();
        let doc = content.find("doc body").unwrap();
        let question = content.find(QUESTION_HEADER).unwrap();
        assert!(search < doc && doc < question);
    }
}
