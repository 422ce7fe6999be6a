//! Versioned, data-only prompt templates for query repair.

use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use crate::config::RepairConfig;
use crate::error::{RagSessionError, Result};
use crate::services::qa_index::SearchHit;
use crate::utils::truncate_chars;

pub const PLACEHOLDERS: [&str; 4] = ["user_query", "summary_all", "summary_recent", "prior_turns"];

pub const NO_PRIOR_TURNS: &str = "(no prior QA)";
pub const EMPTY_SUMMARY: &str = "(none)";

const TEMPLATE_V1: &str = r#"[Role]
You repair follow-up questions in a multi-turn conversation. Find the parts of the current question that only make sense with earlier turns, and rewrite it into a self-contained query that can be sent to document search as is.

[Steps]
1. Self-reflection: find pronouns, elided subjects and comparisons whose reference is unclear. Flag any earlier answer that looks unreliable.
2. Decomposition: if the question bundles several questions, list them separately.
3. Contextual rewrite: resolve the unclear references using the earlier turns and summaries. Keep every constraint the user stated (units, time ranges, names) and do not invent new ones.
4. Assumption tracking: record every resolution you made without the user confirming it.

[Input]
Current question: {user_query}
Conversation summary: {summary_all}
Recent summary: {summary_recent}
Related earlier turns:
{prior_turns}

[Output] Print the five sections below with exactly these names and in this order. Write "- none" under a section with nothing to report.
Corrections:
- (turn_id=N) unclear expression or doubtful answer -> how it was resolved
Questions:
1) a closed question worth confirming with the user (at most 3)
Sub_questions:
- one sub-question per line
Improved_query:
one or two sentences that are understandable without the earlier conversation
Assumptions:
- an interpretation adopted without confirmation

[Rules]
- Earlier turns are hints, not facts.
- Do not add knowledge that is not in the conversation.
- If nothing is ambiguous, copy the current question into Improved_query and write "- none" under Corrections and Assumptions.
"#;

const TEMPLATE_V2: &str = r#"[역할]
당신은 다중 턴 대화의 질의 보정기입니다. 현재 질문이 이전 대화에 기대고 있는 부분을 찾아, 문서 검색에 그대로 쓸 수 있는 독립적인 질의로 다시 씁니다.

[절차]
1. 자기 점검: 현재 질문에서 대명사, 생략된 주어, 비교 대상이 불분명한 표현을 찾습니다. 신뢰하기 어려운 이전 답변이 있으면 함께 표시합니다.
2. 분해: 질문에 여러 하위 질문이 섞여 있으면 나눕니다.
3. 맥락 재작성: 이전 대화와 요약을 근거로 모호한 표현을 구체적인 명사로 바꿉니다. 단위, 기간, 고유명사처럼 사용자가 밝힌 조건은 그대로 두고 새 조건을 만들지 않습니다.
4. 가정 기록: 사용자 확인 없이 해소한 모호함은 모두 가정으로 적습니다.

[입력]
현재 질문: {user_query}
전체 대화 요약: {summary_all}
최근 대화 요약: {summary_recent}
관련 이전 QA:
{prior_turns}

[출력 형식] 아래 다섯 항목을 이 이름과 순서 그대로 출력합니다. 쓸 내용이 없는 항목에는 "- 없음"이라고 씁니다.
정정_대상:
- (turn_id=N) 모호한 표현 또는 의심되는 답변 -> 해석 결과
확인_질문:
1) 사용자에게 확인하면 좋을 닫힌 질문 (최대 3개)
하위_질문:
- 한 줄에 하나씩
개선된_질의:
이전 대화를 보지 않아도 이해되는 한두 문장의 질의
가정:
- 확인 없이 채택한 해석

[제약]
- 이전 QA는 참고용 힌트일 뿐 사실로 단정하지 않습니다.
- 대화에 없는 외부 지식을 더하지 않습니다.
- 모호한 부분이 없으면 개선된_질의에 현재 질문을 그대로 쓰고 정정_대상과 가정은 "- 없음"으로 둡니다.
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateVersion {
    /// English instructions
    V1,
    /// Korean instructions
    #[default]
    V2,
}

impl TemplateVersion {
    pub fn body(self) -> &'static str {
        match self {
            TemplateVersion::V1 => TEMPLATE_V1,
            TemplateVersion::V2 => TEMPLATE_V2,
        }
    }
}

impl FromStr for TemplateVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" | "en" => Ok(TemplateVersion::V1),
            "v2" | "2" | "ko" => Ok(TemplateVersion::V2),
            _ => Err(format!(
                "Unknown repair template version: {s}. Valid options: v1, v2"
            )),
        }
    }
}

impl std::fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateVersion::V1 => write!(f, "v1"),
            TemplateVersion::V2 => write!(f, "v2"),
        }
    }
}

/// A prior turn offered to the repair prompt as a hint
#[derive(Debug, Clone, PartialEq)]
pub struct PriorTurn {
    pub turn_id: i64,
    pub text: String,
    pub score: f32,
}

impl PriorTurn {
    pub fn new(turn_id: i64, text: impl Into<String>, score: f32) -> Self {
        Self {
            turn_id,
            text: text.into(),
            score,
        }
    }
}

impl From<&SearchHit<'_>> for PriorTurn {
    fn from(hit: &SearchHit<'_>) -> Self {
        Self::new(hit.turn.turn_id, hit.turn.document_text(), hit.score)
    }
}

/// Values substituted into a template
#[derive(Debug, Clone, Copy)]
pub struct RepairPromptInputs<'a> {
    pub user_query: &'a str,
    pub summary_all: &'a str,
    pub summary_recent: &'a str,
    pub prior_turns: &'a [PriorTurn],
}

/// `[turn_id=N]` blocks separated by blank lines, each cut to `max_chars`
pub fn format_prior_turns(turns: &[PriorTurn], max_chars: usize) -> String {
    if turns.is_empty() {
        return NO_PRIOR_TURNS.to_string();
    }

    turns
        .iter()
        .map(|turn| {
            format!(
                "[turn_id={}]\n{}",
                turn.turn_id,
                truncate_chars(&turn.text, max_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn or_none(summary: &str) -> &str {
    if summary.trim().is_empty() {
        EMPTY_SUMMARY
    } else {
        summary
    }
}

#[derive(Debug, Clone)]
pub struct RepairTemplate {
    name: String,
    body: String,
    placeholder: Regex,
}

impl RepairTemplate {
    pub fn builtin(version: TemplateVersion) -> Result<Self> {
        Self::from_body(version.to_string(), version.body())
    }

    /// Validate a template body; all four placeholders must be present
    pub fn from_body(name: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let body = body.into();
        let placeholder = Regex::new(r"\{([a-z_]+)\}")
            .map_err(|e| RagSessionError::unknown(format!("placeholder pattern: {e}")))?;

        let found: BTreeSet<&str> = placeholder
            .captures_iter(&body)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();
        let missing: Vec<&str> = PLACEHOLDERS
            .iter()
            .copied()
            .filter(|name| !found.contains(name))
            .collect();

        if !missing.is_empty() {
            return Err(RagSessionError::invalid_config(format!(
                "repair template '{name}' is missing placeholders: {}",
                missing
                    .iter()
                    .map(|p| format!("{{{p}}}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(Self {
            name,
            body,
            placeholder,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)?;
        Self::from_body(path.display().to_string(), body)
    }

    /// A file template wins over the built-in version
    pub fn from_config(config: &RepairConfig) -> Result<Self> {
        match &config.template_path {
            Some(path) => Self::load(path),
            None => {
                let version = config
                    .template
                    .parse::<TemplateVersion>()
                    .map_err(RagSessionError::invalid_config)?;
                Self::builtin(version)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Substitute placeholders in one pass, so braces inside user text are left alone
    pub fn render(&self, inputs: &RepairPromptInputs<'_>, prior_turn_chars: usize) -> String {
        let prior_turns = format_prior_turns(inputs.prior_turns, prior_turn_chars);

        self.placeholder
            .replace_all(&self.body, |caps: &Captures<'_>| match &caps[1] {
                "user_query" => inputs.user_query.to_string(),
                "summary_all" => or_none(inputs.summary_all).to_string(),
                "summary_recent" => or_none(inputs.summary_recent).to_string(),
                "prior_turns" => prior_turns.clone(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}
