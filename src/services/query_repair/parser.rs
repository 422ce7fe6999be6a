use regex::Regex;

use crate::error::{RagSessionError, Result};
use crate::models::RepairContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Corrections,
    Questions,
    SubQuestions,
    ImprovedQuery,
    Assumptions,
}

impl Section {
    fn from_header(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace(' ', "_");
        match normalized.as_str() {
            "corrections" | "정정_대상" => Some(Section::Corrections),
            "questions" | "확인_질문" => Some(Section::Questions),
            "sub_questions" | "subquestions" | "하위_질문" => Some(Section::SubQuestions),
            "improved_query" | "개선된_질의" => Some(Section::ImprovedQuery),
            "assumptions" | "가정" => Some(Section::Assumptions),
            _ => None,
        }
    }
}

/// Reads the sectioned text produced by a repair template.
///
/// Headers may be English or Korean, optionally wrapped in markdown emphasis
/// or prefixed with `#`. List sections accept `-`, `*` and `•` bullets or
/// `1)` / `1.` numbering; lines saying "none" or "없음" are dropped.
#[derive(Debug, Clone)]
pub struct RepairOutputParser {
    header: Regex,
    list_marker: Regex,
}

impl RepairOutputParser {
    pub fn new() -> Result<Self> {
        let header = Regex::new(
            r"(?i)^[#>\s]*\**\s*(corrections|questions|sub[ _]?questions|improved[ _]query|assumptions|정정[ _]대상|확인[ _]질문|하위[ _]질문|개선된[ _]질의|가정)\s*\**\s*[:：]\s*\**\s*(.*)$",
        )
        .map_err(|e| RagSessionError::unknown(format!("repair header pattern: {e}")))?;
        let list_marker = Regex::new(r"^(?:[-*•]|\d+\)|\d+\.(?:\s|$))\s*")
            .map_err(|e| RagSessionError::unknown(format!("repair list pattern: {e}")))?;

        Ok(Self {
            header,
            list_marker,
        })
    }

    /// Parse generator output. `improved_query` is empty when the section is
    /// missing or blank; callers treat that as malformed output.
    pub fn parse(&self, text: &str) -> RepairContext {
        let mut context = RepairContext::default();
        let mut improved_lines: Vec<String> = Vec::new();
        let mut current: Option<Section> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();

            if let Some(caps) = self.header.captures(line) {
                current = caps.get(1).and_then(|m| Section::from_header(m.as_str()));
                let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
                if let Some(section) = current {
                    self.push_line(section, rest, &mut context, &mut improved_lines);
                }
                continue;
            }

            if let Some(section) = current {
                self.push_line(section, line, &mut context, &mut improved_lines);
            }
        }

        context.improved_query = improved_lines.join(" ").trim().to_string();
        context
    }

    fn push_line(
        &self,
        section: Section,
        line: &str,
        context: &mut RepairContext,
        improved_lines: &mut Vec<String>,
    ) {
        if line.is_empty() {
            return;
        }

        if section == Section::ImprovedQuery {
            let cleaned = strip_wrapping_quotes(line.trim_matches('*').trim());
            if !cleaned.is_empty() && !is_none_marker(cleaned) {
                improved_lines.push(cleaned.to_string());
            }
            return;
        }

        let items = match section {
            Section::Corrections => &mut context.corrections,
            Section::Questions => &mut context.questions,
            Section::SubQuestions => &mut context.sub_questions,
            Section::Assumptions => &mut context.assumptions,
            Section::ImprovedQuery => return,
        };

        let is_item = self.list_marker.is_match(line);
        let item = self.list_marker.replace(line, "");
        let item = item.trim();
        if item.is_empty() || is_none_marker(item) {
            return;
        }

        match items.last_mut() {
            // Wrapped continuation of the previous item
            Some(previous) if !is_item => {
                previous.push(' ');
                previous.push_str(item);
            }
            _ => items.push(item.to_string()),
        }
    }
}

fn strip_wrapping_quotes(text: &str) -> &str {
    let pairs = [('"', '"'), ('“', '”'), ('\'', '\''), ('「', '」')];
    for (open, close) in pairs {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner.trim();
        }
    }
    text
}

fn is_none_marker(text: &str) -> bool {
    let normalized = text
        .trim_matches(|c: char| c.is_whitespace() || "()[].-*".contains(c))
        .to_lowercase();
    matches!(
        normalized.as_str(),
        "" | "none" | "n/a" | "na" | "no" | "없음" | "해당 없음" | "해당없음" | "없습니다"
    )
}
