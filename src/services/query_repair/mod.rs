pub mod parser;
pub mod template;

pub use parser::RepairOutputParser;
pub use template::{
    format_prior_turns, PriorTurn, RepairPromptInputs, RepairTemplate, TemplateVersion,
};

use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::RepairConfig;
use crate::error::{RagSessionError, Result};
use crate::models::{normalize_whitespace, RepairContext};
use crate::services::llm::{GenerateRequest, TextGenerator};

pub const ADVISORY_DISABLED: &str = "query repair is disabled";
pub const ADVISORY_MALFORMED: &str = "query repair produced no usable rewrite";
pub const ADVISORY_CONSTRAINTS: &str =
    "rewrite dropped explicit constraints of the original query; original appended";

const MAX_QUESTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RepairSettings {
    pub enabled: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Each prior turn is cut to this many characters in the prompt
    pub prior_turn_chars: usize,
    pub max_questions: usize,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self::from_config(&RepairConfig::default())
    }
}

impl RepairSettings {
    pub fn from_config(config: &RepairConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_tokens: config.max_tokens,
            temperature: config.temperature as f32,
            timeout: config.timeout(),
            prior_turn_chars: config.prior_turn_chars,
            max_questions: MAX_QUESTIONS,
        }
    }
}

/// Everything one repair run sees about the conversation
#[derive(Debug, Clone, Copy)]
pub struct RepairRequest<'a> {
    pub query: &'a str,
    pub summary_all: &'a str,
    pub summary_recent: &'a str,
    pub prior_turns: &'a [PriorTurn],
}

impl<'a> RepairRequest<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            summary_all: "",
            summary_recent: "",
            prior_turns: &[],
        }
    }

    pub fn with_summaries(mut self, summary_all: &'a str, summary_recent: &'a str) -> Self {
        self.summary_all = summary_all;
        self.summary_recent = summary_recent;
        self
    }

    pub fn with_prior_turns(mut self, prior_turns: &'a [PriorTurn]) -> Self {
        self.prior_turns = prior_turns;
        self
    }
}

/// Rewrites context-dependent queries into self-contained ones.
///
/// `repair` never fails: a disabled engine, a generation error, a timeout or
/// unusable output all return the original query with a single advisory.
pub struct QueryRepairEngine {
    generator: Arc<dyn TextGenerator>,
    template: RepairTemplate,
    parser: RepairOutputParser,
    settings: RepairSettings,
    numeric: Regex,
    quoted: Regex,
}

impl QueryRepairEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        template: RepairTemplate,
        settings: RepairSettings,
    ) -> Result<Self> {
        let numeric = Regex::new(r"\d+(?:[.,:/\-]\d+)*")
            .map_err(|e| RagSessionError::unknown(format!("numeric pattern: {e}")))?;
        let quoted = Regex::new(r#""([^"]+)"|“([^”]+)”|「([^」]+)」"#)
            .map_err(|e| RagSessionError::unknown(format!("quote pattern: {e}")))?;

        Ok(Self {
            generator,
            template,
            parser: RepairOutputParser::new()?,
            settings,
            numeric,
            quoted,
        })
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &RepairConfig) -> Result<Self> {
        let template = RepairTemplate::from_config(config)?;
        Self::new(generator, template, RepairSettings::from_config(config))
    }

    pub fn settings(&self) -> &RepairSettings {
        &self.settings
    }

    pub fn template(&self) -> &RepairTemplate {
        &self.template
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn render_prompt(&self, request: &RepairRequest<'_>) -> String {
        let inputs = RepairPromptInputs {
            user_query: request.query,
            summary_all: request.summary_all,
            summary_recent: request.summary_recent,
            prior_turns: request.prior_turns,
        };
        self.template.render(&inputs, self.settings.prior_turn_chars)
    }

    pub async fn repair(&self, request: RepairRequest<'_>) -> RepairContext {
        let query = request.query;
        if !self.settings.enabled {
            return RepairContext::fallback(query, ADVISORY_DISABLED);
        }

        let started = Instant::now();
        let prompt = self.render_prompt(&request);
        let generate = GenerateRequest::new(prompt)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);

        let response =
            match tokio::time::timeout(self.settings.timeout, self.generator.generate(generate)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(error = %e, "Query repair generation failed, using original query");
                    return RepairContext::fallback(
                        query,
                        format!("query repair generation failed: {}", e.user_message()),
                    );
                }
                Err(_) => {
                    warn!(
                        timeout_secs = self.settings.timeout.as_secs_f64(),
                        "Query repair timed out, using original query"
                    );
                    return RepairContext::fallback(
                        query,
                        format!(
                            "query repair timed out after {:.1}s",
                            self.settings.timeout.as_secs_f64()
                        ),
                    );
                }
            };

        let mut context = self.parser.parse(&response.text);
        if context.improved_query.trim().is_empty() {
            warn!(
                output_chars = response.text.chars().count(),
                "Query repair output had no improved query"
            );
            return RepairContext::fallback(query, ADVISORY_MALFORMED);
        }

        self.apply_guards(query, &mut context);
        info!(
            rewritten = context.is_rewrite_of(query),
            corrections = context.corrections.len(),
            assumptions = context.assumptions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query repaired"
        );
        context
    }

    fn apply_guards(&self, original: &str, context: &mut RepairContext) {
        context.questions.truncate(self.settings.max_questions);
        context.improved_query = normalize_whitespace(&context.improved_query);

        if !context.is_rewrite_of(original) {
            context.improved_query = original.to_string();
            context.corrections.clear();
            context.assumptions.clear();
            return;
        }

        let missing = self.missing_constraints(original, &context.improved_query);
        if !missing.is_empty() {
            debug!(missing = ?missing, "Rewrite dropped constraints");
            context.improved_query = format!("{} ({})", context.improved_query, original.trim());
            context.advisories.push(ADVISORY_CONSTRAINTS.to_string());
        }
    }

    /// Digit-bearing tokens and quoted spans of `original` absent from `rewrite`
    pub fn missing_constraints(&self, original: &str, rewrite: &str) -> Vec<String> {
        let haystack = normalize_whitespace(rewrite).to_lowercase();
        let mut required: Vec<String> = self
            .numeric
            .find_iter(original)
            .map(|m| m.as_str().to_string())
            .collect();
        for caps in self.quoted.captures_iter(original) {
            if let Some(span) = caps.iter().skip(1).flatten().next() {
                required.push(normalize_whitespace(span.as_str()));
            }
        }

        let mut missing = Vec::new();
        for constraint in required {
            if constraint.is_empty() || haystack.contains(&constraint.to_lowercase()) {
                continue;
            }
            if !missing.contains(&constraint) {
                missing.push(constraint);
            }
        }
        missing
    }
}
