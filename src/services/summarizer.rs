use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SummaryConfig;
use crate::models::QaTurn;
use crate::services::llm::{GenerateRequest, TextGenerator};
use crate::utils::truncate_chars;

#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Target length of the whole-history summary, in characters
    pub summary_all_chars: usize,
    /// Target length of the recent-window summary, in characters
    pub summary_recent_chars: usize,
    /// Each answer is cut to this many characters in the prompt
    pub answer_chars: usize,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self::from_config(&SummaryConfig::default())
    }
}

impl SummarizerSettings {
    pub fn from_config(config: &SummaryConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature as f32,
            timeout: config.timeout(),
            summary_all_chars: config.summary_all_chars,
            summary_recent_chars: config.summary_recent_chars,
            answer_chars: config.answer_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SummaryKind {
    All,
    Recent,
}

impl SummaryKind {
    fn label(self) -> &'static str {
        match self {
            SummaryKind::All => "summary_all",
            SummaryKind::Recent => "summary_recent",
        }
    }
}

/// Keeps the rolling session summaries current.
///
/// Every call is best effort: a failed, slow or empty generation yields the
/// previous summary unchanged.
pub struct SessionSummarizer {
    generator: Arc<dyn TextGenerator>,
    settings: SummarizerSettings,
}

impl SessionSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: SummarizerSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    pub async fn summarize_all(&self, turns: &[QaTurn], previous: &str) -> String {
        if turns.is_empty() {
            return String::new();
        }
        let prompt = self.build_all_prompt(turns);
        self.generate_summary(SummaryKind::All, prompt, previous).await
    }

    /// Summarize the last `window` turns, or all of them when there are fewer
    pub async fn summarize_recent(&self, turns: &[QaTurn], window: usize, previous: &str) -> String {
        if turns.is_empty() || window == 0 {
            return String::new();
        }
        let recent = &turns[turns.len().saturating_sub(window)..];
        let prompt = self.build_recent_prompt(recent);
        self.generate_summary(SummaryKind::Recent, prompt, previous).await
    }

    /// Both summaries, generated concurrently
    pub async fn summarize_both(
        &self,
        turns: &[QaTurn],
        window: usize,
        previous_all: &str,
        previous_recent: &str,
    ) -> (String, String) {
        tokio::join!(
            self.summarize_all(turns, previous_all),
            self.summarize_recent(turns, window, previous_recent)
        )
    }

    async fn generate_summary(&self, kind: SummaryKind, prompt: String, previous: &str) -> String {
        let request = GenerateRequest::new(prompt)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);

        let response =
            match tokio::time::timeout(self.settings.timeout, self.generator.generate(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(kind = kind.label(), error = %e, "Summary generation failed, keeping previous");
                    return previous.to_string();
                }
                Err(_) => {
                    warn!(
                        kind = kind.label(),
                        timeout_secs = self.settings.timeout.as_secs_f64(),
                        "Summary generation timed out, keeping previous"
                    );
                    return previous.to_string();
                }
            };

        let text = response.text.trim();
        if text.is_empty() {
            warn!(kind = kind.label(), "Summary generation returned nothing, keeping previous");
            return previous.to_string();
        }

        let limit = match kind {
            SummaryKind::All => self.settings.summary_all_chars,
            SummaryKind::Recent => self.settings.summary_recent_chars,
        };
        let summary = truncate_chars(text, limit.saturating_mul(2)).to_string();
        debug!(kind = kind.label(), chars = summary.chars().count(), "Summary generated");
        summary
    }

    fn format_turns(&self, turns: &[QaTurn]) -> String {
        let mut lines = Vec::with_capacity(turns.len() * 2);
        for turn in turns {
            lines.push(format!("Q{}: {}", turn.turn_id, turn.user_query));
            lines.push(format!(
                "A{}: {}",
                turn.turn_id,
                truncate_chars(&turn.answer, self.settings.answer_chars)
            ));
        }
        lines.join("\n")
    }

    fn build_all_prompt(&self, turns: &[QaTurn]) -> String {
        format!(
            r#"Below is the full history of a conversation between a user and a document question-answering assistant.

{messages}

Summarize the main topics, recurring questions and the key facts given in the answers, in at most {limit} characters.
Write in the same language as the conversation. Reply with the summary only.

Summary:"#,
            messages = self.format_turns(turns),
            limit = self.settings.summary_all_chars,
        )
    }

    fn build_recent_prompt(&self, turns: &[QaTurn]) -> String {
        format!(
            r#"Below are the {count} most recent question/answer pairs of a conversation with a document question-answering assistant.

{messages}

Summarize the topic currently under discussion and any question that is still open, in at most {limit} characters.
Write in the same language as the conversation. Reply with the summary only.

Summary:"#,
            count = turns.len(),
            messages = self.format_turns(turns),
            limit = self.settings.summary_recent_chars,
        )
    }
}
