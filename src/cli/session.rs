use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;

use super::context::AppContext;
use crate::models::{ConversationMessage, SessionResponse};
use crate::utils::{format_timestamp, truncate_chars};

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("{} {}", style("!").yellow(), style(warning).yellow());
    }
}

fn print_session(response: &SessionResponse) {
    println!("  Session:        {}", style(&response.session_id).cyan());
    println!("  Turns:          {}", response.turns);
    println!("  Created:        {}", format_timestamp(&response.created_at));
    println!(
        "  Last accessed:  {}",
        format_timestamp(&response.last_accessed_at)
    );
    print_warnings(&response.warnings);
}

pub async fn handle_init_command(
    config_path: Option<PathBuf>,
    session_id: String,
    keep: bool,
) -> Result<()> {
    let context = AppContext::load(config_path.as_deref(), None)?;
    let response = context.orchestrator.init(&session_id, !keep).await?;

    let verb = if keep { "ready" } else { "initialized" };
    println!("{} Session {}", style("✓").green(), verb);
    print_session(&response);

    context.shutdown().await
}

pub async fn handle_switch_command(
    config_path: Option<PathBuf>,
    session_id: String,
    file: PathBuf,
) -> Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read history file: {}", file.display()))?;
    let messages: Vec<ConversationMessage> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history file: {}", file.display()))?;

    let context = AppContext::load(config_path.as_deref(), None)?;
    let count = messages.len();
    let response = context.orchestrator.switch(&session_id, messages).await?;

    println!(
        "{} Switched session history ({} messages)",
        style("✓").green(),
        count
    );
    print_session(&response);
    if !response.summary_all.is_empty() {
        println!();
        println!("{}", style("Summary (all):").bold());
        println!("  {}", response.summary_all);
    }
    if !response.summary_recent.is_empty() {
        println!("{}", style("Summary (recent):").bold());
        println!("  {}", response.summary_recent);
    }

    context.shutdown().await
}

pub async fn handle_show_command(config_path: Option<PathBuf>, session_id: String) -> Result<()> {
    let context = AppContext::load(config_path.as_deref(), None)?;
    let (session, warnings) = context.orchestrator.history(&session_id).await?;

    println!("{}", style(format!("Session {}", session.id)).bold());
    println!("  Created:        {}", format_timestamp(&session.created_at));
    println!("  Updated:        {}", format_timestamp(&session.updated_at));
    println!(
        "  Last accessed:  {}",
        format_timestamp(&session.last_accessed_at)
    );
    print_warnings(&warnings);

    println!();
    println!("{}", style("Summary (all):").bold());
    println!("  {}", display_or_none(&session.summary_all));
    println!("{}", style("Summary (recent):").bold());
    println!("  {}", display_or_none(&session.summary_recent));

    println!();
    if session.is_empty() {
        println!("{}", style("No turns yet.").dim());
    } else {
        println!("{}", style(format!("Turns ({}):", session.turn_count())).bold());
        for turn in session.turns() {
            println!(
                "  {} {}",
                style(format!("[{}]", turn.turn_id)).cyan(),
                style(format_timestamp(&turn.created_at)).dim()
            );
            println!("    Q: {}", turn.user_query);
            println!("    A: {}", truncate_chars(&turn.answer, 200));
        }
    }

    context.shutdown().await
}

pub async fn handle_sweep_command(config_path: Option<PathBuf>, daemon: bool) -> Result<()> {
    let mut context = AppContext::load(config_path.as_deref(), None)?;

    if daemon {
        let interval = context.config.session.sweep_interval();
        println!(
            "{} Sweeping every {}s, press Ctrl-C to stop",
            style("▶").cyan(),
            interval.as_secs()
        );
        context.start_sweeper();
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        println!("{} Stopping sweeper", style("■").dim());
    } else {
        let removed = context.cache().sweep_expired().await;
        println!("{} Removed {} expired session(s)", style("✓").green(), removed);
    }

    context.shutdown().await
}

fn display_or_none(text: &str) -> &str {
    if text.is_empty() {
        "(none)"
    } else {
        text
    }
}
