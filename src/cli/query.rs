use anyhow::Result;
use console::style;
use std::path::PathBuf;

use super::context::AppContext;
use crate::models::{QueryRequest, RepairContext};

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}", style(title).bold());
    for item in items {
        println!("  - {item}");
    }
}

fn print_repair(context: &RepairContext) {
    print_list("Corrections:", &context.corrections);
    print_list("Questions:", &context.questions);
    print_list("Sub-questions:", &context.sub_questions);
    print_list("Assumptions:", &context.assumptions);
    for advisory in &context.advisories {
        println!("{} {}", style("!").yellow(), style(advisory).yellow());
    }
}

pub async fn handle_repair_command(
    config_path: Option<PathBuf>,
    session_id: String,
    query: String,
) -> Result<()> {
    let context = AppContext::load(config_path.as_deref(), None)?;
    let repair = context
        .orchestrator
        .preview_repair(&session_id, &query)
        .await?;

    println!("{}", serde_json::to_string_pretty(&repair)?);
    context.shutdown().await
}

pub async fn handle_query_command(
    config_path: Option<PathBuf>,
    query: String,
    session: Option<String>,
    eval: bool,
    top_k: Option<usize>,
    contexts: Option<PathBuf>,
) -> Result<()> {
    let context = AppContext::load(config_path.as_deref(), contexts.as_deref())?;

    let mut request = QueryRequest::new(query)
        .with_eval_mode(eval)
        .with_top_k(top_k.unwrap_or(context.config.query.top_k));
    if let Some(session_id) = session {
        request = request.with_session(session_id);
    }

    let response = context.orchestrator.query(request).await?;

    println!("{} {}", style("Query:").dim(), response.used_query);
    if let Some(repair) = &response.repair_context {
        print_repair(repair);
    }
    println!();
    println!("{}", response.answer);

    if !response.files.is_empty() {
        println!();
        println!("{} {}", style("Sources:").dim(), response.files.join(", "));
    }
    for warning in &response.warnings {
        println!("{} {}", style("!").yellow(), style(warning).yellow());
    }
    println!(
        "{}",
        style(format!(
            "repair {:.2}s · retrieval {:.2}s · generation {:.2}s · total {:.2}s",
            response.timing.repair_sec,
            response.timing.retrieval_sec,
            response.timing.text_gen_sec,
            response.timing.total_sec
        ))
        .dim()
    );

    context.shutdown().await
}
