#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedGenerator;
use ragsession::config::RepairConfig;
use ragsession::services::query_repair::{ADVISORY_DISABLED, ADVISORY_MALFORMED};
use ragsession::services::{
    PriorTurn, QueryRepairEngine, RepairRequest, RepairSettings, RepairTemplate, TemplateVersion,
};

const QUERIES: [&str; 5] = [
    "그거 주기가 어떻게 돼?",
    "What about the second one?",
    "  spaced   out  query ",
    "3호선 2024년 점검 일정",
    "\"Type B\" bogie inspection",
];

fn engine(generator: ScriptedGenerator, settings: RepairSettings) -> QueryRepairEngine {
    QueryRepairEngine::new(
        Arc::new(generator),
        RepairTemplate::builtin(TemplateVersion::V2).unwrap(),
        settings,
    )
    .unwrap()
}

#[tokio::test]
async fn test_disabled_repair_is_identity_for_every_input() {
    let generator = ScriptedGenerator::replying("Improved_query: should never be used");
    let engine = engine(
        generator,
        RepairSettings {
            enabled: false,
            ..Default::default()
        },
    );

    for query in QUERIES {
        let ctx = engine.repair(RepairRequest::new(query)).await;
        assert_eq!(ctx.improved_query, query);
        assert!(ctx.corrections.is_empty());
        assert!(ctx.assumptions.is_empty());
        assert_eq!(ctx.advisories, vec![ADVISORY_DISABLED]);
    }
}

#[tokio::test]
async fn test_unambiguous_query_is_kept() {
    let engine = engine(
        ScriptedGenerator::replying(
            "정정_대상:\n- 없음\n확인_질문:\n- 없음\n개선된_질의:\n열차 제동장치 점검 주기는 어떻게 되나요?\n가정:\n- 없음",
        ),
        RepairSettings::default(),
    );

    let ctx = engine
        .repair(RepairRequest::new("열차 제동장치 점검 주기는 어떻게 되나요?"))
        .await;
    assert_eq!(ctx.improved_query, "열차 제동장치 점검 주기는 어떻게 되나요?");
    assert!(ctx.assumptions.is_empty());
    assert!(ctx.corrections.is_empty());
    assert!(ctx.advisories.is_empty());
}

#[tokio::test]
async fn test_timeout_falls_back_to_original() {
    let generator = ScriptedGenerator::replying("Improved_query: late answer")
        .with_delay(Duration::from_millis(500));
    let engine = engine(
        generator,
        RepairSettings {
            timeout: Duration::from_millis(20),
            ..Default::default()
        },
    );

    let ctx = engine.repair(RepairRequest::new("그거 언제야?")).await;
    assert_eq!(ctx.improved_query, "그거 언제야?");
    assert_eq!(ctx.advisories.len(), 1);
    assert!(ctx.advisories[0].contains("timed out"));
}

#[tokio::test]
async fn test_failure_falls_back_with_single_advisory() {
    let engine = engine(ScriptedGenerator::failing(), RepairSettings::default());

    let ctx = engine.repair(RepairRequest::new("and then?")).await;
    assert_eq!(ctx.improved_query, "and then?");
    assert!(ctx.corrections.is_empty());
    assert!(ctx.assumptions.is_empty());
    assert_eq!(ctx.advisories.len(), 1);
}

#[tokio::test]
async fn test_malformed_output_falls_back() {
    let engine = engine(
        ScriptedGenerator::replying("정정_대상:\n- 뭔가 있음\n가정:\n- 가정"),
        RepairSettings::default(),
    );

    let ctx = engine.repair(RepairRequest::new("그건?")).await;
    assert_eq!(ctx.improved_query, "그건?");
    assert!(ctx.corrections.is_empty());
    assert_eq!(ctx.advisories, vec![ADVISORY_MALFORMED]);
}

#[tokio::test]
async fn test_rewrite_never_drops_quoted_constraint() {
    let engine = engine(
        ScriptedGenerator::replying("개선된_질의:\n대차 점검 절차는 무엇인가요?\n가정:\n- 대차"),
        RepairSettings::default(),
    );

    let ctx = engine
        .repair(RepairRequest::new("\"Type B\" 그거 점검 절차는?"))
        .await;
    assert!(ctx.improved_query.contains("Type B"));
    assert!(ctx.improved_query.starts_with("대차 점검 절차는 무엇인가요?"));
    assert_eq!(ctx.advisories.len(), 1);
    assert_eq!(ctx.assumptions, vec!["대차"]);
}

#[tokio::test]
async fn test_prompt_receives_summaries_and_prior_turns() {
    let generator = Arc::new(ScriptedGenerator::replying("개선된_질의:\n주기점검 주기"));
    let engine = QueryRepairEngine::new(
        generator.clone(),
        RepairTemplate::builtin(TemplateVersion::V1).unwrap(),
        RepairSettings::default(),
    )
    .unwrap();
    let prior = vec![PriorTurn::new(4, "Q: 정비 절차?\nA: 주기점검", 0.4)];

    engine
        .repair(
            RepairRequest::new("그거 주기는?")
                .with_summaries("정비 대화", "")
                .with_prior_turns(&prior),
        )
        .await;

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Current question: 그거 주기는?"));
    assert!(prompts[0].contains("Conversation summary: 정비 대화"));
    assert!(prompts[0].contains("Recent summary: (none)"));
    assert!(prompts[0].contains("[turn_id=4]"));
}

#[test]
fn test_template_file_must_have_all_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.txt");
    let bad = dir.path().join("bad.txt");
    std::fs::write(
        &good,
        "Q={user_query} S={summary_all} R={summary_recent} P={prior_turns}",
    )
    .unwrap();
    std::fs::write(&bad, "Q={user_query} only").unwrap();

    let config = RepairConfig {
        template_path: Some(good),
        ..Default::default()
    };
    assert!(RepairTemplate::from_config(&config).is_ok());

    let config = RepairConfig {
        template_path: Some(bad),
        ..Default::default()
    };
    let err = RepairTemplate::from_config(&config).unwrap_err();
    assert_eq!(err.category(), "config");
}
