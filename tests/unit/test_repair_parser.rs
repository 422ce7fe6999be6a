use ragsession::services::RepairOutputParser;

fn parse(text: &str) -> ragsession::models::RepairContext {
    RepairOutputParser::new().unwrap().parse(text)
}

#[test]
fn test_full_korean_output() {
    let ctx = parse(
        "정정_대상:\n- (turn_id=2) '거기' → 차량기지\n\n확인_질문:\n1) 고덕 차량기지를 말씀하시는 건가요?\n\n하위_질문:\n- 차량기지 위치\n- 운영 시간\n\n개선된_질의:\n고덕 차량기지의 운영 시간은 어떻게 되나요?\n\n가정:\n- '거기'는 turn 2의 차량기지",
    );

    assert_eq!(ctx.corrections, vec!["(turn_id=2) '거기' → 차량기지"]);
    assert_eq!(ctx.questions, vec!["고덕 차량기지를 말씀하시는 건가요?"]);
    assert_eq!(ctx.sub_questions, vec!["차량기지 위치", "운영 시간"]);
    assert_eq!(ctx.improved_query, "고덕 차량기지의 운영 시간은 어떻게 되나요?");
    assert_eq!(ctx.assumptions, vec!["'거기'는 turn 2의 차량기지"]);
    assert!(ctx.advisories.is_empty());
}

#[test]
fn test_none_markers_are_dropped() {
    let ctx = parse(
        "Corrections:\n- none\nQuestions:\n- N/A\nImproved_query:\nbrake pad replacement interval\nAssumptions:\n- (없음)\n- 해당 없음",
    );

    assert!(ctx.corrections.is_empty());
    assert!(ctx.questions.is_empty());
    assert!(ctx.assumptions.is_empty());
    assert_eq!(ctx.improved_query, "brake pad replacement interval");
}

#[test]
fn test_headers_are_case_and_spacing_tolerant() {
    let ctx = parse(
        "### IMPROVED QUERY:\nWhich depot handles line 2?\n**sub questions**:\n* depot list\n정정 대상：\n• 'there' → depot",
    );

    assert_eq!(ctx.improved_query, "Which depot handles line 2?");
    assert_eq!(ctx.sub_questions, vec!["depot list"]);
    assert_eq!(ctx.corrections, vec!["'there' → depot"]);
}

#[test]
fn test_numbered_questions_with_dots_and_parens() {
    let ctx = parse("확인_질문:\n1. 첫 번째?\n2) 두 번째?\n개선된_질의: 질의");
    assert_eq!(ctx.questions, vec!["첫 번째?", "두 번째?"]);
    assert_eq!(ctx.improved_query, "질의");
}

#[test]
fn test_decimal_continuation_is_not_a_list_marker() {
    let ctx = parse("Assumptions:\n- speed limit applies at\n3.5 km/h in the depot\nImproved_query: q");
    assert_eq!(
        ctx.assumptions,
        vec!["speed limit applies at 3.5 km/h in the depot"]
    );
}

#[test]
fn test_blank_improved_query_section() {
    let ctx = parse("개선된_질의:\n\n가정:\n- 무언가");
    assert!(ctx.improved_query.is_empty());
    assert_eq!(ctx.assumptions, vec!["무언가"]);
}
