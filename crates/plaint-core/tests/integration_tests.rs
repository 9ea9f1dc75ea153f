//! Integration tests for plaint-core
//!
//! These tests exercise intake → store → query workflows, with the language
//! model served by the mock server from `test_utils`.

use plaint_core::{
    ai::{AIBackend, AIClient, OllamaBackend, OpenAICompatibleBackend},
    analyzer::ComplaintAnalyzer,
    classifier::PatternClassifier,
    db::Database,
    import,
    models::{current_time, AnalysisSource, NewComplaint, Statistics},
    prompts::PromptLibrary,
    query::{CompareOp, Field, Filter, Value},
    simulate,
    test_utils::MockLlmServer,
};

fn classifier() -> PatternClassifier {
    PatternClassifier::builtin("appliances").expect("builtin profile")
}

fn openai_client(server: &MockLlmServer) -> AIClient {
    AIClient::OpenAICompatible(
        OpenAICompatibleBackend::with_api_key(&server.url(), "mock-model", "sk-test")
            .with_prompts(PromptLibrary::embedded_only()),
    )
}

fn ollama_client(server: &MockLlmServer) -> AIClient {
    AIClient::Ollama(
        OllamaBackend::new(&server.url(), "llama3.2").with_prompts(PromptLibrary::embedded_only()),
    )
}

fn category_filter(category: &str) -> Filter {
    Filter::Compare {
        field: Field::ComplaintCategory,
        op: CompareOp::Eq,
        value: Value::Text(category.to_string()),
    }
}

// =============================================================================
// Model-backed analysis
// =============================================================================

#[tokio::test]
async fn test_openai_compatible_analysis() {
    let server = MockLlmServer::start().await;
    let client = openai_client(&server);
    assert!(client.health_check().await);

    let analyzer = ComplaintAnalyzer::new(classifier()).with_ai(Some(client));
    let analysis = analyzer.analyze("冰箱不制冷，食物都坏了").await.unwrap();

    assert_eq!(analysis.category, "冰箱");
    assert_eq!(analysis.source, AnalysisSource::Llm);
    assert_eq!(analysis.reply, "您好，您反映的冰箱问题我们已收到，将尽快处理。");
    assert_eq!(server.request_count(), 2);
    assert_eq!(server.last_authorization().as_deref(), Some("Bearer sk-test"));
}

#[tokio::test]
async fn test_model_answer_outside_categories_uses_fallback() {
    let server = MockLlmServer::start().await;
    let analyzer = ComplaintAnalyzer::new(classifier()).with_ai(Some(openai_client(&server)));

    let classification = analyzer.classify("快递送错地址").await.unwrap();
    assert_eq!(classification.category, "未知");
    assert_eq!(classification.source, AnalysisSource::Llm);
}

#[tokio::test]
async fn test_ollama_analysis() {
    let server = MockLlmServer::start().await;
    let client = ollama_client(&server);
    assert!(client.health_check().await);

    let analyzer = ComplaintAnalyzer::new(classifier()).with_ai(Some(client));
    let analysis = analyzer.analyze("洗衣机脱水时声音很大").await.unwrap();

    assert_eq!(analysis.category, "洗衣机");
    assert!(analysis.reply.contains("洗衣机"));
}

#[tokio::test]
async fn test_natural_language_query_through_model() {
    let server = MockLlmServer::start().await;
    let analyzer = ComplaintAnalyzer::new(classifier()).with_ai(Some(openai_client(&server)));

    let filter = analyzer.parse_query("找出所有冰箱的投诉").await.unwrap();
    assert_eq!(filter, Some(category_filter("冰箱")));

    // Nothing recognizable: the model answers with no filter
    assert_eq!(analyzer.parse_query("全部").await.unwrap(), None);

    // Expression syntax never reaches the model
    let before = server.request_count();
    analyzer
        .parse_query("Complaint.complaint_category == '电视'")
        .await
        .unwrap();
    assert_eq!(server.request_count(), before);
}

#[tokio::test]
async fn test_failing_model_falls_back_and_is_recorded() {
    let server = MockLlmServer::start_failing().await;
    let db = Database::in_memory().unwrap();
    let analyzer = ComplaintAnalyzer::new(classifier())
        .with_ai(Some(openai_client(&server)))
        .with_metrics(db.clone());

    let analysis = analyzer.analyze("电视屏幕有条纹").await.unwrap();
    assert_eq!(analysis.category, "电视");
    assert_eq!(analysis.source, AnalysisSource::Pattern);
    assert_eq!(
        analysis.reply,
        "感谢您的反馈，我们对您的电视问题表示歉意，将尽快安排维修人员与您联系。"
    );

    let metrics = db.list_ai_metrics(10).unwrap();
    assert_eq!(metrics.len(), 2);
    assert!(metrics.iter().all(|m| !m.success));
    assert!(metrics[0]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("500"));

    let summary = db.ai_metric_summary().unwrap();
    assert!(summary.iter().all(|s| s.success_rate() == 0.0));
}

// =============================================================================
// Store workflows
// =============================================================================

#[tokio::test]
async fn test_intake_then_query_workflow() {
    let db = Database::in_memory().unwrap();
    let analyzer = ComplaintAnalyzer::new(classifier());

    for (content, user) in [
        ("电视无法开机", "u1"),
        ("冰箱噪音很大", "u2"),
        ("TV 遥控器失灵", "u1"),
        ("安装师傅迟到", "u3"),
    ] {
        let mut complaint = NewComplaint::new(content, user, "", None);
        complaint.complaint_category = None;
        let complaint = analyzer.complete(complaint).await.unwrap();
        db.create_complaint(&complaint).unwrap();
    }

    let stats = Statistics::from_counts(db.category_statistics().unwrap());
    assert_eq!(stats.total, 4);
    assert_eq!(stats.categories[0].category, "电视");
    assert_eq!(stats.categories[0].count, 2);

    let filter = analyzer.parse_query("category:电视 user:u1").await.unwrap();
    let found = db.list_complaints(filter.as_ref(), 0, 100).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|c| c.reply.is_some()));

    let filter = analyzer
        .parse_query("Complaint.complaint_category == '未知'")
        .await
        .unwrap();
    assert_eq!(db.count_complaints(filter.as_ref()).unwrap(), 1);
}

#[test]
fn test_simulated_batch_persists_atomically() {
    let db = Database::in_memory().unwrap();
    let profile = classifier().profile().clone();

    let batch = simulate::generate_seeded(&profile, 50, current_time(), Some(11));
    let created = db.create_complaints(&batch).unwrap();
    assert_eq!(created.len(), 50);

    let stats = Statistics::from_counts(db.category_statistics().unwrap());
    assert_eq!(stats.total, 50);
    let known = profile.all_category_names();
    assert!(stats
        .categories
        .iter()
        .all(|c| known.contains(&c.category.as_str())));

    let fridge = db.count_complaints(Some(&category_filter("冰箱"))).unwrap();
    let counted = stats
        .categories
        .iter()
        .find(|c| c.category == "冰箱")
        .map(|c| c.count)
        .unwrap_or(0);
    assert_eq!(fridge, counted);
}

#[tokio::test]
async fn test_reimport_skips_model_calls() {
    let server = MockLlmServer::start().await;
    let db = Database::in_memory().unwrap();
    let analyzer = ComplaintAnalyzer::new(classifier()).with_ai(Some(openai_client(&server)));

    let records = import::parse_json(
        r#"[
            {"complaint_time": "2024-05-01 09:00:00", "content": "冰箱不制冷", "user_id": "u1"},
            {"complaint_time": "2024-05-01 09:00:00", "content": "冰箱不制冷", "user_id": "u1"}
        ]"#
        .as_bytes(),
    )
    .unwrap();

    let first = import::import_records(&db, &analyzer, &records).await.unwrap();
    assert_eq!(first.imported, 1);
    assert_eq!(first.skipped_duplicate, 1);
    assert_eq!(first.classified, 1);
    let calls = server.request_count();
    assert!(calls > 0);

    let again = import::import_records(&db, &analyzer, &records).await.unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped_duplicate, 2);
    assert_eq!(again.classified, 0);
    assert_eq!(server.request_count(), calls);
}
