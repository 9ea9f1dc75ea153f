//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use plaint_core::db::Database;
use plaint_core::models::NewComplaint;
use plaint_core::{ComplaintAnalyzer, PatternClassifier, Profile};

use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn pattern_analyzer() -> ComplaintAnalyzer {
    ComplaintAnalyzer::new(PatternClassifier::builtin("appliances").unwrap())
}

fn seed(db: &Database) -> i64 {
    db.create_complaint(&NewComplaint::new("冰箱不制冷", "user_1", "冰箱", None))
        .unwrap()
        .id
}

// ========== Core Command Tests ==========

#[test]
fn test_open_db_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");

    let db = commands::open_db(&path, true).unwrap();
    assert!(!db.is_encrypted());
    assert!(path.exists());
}

#[test]
fn test_cmd_init() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("init.db");
    let profile = Profile::builtin("appliances").unwrap();

    let result = commands::cmd_init(&path, true, &profile);
    assert!(result.is_ok());
    assert!(path.exists());
}

#[test]
fn test_load_profile_by_name() {
    let profile = commands::load_profile(Some("telecom"), None).unwrap();
    assert_eq!(profile.name, "telecom");
}

#[test]
fn test_load_profile_unknown_name() {
    assert!(commands::load_profile(Some("no-such-profile"), None).is_err());
}

#[test]
fn test_load_profile_path_takes_precedence() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
name = "custom"
description = "Custom profile"

[fallback]
name = "其他"
reply = "感谢反馈"
problems = ["有问题"]

[[categories]]
name = "空调"
patterns = ["空调"]
reply = "空调问题已记录"
problems = ["不制冷"]

[simulation]
replies = ["已处理"]
"#
    )
    .unwrap();

    let profile = commands::load_profile(Some("telecom"), Some(file.path())).unwrap();
    assert_eq!(profile.name, "custom");
    assert_eq!(profile.all_category_names(), vec!["空调", "其他"]);
}

#[test]
fn test_build_analyzer_uses_profile() {
    let profile = Profile::builtin("telecom").unwrap();
    let analyzer = commands::build_analyzer(profile, None).unwrap();
    assert_eq!(analyzer.profile().name, "telecom");
}

// ========== Analyze and Simulate Tests ==========

#[tokio::test]
async fn test_cmd_analyze_without_db() {
    let analyzer = pattern_analyzer();
    let result = commands::cmd_analyze(&analyzer, None, "洗衣机漏水", None).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cmd_analyze_saves() {
    let db = setup_test_db();
    let analyzer = pattern_analyzer();

    commands::cmd_analyze(&analyzer, Some(&db), "  电视开机没有画面 ", Some("user_8"))
        .await
        .unwrap();

    let complaints = db.list_complaints(None, 0, 10).unwrap();
    assert_eq!(complaints.len(), 1);
    assert_eq!(complaints[0].content, "电视开机没有画面");
    assert_eq!(complaints[0].user_id, "user_8");
    assert_eq!(complaints[0].complaint_category, "电视");
    assert!(complaints[0].reply.is_some());
}

#[tokio::test]
async fn test_cmd_analyze_blank_text() {
    let analyzer = pattern_analyzer();
    assert!(commands::cmd_analyze(&analyzer, None, "  ", None)
        .await
        .is_err());
}

#[test]
fn test_cmd_simulate() {
    let db = setup_test_db();
    let profile = Profile::builtin("appliances").unwrap();

    commands::cmd_simulate(&db, &profile, 12, Some(7)).unwrap();

    assert_eq!(db.count_complaints(None).unwrap(), 12);
}

#[test]
fn test_cmd_simulate_rejects_bad_count() {
    let db = setup_test_db();
    let profile = Profile::builtin("appliances").unwrap();

    assert!(commands::cmd_simulate(&db, &profile, 0, None).is_err());
    assert!(commands::cmd_simulate(&db, &profile, 1001, None).is_err());
    assert_eq!(db.count_complaints(None).unwrap(), 0);
}

// ========== Complaint Command Tests ==========

#[tokio::test]
async fn test_cmd_complaints_list() {
    let db = setup_test_db();
    seed(&db);
    let analyzer = pattern_analyzer();

    assert!(commands::cmd_complaints_list(&db, &analyzer, None, 0, 20)
        .await
        .is_ok());
    assert!(
        commands::cmd_complaints_list(&db, &analyzer, Some("category:冰箱"), 0, 20)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_cmd_complaints_list_bad_query() {
    let db = setup_test_db();
    let analyzer = pattern_analyzer();

    let result =
        commands::cmd_complaints_list(&db, &analyzer, Some("Complaint.content =="), 0, 20).await;
    assert!(result.is_err());
}

#[test]
fn test_cmd_complaints_show() {
    let db = setup_test_db();
    let id = seed(&db);

    assert!(commands::cmd_complaints_show(&db, id).is_ok());
    assert!(commands::cmd_complaints_show(&db, id + 100).is_err());
}

#[test]
fn test_cmd_complaints_reply() {
    let db = setup_test_db();
    let id = seed(&db);

    commands::cmd_complaints_reply(&db, id, "已安排上门维修").unwrap();

    let complaint = db.get_complaint(id).unwrap().unwrap();
    assert_eq!(complaint.reply.as_deref(), Some("已安排上门维修"));
    // Other fields untouched
    assert_eq!(complaint.content, "冰箱不制冷");

    let audit = db.list_audit_log(10).unwrap();
    assert_eq!(audit[0].actor, "cli");
    assert_eq!(audit[0].action, "update");
}

#[test]
fn test_cmd_complaints_reply_not_found() {
    let db = setup_test_db();
    assert!(commands::cmd_complaints_reply(&db, 42, "已处理").is_err());
}

#[test]
fn test_cmd_complaints_delete() {
    let db = setup_test_db();
    let id = seed(&db);

    commands::cmd_complaints_delete(&db, id).unwrap();
    assert!(db.get_complaint(id).unwrap().is_none());

    // Second delete fails
    assert!(commands::cmd_complaints_delete(&db, id).is_err());
}

#[test]
fn test_cmd_stats() {
    let db = setup_test_db();
    assert!(commands::cmd_stats(&db).is_ok());

    seed(&db);
    assert!(commands::cmd_stats(&db).is_ok());
}

// ========== Import Tests ==========

#[tokio::test]
async fn test_cmd_import_json() {
    let db = setup_test_db();
    let analyzer = pattern_analyzer();

    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"[
            {{"complaint_time": "2024-01-02 10:00:00", "content": "冰箱噪音很大", "user_id": "user_1", "complaint_category": "冰箱"}},
            {{"complaint_time": "2024-01-03 11:30:00", "content": "洗衣机无法排水", "user_id": 2}},
            {{"content": "", "user_id": "user_3"}}
        ]"#
    )
    .unwrap();

    commands::cmd_import(&db, &analyzer, file.path()).await.unwrap();

    let complaints = db.list_complaints(None, 0, 10).unwrap();
    assert_eq!(complaints.len(), 2);
    assert_eq!(complaints[1].complaint_category, "洗衣机");

    // Re-importing the same file adds nothing
    commands::cmd_import(&db, &analyzer, file.path()).await.unwrap();
    assert_eq!(db.count_complaints(None).unwrap(), 2);
}

#[tokio::test]
async fn test_cmd_import_missing_file() {
    let db = setup_test_db();
    let analyzer = pattern_analyzer();

    let result =
        commands::cmd_import(&db, &analyzer, std::path::Path::new("/nonexistent/data.json")).await;
    assert!(result.is_err());
}

// ========== Prompts Tests ==========

#[test]
fn test_cmd_prompts_list() {
    assert!(commands::cmd_prompts_list().is_ok());
}

#[test]
fn test_cmd_prompts_show() {
    assert!(commands::cmd_prompts_show("classify_complaint").is_ok());
    assert!(commands::cmd_prompts_show("no_such_prompt").is_err());
}

// ========== Helpers ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a very long complaint", 10), "a very ...");
    // Counts characters, not bytes
    assert_eq!(truncate("冰箱不制冷食物都坏了", 6), "冰箱不...");
}

#[test]
fn test_complaint_time_preserved() {
    let db = setup_test_db();
    let mut new = NewComplaint::new("电视有问题", "user_4", "电视", None);
    new.complaint_time = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(8, 15, 0)
        .unwrap();
    let id = db.create_complaint(&new).unwrap().id;

    assert!(commands::cmd_complaints_show(&db, id).is_ok());
    assert_eq!(
        db.get_complaint(id).unwrap().unwrap().complaint_time,
        new.complaint_time
    );
}
