use chrono::{Duration, Utc};
use serde_json::json;

use tutan_lib::agent_engine::state::TaskStatus;
use tutan_lib::perception::types::PerceptionMode;
use tutan_lib::storage::types::{SessionRecord, StepRecord, StepResult};
use tutan_lib::storage::{JsonlSessionStore, MemorySessionStore, SessionStore};

fn session(id: &str, minutes_ago: i64) -> SessionRecord {
    let mut record = SessionRecord::new(
        id.into(),
        "emulator-5554".into(),
        format!("task {id}"),
        json!({"provider": "openai", "model": "gpt-4o"}),
    );
    record.start_time = Utc::now() - Duration::minutes(minutes_ago);
    record
}

fn step(n: u32, result: StepResult) -> StepRecord {
    StepRecord {
        step_number: n,
        thinking: format!("step {n}"),
        action: "click".into(),
        params: json!({"ref_id": "e2"}),
        result,
        mode: PerceptionMode::Accessibility,
        timestamp: Utc::now(),
    }
}

async fn exercise(store: &dyn SessionStore) {
    store.create_session(&session("older", 10)).await.unwrap();
    store.create_session(&session("newer", 1)).await.unwrap();

    store.add_step("older", &step(2, StepResult::Failed)).await.unwrap();
    store.add_step("older", &step(1, StepResult::Success)).await.unwrap();
    store.update_session_status("older", TaskStatus::Timeout).await.unwrap();

    let sessions = store.list_sessions().await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["newer", "older"]);
    assert_eq!(sessions[0].status, TaskStatus::Running);
    assert!(sessions[0].end_time.is_none());
    assert_eq!(sessions[1].status, TaskStatus::Timeout);
    assert!(sessions[1].end_time.is_some());
    assert_eq!(sessions[1].model_config["model"], "gpt-4o");

    let steps = store.session_steps("older").await.unwrap();
    assert_eq!(steps.iter().map(|s| s.step_number).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(steps[1].result, StepResult::Failed);
    assert!(store.session_steps("newer").await.unwrap().is_empty());

    assert!(store.add_step("missing", &step(1, StepResult::Success)).await.is_err());
    assert!(store.update_session_status("missing", TaskStatus::Failed).await.is_err());
    assert!(store.session_steps("missing").await.is_err());
}

#[tokio::test]
async fn memory_store_contract() {
    exercise(&MemorySessionStore::new()).await;
}

#[tokio::test]
async fn jsonl_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlSessionStore::open(dir.path().join("sessions")).await.unwrap();
    exercise(&store).await;

    assert!(store.dir().join("session_older.json").exists());
    assert!(store.dir().join("session_older.steps.jsonl").exists());
}

#[tokio::test]
async fn jsonl_store_survives_reopen_and_junk() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = JsonlSessionStore::open(dir.path()).await.unwrap();
        store.create_session(&session("s1", 0)).await.unwrap();
        store.add_step("s1", &step(1, StepResult::Success)).await.unwrap();
    }
    std::fs::write(dir.path().join("session_broken.json"), "{not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
    let steps_file = dir.path().join("session_s1.steps.jsonl");
    let mut content = std::fs::read_to_string(&steps_file).unwrap();
    content.push_str("garbage line\n\n");
    std::fs::write(&steps_file, content).unwrap();

    let store = JsonlSessionStore::open(dir.path()).await.unwrap();
    let sessions = store.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].task, "task s1");
    assert_eq!(store.session_steps("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn jsonl_store_rejects_path_like_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlSessionStore::open(dir.path()).await.unwrap();
    assert!(store.create_session(&session("../escape", 0)).await.is_err());
    assert!(store.session_steps("a/b").await.is_err());
}
