//! History loading against the in-memory store.

use chrono::Utc;
use pretty_assertions::assert_eq;

use maestro::prelude::*;
use maestro::store::KIND_AI_WITH_TOOLS;

#[tokio::test]
async fn persisted_turns_round_trip_through_the_loader() {
    let store = MemoryStore::new();
    let persister = MessagePersister::new(store.clone());
    let turns = vec![
        Turn::user("c1", "Hello"),
        Turn::assistant(
            "c1",
            "",
            vec![ToolInvocation::new(
                "tc-1",
                "lookup",
                serde_json::json!({"q": 1}),
            )],
        ),
        Turn::tool_result("c1", "tc-1", "lookup", serde_json::json!({"found": true})),
        Turn::assistant("c1", "It is found.", vec![]),
    ];
    persister
        .persist_run(&turns, &RawUsage::default(), "gpt-4o", "chat")
        .await
        .unwrap();

    let loaded = HistoryLoader::new(store).load("c1").await.unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded[0].role, Role::User);
    assert_eq!(loaded[0].content, "Hello");
    // Serialized arguments come back as structured JSON.
    assert_eq!(loaded[1].invocations[0].arguments, serde_json::json!({"q": 1}));
    assert_eq!(loaded[2].answered_invocation(), Some("tc-1"));
    assert_eq!(
        loaded[2].invocations[0].result,
        Some(serde_json::json!({"found": true}))
    );
    assert_eq!(loaded[3].content, "It is found.");
}

#[tokio::test]
async fn undecodable_record_is_skipped_not_fatal() {
    let store = MemoryStore::new();
    store
        .append_turn(StoredTurn {
            conversation_id: "c1".into(),
            role: "assistant".into(),
            kind: KIND_AI_WITH_TOOLS.into(),
            // Payload is not an object; decoding must fail for this row only.
            payload: serde_json::Value::String("garbage".into()),
            complete: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .append_turn(StoredTurn {
            conversation_id: "c1".into(),
            role: "user".into(),
            kind: "human".into(),
            payload: serde_json::json!({"content": "still here"}),
            complete: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let loaded = HistoryLoader::new(store).load("c1").await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].content, "still here");
}

#[tokio::test]
async fn empty_conversation_loads_empty() {
    let store = MemoryStore::new();
    let loaded = HistoryLoader::new(store).load("nope").await.unwrap();
    assert!(loaded.is_empty());
}
