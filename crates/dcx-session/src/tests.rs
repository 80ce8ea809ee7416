use serde_json::json;
use tempfile::tempdir;

use super::*;
use dcx_ai::ToolCall;

fn call(id: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "read_file".to_string(),
        arguments: json!({"path": "a.txt"}),
    }
}

fn invariant_holds(messages: &[Message]) -> bool {
    let mut last_assistant: Option<&Message> = None;
    for message in messages {
        match message.role {
            MessageRole::Assistant => last_assistant = Some(message),
            MessageRole::Tool => {
                let Some(assistant) = last_assistant else {
                    return false;
                };
                let Some(id) = message.tool_call_id.as_deref() else {
                    return false;
                };
                if !assistant.tool_calls.iter().any(|call| call.id == id) {
                    return false;
                }
            }
            MessageRole::System | MessageRole::User => last_assistant = None,
        }
    }
    true
}

#[test]
fn unit_session_path_is_per_provider() {
    let path = session_path(Path::new("/proj/.deepcoderx"), "deepseek");
    assert_eq!(path, Path::new("/proj/.deepcoderx/deepseek_session.json"));
}

#[test]
fn functional_new_session_starts_with_system_prompt() {
    let temp = tempdir().expect("tempdir");
    let store = SessionStore::load(temp.path(), "local", "be helpful").expect("load");
    assert_eq!(store.len(), 1);
    assert_eq!(store.messages()[0], Message::system("be helpful"));
    assert!(!store.path().exists());
}

#[test]
fn functional_save_and_reload_preserves_messages_verbatim() {
    let temp = tempdir().expect("tempdir");
    let mut store = SessionStore::load(temp.path(), "local", "sys").expect("load");
    store.push(Message::user("hi"));
    store.push(Message::assistant_text("hello"));
    store.save().expect("save");

    let raw = std::fs::read_to_string(store.path()).expect("file");
    let decoded: Vec<Message> = serde_json::from_str(&raw).expect("json array");
    assert_eq!(decoded.len(), 3);

    let reloaded = SessionStore::load(temp.path(), "local", "ignored").expect("reload");
    assert_eq!(reloaded.messages(), store.messages());
}

#[test]
fn functional_clear_deletes_file_and_resets_to_system() {
    let temp = tempdir().expect("tempdir");
    let mut store = SessionStore::load(temp.path(), "local", "sys").expect("load");
    store.push(Message::user("hi"));
    store.save().expect("save");
    assert!(store.path().exists());

    store.clear().expect("clear");
    assert!(!store.path().exists());
    assert_eq!(store.messages(), &[Message::system("sys")]);
}

#[test]
fn unit_prune_keeps_system_plus_recent_tail() {
    let mut messages = vec![Message::system("sys")];
    messages.extend((0..12).map(|index| Message::user(format!("m{index}"))));
    let removed = prune_history(&mut messages, PruningPolicy::default());
    assert_eq!(removed, 4);
    assert_eq!(messages.len(), 9);
    assert_eq!(messages[0].role, MessageRole::System);
    assert_eq!(messages[1].content, "m4");
    assert_eq!(messages[8].content, "m11");
}

#[test]
fn unit_prune_is_noop_within_limit() {
    let mut messages = vec![Message::system("sys"), Message::user("a")];
    assert_eq!(prune_history(&mut messages, PruningPolicy::default()), 0);
    assert_eq!(messages.len(), 2);
}

#[test]
fn regression_orphaned_tool_messages_are_dropped() {
    let mut messages = vec![
        Message::system("sys"),
        Message::tool_result("call_x", "orphan before any assistant"),
        Message::assistant_with_tool_calls("", vec![call("call_1")]),
        Message::tool_result("call_1", "ok"),
        Message::tool_result("call_2", "wrong id"),
        Message::user("next"),
        Message::tool_result("call_1", "stale after user turn"),
    ];
    let report = repair_tool_pairing(&mut messages);
    assert_eq!(report.orphaned_tool_messages, 3);
    assert_eq!(report.dangling_tool_calls, 0);
    assert_eq!(messages.len(), 4);
    assert!(invariant_holds(&messages));
}

#[test]
fn regression_unanswered_tool_calls_are_stripped() {
    let mut messages = vec![
        Message::system("sys"),
        Message::assistant_with_tool_calls("", vec![call("call_1"), call("call_2")]),
        Message::tool_result("call_1", "ok"),
    ];
    let report = repair_tool_pairing(&mut messages);
    assert_eq!(report.dangling_tool_calls, 1);
    assert_eq!(messages[1].tool_calls, vec![call("call_1")]);
}

#[test]
fn regression_pruning_never_leaves_leading_orphans() {
    let temp = tempdir().expect("tempdir");
    let mut store = SessionStore::load(temp.path(), "local", "sys").expect("load");
    for index in 0..4 {
        store.push(Message::user(format!("q{index}")));
        store.push(Message::assistant_with_tool_calls(
            "",
            vec![call(&format!("call_{index}"))],
        ));
        store.push(Message::tool_result(format!("call_{index}"), "ok"));
    }
    store.prune(PruningPolicy {
        max_messages: 4,
        keep_recent: 1,
    });
    assert!(invariant_holds(store.messages()));
    assert_eq!(store.messages()[0].role, MessageRole::System);
}

#[test]
fn functional_load_repairs_corrupted_session_file() {
    let temp = tempdir().expect("tempdir");
    let path = session_path(temp.path(), "local");
    std::fs::write(
        &path,
        serde_json::to_string(&vec![
            Message::system("sys"),
            Message::tool_result("call_9", "orphan"),
            Message::user("hi"),
        ])
        .expect("encode"),
    )
    .expect("seed");

    let store = SessionStore::load(temp.path(), "local", "sys").expect("load");
    assert_eq!(store.len(), 2);
    assert!(pairing_report(store.messages()).is_clean());
}
