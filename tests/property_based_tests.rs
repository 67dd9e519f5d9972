//! Property-Based Tests for Thread Integrity and Permission Ordering
//!
//! These tests check the invariants that must hold for any conversation
//! history and any rule list: append order, export/import fidelity, fork
//! independence, handoff slicing and first-match-wins evaluation.

use proptest::prelude::*;
use serde_json::json;

use threadweave_core::{
    HandoffOptions, InMemoryThreadStore, JsonSchema, Message, PARENT_THREAD_ID, Role, Thread,
    ThreadManager, fork, handoff, repair_structured,
};
use threadweave_policy::{
    PermissionAction, PermissionEngine, PermissionRule, ToolInvocation, redact_secrets,
};

// Strategy for generating messages with arbitrary text and role
fn message_strategy() -> impl Strategy<Value = Message> {
    (
        prop_oneof![Just(Role::User), Just(Role::Assistant), Just(Role::System)],
        prop::string::string_regex("[a-zA-Z0-9 .,!?]{0,64}").unwrap(),
    )
        .prop_map(|(role, text)| Message::new(role, text))
}

fn thread_strategy() -> impl Strategy<Value = Thread> {
    (
        prop::collection::vec(message_strategy(), 0..20),
        prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..4),
    )
        .prop_map(|(messages, metadata)| {
            let mut thread = Thread::new();
            for message in messages {
                thread.add_message(message);
            }
            for (key, value) in metadata {
                thread.set_metadata(key, json!(value));
            }
            thread
        })
}

fn tool_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9_.]{0,16}").unwrap()
}

fn action_strategy() -> impl Strategy<Value = PermissionAction> {
    prop_oneof![
        Just(PermissionAction::Allow),
        Just(PermissionAction::Ask),
        Just(PermissionAction::Reject),
    ]
}

proptest! {
    /// Property: the last appended message is the last message, and order is kept
    #[test]
    fn prop_append_preserves_order(messages in prop::collection::vec(message_strategy(), 1..30)) {
        let mut thread = Thread::new();
        for message in &messages {
            thread.add_message(message.clone());
            prop_assert_eq!(thread.messages().last(), Some(message));
        }
        prop_assert_eq!(thread.messages(), messages.as_slice());
    }

    /// Property: import(export(t)) reproduces id, messages and metadata
    #[test]
    fn prop_export_import_round_trip(thread in thread_strategy()) {
        let exported = thread.export();
        let wire = serde_json::to_string(&exported).unwrap();
        let imported = Thread::import(serde_json::from_str(&wire).unwrap());

        prop_assert_eq!(imported.id(), thread.id());
        prop_assert_eq!(imported.messages(), thread.messages());
        prop_assert_eq!(imported.metadata_entries(), thread.metadata_entries());
    }

    /// Property: a fork and its source never observe each other's appends
    #[test]
    fn prop_fork_is_independent(
        thread in thread_strategy(),
        extra in prop::collection::vec(message_strategy(), 1..5)
    ) {
        let mut source = thread;
        let original_len = source.len();
        let mut forked = fork(&source);

        for message in &extra {
            forked.add_message(message.clone());
        }
        prop_assert_eq!(source.len(), original_len);

        source.add_message(Message::user("source only"));
        prop_assert_eq!(forked.len(), original_len + extra.len());
        prop_assert_eq!(forked.parent_id(), Some(source.id()));
    }

    /// Property: handoff {last_n: k} keeps exactly the last k messages in order
    #[test]
    fn prop_handoff_last_n(thread in thread_strategy(), k in 0usize..25) {
        let narrowed = handoff(&thread, HandoffOptions::last_n(k));
        let expected = thread.recent_messages(k);

        let parent = json!(thread.id());
        prop_assert_eq!(narrowed.messages(), expected);
        prop_assert_eq!(narrowed.metadata(PARENT_THREAD_ID), Some(&parent));
    }

    /// Property: the first matching rule decides, whatever follows it
    #[test]
    fn prop_first_match_wins(
        tool in tool_name_strategy(),
        first in action_strategy(),
        rest in prop::collection::vec(action_strategy(), 0..5)
    ) {
        let mut rules = vec![PermissionRule::new(tool.clone(), first)];
        rules.extend(rest.into_iter().map(|action| PermissionRule::new(tool.clone(), action)));
        rules.push(PermissionRule::new("*", PermissionAction::Reject));

        let decision = PermissionEngine::new(rules).evaluate(&ToolInvocation::new(tool, json!({})));
        prop_assert_eq!(decision.action, first);
    }

    /// Property: tools no rule names fall back to ask
    #[test]
    fn prop_unmatched_defaults_to_ask(tool in tool_name_strategy()) {
        let engine = PermissionEngine::new(vec![PermissionRule::allow(format!("{}_other", tool))]);
        let decision = engine.evaluate(&ToolInvocation::new(tool, json!({})));
        prop_assert_eq!(decision.action, PermissionAction::Ask);
    }

    /// Property: OpenAI-style keys never survive redaction
    #[test]
    fn prop_redaction_removes_api_keys(
        prefix in "[a-z ]{0,12}",
        key in "[A-Za-z0-9]{20,40}"
    ) {
        let secret = format!("sk-{}", key);
        let redacted = redact_secrets(&format!("{}{}", prefix, secret));
        prop_assert!(!redacted.contains(&secret));
    }

    /// Property: repair turns any integer string into a number
    #[test]
    fn prop_repair_coerces_numeric_strings(n in -1_000_000i64..1_000_000) {
        let schema = JsonSchema::object().with_property("n", JsonSchema::number());
        let repaired = repair_structured(&json!({"n": n.to_string()}), &schema);
        prop_assert_eq!(repaired, json!({"n": n}));
    }

    /// Property: messages added through the manager come back in order
    #[test]
    fn prop_manager_preserves_order(messages in prop::collection::vec(message_strategy(), 0..10)) {
        tokio_test::block_on(async {
            let manager = ThreadManager::new(InMemoryThreadStore::shared(), "prop-user");
            let record = manager.create(None).await.unwrap();

            for message in &messages {
                manager.add_message(&record.id, message.clone()).await.unwrap();
            }

            let stored = manager.get(&record.id).await.unwrap().unwrap();
            prop_assert_eq!(stored.messages, messages);
            Ok(())
        })?;
    }
}
