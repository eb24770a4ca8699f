use serde_json::{json, Value};
use std::sync::Arc;

use super::ArchiveStore;
use crate::convert::{ConversionPipeline, SequentialIds};
use crate::error::ArchiveError;
use crate::model::{
    Conversation, ConversationFilter, MetadataUpdate, SortOrder, SourceFilter, TagCount,
};

fn store() -> ArchiveStore {
    ArchiveStore::open_in_memory()
        .unwrap()
        .with_pipeline(ConversionPipeline::new(Arc::new(SequentialIds::default())))
}

fn native(id: &str, day: u32, tags: &[&str]) -> Value {
    json!({
        "conversation_id": id,
        "title": format!("Conversation {}", id),
        "created_at": format!("2024-01-{:02}T00:00:00.000Z", day),
        "updated_at": format!("2024-01-{:02}T00:00:00.000Z", day),
        "source": "convokeep",
        "model": "unknown",
        "messages": [
            {"id": format!("{}-1", id), "role": "user", "content": "question"},
            {"id": format!("{}-2", id), "role": "assistant", "content": "answer"}
        ],
        "tags": tags
    })
}

fn with_source(mut raw: Value, source: &str, model: &str) -> Value {
    raw["source"] = json!(source);
    raw["model"] = json!(model);
    raw
}

fn ids(page: &[crate::model::ConversationSummary]) -> Vec<&str> {
    page.iter().map(|s| s.conversation_id.as_str()).collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================
// INGESTION
// ============================================

#[test]
fn test_store_same_id_twice_updates_in_place() {
    let mut store = store();
    let first = store.store_conversations(&native("a", 1, &[])).unwrap();
    assert_eq!(first.new_conversations, 1);
    let original_id = store.get_conversation_by_id("a").unwrap().unwrap().id;
    assert!(original_id.is_some());

    let mut again = native("a", 1, &[]);
    again["starred"] = json!(true);
    let second = store.store_conversations(&again).unwrap();
    assert_eq!(second.new_conversations, 0);
    assert_eq!(second.updated_conversations, 1);

    assert_eq!(store.count_conversations().unwrap(), 1);
    let stored = store.get_conversation_by_id("a").unwrap().unwrap();
    assert_eq!(stored.id, original_id);
    assert!(stored.starred);
}

#[test]
fn test_update_without_title_keeps_previous_title() {
    let mut store = store();
    store.store_conversations(&native("a", 1, &[])).unwrap();
    let original = store.get_conversation_by_id("a").unwrap().unwrap();

    let mut partial = Conversation::new("a");
    partial.title = String::new();
    partial.starred = true;
    let report = store.store_records(&[partial]).unwrap();
    assert_eq!(report.updated_conversations, 1);

    let stored = store.get_conversation_by_id("a").unwrap().unwrap();
    assert_eq!(stored.title, "Conversation a");
    assert_eq!(stored.id, original.id);
    assert!(stored.starred);

    let mut retitled = Conversation::new("a");
    retitled.title = "Renamed".to_string();
    store.store_records(&[retitled]).unwrap();
    let stored = store.get_conversation_by_id("a").unwrap().unwrap();
    assert_eq!(stored.title, "Renamed");
    assert_eq!(stored.id, original.id);
}

#[test]
fn test_reimport_replaces_curation_fields() {
    let mut store = store();
    let mut curated = native("a", 1, &["old"]);
    curated["starred"] = json!(true);
    curated["archived"] = json!(true);
    store.store_conversations(&curated).unwrap();
    let original_id = store.get_conversation_by_id("a").unwrap().unwrap().id;

    let mut plain = native("a", 1, &[]);
    plain["starred"] = json!(false);
    store.store_conversations(&plain).unwrap();

    let stored = store.get_conversation_by_id("a").unwrap().unwrap();
    assert_eq!(stored.id, original_id);
    assert!(stored.tags.is_empty());
    assert!(!stored.starred);
    assert!(!stored.archived);
    assert!(store.get_all_tags().unwrap().is_empty());
}

#[test]
fn test_new_record_gets_defaults() {
    let mut store = store();
    let mut bare = Conversation::new("bare");
    bare.title = "  ".to_string();
    bare.created_at = String::new();
    bare.updated_at = String::new();
    store.store_records(&[bare]).unwrap();

    let stored = store.get_conversation_by_id("bare").unwrap().unwrap();
    assert_eq!(stored.title, "Untitled Conversation");
    assert!(stored.created_at.ends_with('Z'));
    assert_eq!(stored.updated_at, stored.created_at);
}

#[test]
fn test_batches_report_progress() {
    let mut store = store().with_batch_size(2);
    let raw = Value::Array((1..=5).map(|n| native(&format!("c{}", n), n, &[])).collect());

    let mut calls = Vec::new();
    let report = store
        .store_conversations_with_progress(&raw, |done, total| calls.push((done, total)))
        .unwrap();

    assert_eq!(report.new_conversations, 5);
    assert_eq!(calls, vec![(2, 5), (4, 5), (5, 5)]);
}

#[test]
fn test_failed_conversion_does_not_block_batch() {
    let mut store = store();
    let mut broken = native("broken", 2, &[]);
    broken.as_object_mut().unwrap().remove("title");
    let raw = json!([native("ok", 1, &[]), broken, {"uuid": "claude-1", "chat_messages": []}]);

    let report = store.store_conversations(&raw).unwrap();
    assert_eq!(report.new_conversations, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert!(store.get_conversation_by_id("broken").unwrap().is_none());
}

#[test]
fn test_write_error_rolls_back_whole_batch() {
    let mut store = store().with_batch_size(2);
    store
        .connector
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON conversations
             WHEN NEW.conversation_id = 'bad'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

    let records: Vec<Conversation> = ["c1", "c2", "c3", "bad"]
        .into_iter()
        .map(Conversation::new)
        .collect();
    let err = store.store_records(&records).unwrap_err();
    assert!(matches!(err, ArchiveError::Storage(_)));

    // first batch committed, second rolled back as a unit
    assert!(store.get_conversation_by_id("c1").unwrap().is_some());
    assert!(store.get_conversation_by_id("c2").unwrap().is_some());
    assert!(store.get_conversation_by_id("c3").unwrap().is_none());
    assert_eq!(store.count_conversations().unwrap(), 2);
}

#[test]
fn test_chatgpt_message_order_survives_storage() {
    let mut store = store();
    let raw = json!({
        "conversation_id": "gpt-1",
        "title": "Tree",
        "create_time": 1700000000,
        "current_node": "c",
        "mapping": {
            "c": {"message": {"author": {"role": "assistant"}, "create_time": 1, "content": {"parts": ["third"]}}, "parent": "b", "children": []},
            "a": {"message": {"author": {"role": "user"}, "create_time": 3, "content": {"parts": ["first"]}}, "parent": null, "children": ["b"]},
            "b": {"message": {"author": {"role": "assistant"}, "create_time": 2, "content": {"parts": ["second"]}}, "parent": "a", "children": ["c"]}
        }
    });
    store.store_conversations(&raw).unwrap();

    let stored = store.get_conversation_by_id("gpt-1").unwrap().unwrap();
    let contents: Vec<&str> = stored.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    assert_eq!(stored.source, "chatgpt");
}

// ============================================
// QUERIES
// ============================================

fn seeded() -> ArchiveStore {
    let mut store = store();
    let raw = json!([
        with_source(native("gpt-a", 1, &["work"]), "chatgpt", "gpt-4o"),
        with_source(native("claude-b", 2, &["work", "urgent"]), "claude", "claude-3-opus"),
        with_source(native("keep-c", 3, &["home"]), "convokeep", "GPT-4"),
        with_source(native("keep-d", 4, &[]), "convokeep", "llama3"),
    ]);
    store.store_conversations(&raw).unwrap();
    store
}

#[test]
fn test_pagination_in_both_directions() {
    let store = seeded();

    let newest = store.get_conversations(&ConversationFilter::default()).unwrap();
    assert_eq!(newest.total, 4);
    assert_eq!(ids(&newest.items), vec!["keep-d", "keep-c", "claude-b", "gpt-a"]);

    let page = store
        .get_conversations(&ConversationFilter {
            offset: 1,
            limit: Some(2),
            sort: SortOrder::Oldest,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ids(&page.items), vec!["claude-b", "keep-c"]);
    assert_eq!(page.total, 4);

    let past_end = store
        .get_conversations(&ConversationFilter {
            offset: 10,
            ..Default::default()
        })
        .unwrap();
    assert!(past_end.items.is_empty());
}

#[test]
fn test_summaries_carry_counts_not_bodies() {
    let store = seeded();
    let page = store.get_conversations(&ConversationFilter::default()).unwrap();
    assert!(page.items.iter().all(|s| s.message_count == 2));
}

#[test]
fn test_source_filters() {
    let store = seeded();
    let by = |source: SourceFilter| {
        let page = store
            .get_conversations(&ConversationFilter {
                source,
                sort: SortOrder::Oldest,
                ..Default::default()
            })
            .unwrap();
        ids(&page.items).into_iter().map(String::from).collect::<Vec<_>>()
    };

    assert_eq!(by(SourceFilter::Gpt), vec!["gpt-a", "keep-c"]);
    assert_eq!(by(SourceFilter::Claude), vec!["claude-b"]);
    assert_eq!(
        by(SourceFilter::Exact("convokeep".to_string())),
        vec!["keep-c", "keep-d"]
    );
}

#[test]
fn test_flag_and_tag_filters() {
    let mut store = seeded();
    store
        .bulk_update_conversations(
            &strings(&["gpt-a", "keep-d"]),
            &MetadataUpdate {
                starred: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    store
        .update_conversation_metadata(
            "keep-d",
            &MetadataUpdate {
                archived: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

    let starred = store
        .get_conversations(&ConversationFilter {
            starred: Some(true),
            archived: Some(false),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ids(&starred.items), vec!["gpt-a"]);

    let tagged = store
        .get_conversations(&ConversationFilter {
            tag: Some("work".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ids(&tagged.items), vec!["claude-b", "gpt-a"]);
}

#[test]
fn test_count_only() {
    let store = seeded();
    let all = store
        .get_conversations(&ConversationFilter {
            count_only: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all.total, 4);
    assert!(all.items.is_empty());

    let work = store
        .get_conversations(&ConversationFilter {
            count_only: true,
            tag: Some("work".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(work.total, 2);
    assert!(work.items.is_empty());
}

#[test]
fn test_lookup_by_id() {
    let store = seeded();
    let found = store.get_conversation_by_id("claude-b").unwrap().unwrap();
    assert_eq!(found.messages.len(), 2);
    assert_eq!(found.messages[0].role, "user");
    assert!(store.get_conversation_by_id("nope").unwrap().is_none());
}

// ============================================
// MUTATIONS
// ============================================

#[test]
fn test_update_metadata() {
    let mut store = seeded();
    let updated = store
        .update_conversation_metadata(
            "gpt-a",
            &MetadataUpdate {
                tags: Some(strings(&["x", "x", "y"])),
                starred: Some(true),
                archived: None,
            },
        )
        .unwrap();
    assert_eq!(updated.tags, vec!["x", "y"]);
    assert_ne!(updated.updated_at, "2024-01-01T00:00:00.000Z");

    let stored = store.get_conversation_by_id("gpt-a").unwrap().unwrap();
    assert_eq!(stored, updated);

    let err = store
        .update_conversation_metadata("missing", &MetadataUpdate::default())
        .unwrap_err();
    assert!(matches!(err, ArchiveError::NotFound(_)));
}

#[test]
fn test_bulk_update_reports_per_id() {
    let mut store = seeded();
    let outcome = store
        .bulk_update_conversations(
            &strings(&["gpt-a", "ghost", "keep-c"]),
            &MetadataUpdate {
                archived: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.errors, vec!["ghost: not found"]);

    assert!(store.get_conversation_by_id("keep-c").unwrap().unwrap().archived);
}

#[test]
fn test_bulk_delete_one_valid_one_missing() {
    let mut store = seeded();
    let outcome = store
        .bulk_delete_conversations(&strings(&["claude-b", "does-not-exist"]))
        .unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(store.count_conversations().unwrap(), 3);

    // the tag index follows the delete
    let urgent = store.get_conversations_by_tags(&strings(&["urgent"]), false).unwrap();
    assert!(urgent.is_empty());
}

#[test]
fn test_clear_database() {
    let mut store = seeded();
    assert!(store.has_conversations().unwrap());
    assert_eq!(store.clear_database().unwrap(), 4);
    assert!(!store.has_conversations().unwrap());
    assert!(store.get_all_tags().unwrap().is_empty());
}

// ============================================
// TAGS
// ============================================

#[test]
fn test_tags_or_and() {
    let store = seeded();

    let any = store
        .get_conversations_by_tags(&strings(&["urgent", "home"]), false)
        .unwrap();
    assert_eq!(ids(&any), vec!["keep-c", "claude-b"]);

    let overlapping = store
        .get_conversations_by_tags(&strings(&["work", "urgent"]), false)
        .unwrap();
    assert_eq!(ids(&overlapping), vec!["claude-b", "gpt-a"]);

    let both = store
        .get_conversations_by_tags(&strings(&["work", "urgent"]), true)
        .unwrap();
    assert_eq!(ids(&both), vec!["claude-b"]);

    assert!(store.get_conversations_by_tags(&[], true).unwrap().is_empty());
}

#[test]
fn test_all_tags_sorted_by_count_then_name() {
    let mut store = store();
    store
        .store_conversations(&json!([
            native("one", 1, &["a", "b"]),
            native("two", 2, &["a"]),
            native("three", 3, &[]),
        ]))
        .unwrap();

    assert_eq!(
        store.get_all_tags().unwrap(),
        vec![
            TagCount {
                tag: "a".to_string(),
                count: 2
            },
            TagCount {
                tag: "b".to_string(),
                count: 1
            },
        ]
    );
}

#[test]
fn test_rename_tag_never_duplicates() {
    let mut store = store();
    store
        .store_conversations(&json!([
            native("both", 1, &["a", "b"]),
            native("only-a", 2, &["a"]),
            native("none", 3, &["c"]),
        ]))
        .unwrap();

    assert_eq!(store.rename_tag("a", "b").unwrap(), 2);
    assert_eq!(store.get_conversation_by_id("both").unwrap().unwrap().tags, vec!["b"]);
    assert_eq!(store.get_conversation_by_id("only-a").unwrap().unwrap().tags, vec!["b"]);
    assert_eq!(store.get_conversation_by_id("none").unwrap().unwrap().tags, vec!["c"]);

    let touched = store.get_conversation_by_id("both").unwrap().unwrap();
    assert_ne!(touched.updated_at, "2024-01-01T00:00:00.000Z");

    assert_eq!(store.rename_tag("b", "b").unwrap(), 0);
    assert!(matches!(
        store.rename_tag(" ", "x").unwrap_err(),
        ArchiveError::Validation(_)
    ));
}

#[test]
fn test_delete_tag() {
    let mut store = seeded();
    assert_eq!(store.delete_tag("work").unwrap(), 2);
    assert_eq!(
        store.get_conversation_by_id("claude-b").unwrap().unwrap().tags,
        vec!["urgent"]
    );
    let tags: Vec<String> = store.get_all_tags().unwrap().into_iter().map(|t| t.tag).collect();
    assert_eq!(tags, vec!["home", "urgent"]);
    assert_eq!(store.delete_tag("work").unwrap(), 0);
}

#[test]
fn test_file_store_persists_between_opens() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("archive.db");

    {
        let mut store = ArchiveStore::open(&path).unwrap();
        store.store_conversations(&native("kept", 1, &["t"])).unwrap();
    }

    let store = ArchiveStore::open(&path).unwrap();
    assert_eq!(store.schema_version(), super::SCHEMA_VERSION);
    let kept = store.get_conversation_by_id("kept").unwrap().unwrap();
    assert_eq!(kept.tags, vec!["t"]);
}
