//! Integration tests for the MCP tool layer.
//!
//! These tests call tools by name through `ToolHandler`, the way the server
//! does, and check both the JSON responses and the change notifications.

use quest_graph::config::EngineConfig;
use quest_graph::db::Database;
use quest_graph::error::{ErrorCode, error_code};
use quest_graph::notify::{ALL_QUESTS_URI, CollectingSink, EntityRef, SubscriptionManager};
use quest_graph::tools::ToolHandler;
use serde_json::{Value, json};
use std::sync::Arc;

fn setup() -> ToolHandler {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    ToolHandler::new(Arc::new(db), EngineConfig::default())
}

fn call(handler: &ToolHandler, name: &str, args: Value) -> Value {
    let sink = CollectingSink::new();
    handler
        .call_tool(name, args, &sink)
        .unwrap_or_else(|e| panic!("{} failed: {}", name, e))
}

fn create_quest(handler: &ToolHandler, title: &str) -> (String, String) {
    let result = call(handler, "create_quest", json!({ "title": title }));
    (
        result["quest_id"].as_str().unwrap().to_string(),
        result["head_post_id"].as_str().unwrap().to_string(),
    )
}

mod registry_tests {
    use super::*;

    #[test]
    fn every_listed_tool_is_callable() {
        let handler = setup();
        let names: Vec<String> = handler
            .get_tools()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();

        assert_eq!(names.len(), 15);
        for name in &names {
            let sink = CollectingSink::new();
            // Empty arguments fail validation, but never as an unknown tool.
            if let Err(e) = handler.call_tool(name, json!({}), &sink) {
                assert_ne!(error_code(&e), Some(ErrorCode::UnknownTool), "{}", name);
            }
        }
    }

    #[test]
    fn unknown_tool_is_reported() {
        let handler = setup();
        let sink = CollectingSink::new();
        let err = handler.call_tool("nope", json!({}), &sink).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::UnknownTool));
    }
}

mod post_tool_tests {
    use super::*;

    #[test]
    fn create_post_returns_address_and_notifies() {
        let handler = setup();
        let (quest_id, head_id) = create_quest(&handler, "Ship It");

        let sink = CollectingSink::new();
        let post = handler
            .call_tool(
                "create_post",
                json!({ "type": "task", "quest_id": quest_id, "parent_id": head_id }),
                &sink,
            )
            .unwrap();

        assert_eq!(post["node_id"], "Q:ship_it:T01");
        let post_id = post["id"].as_str().unwrap();
        assert_eq!(
            sink.drain(),
            vec![EntityRef::post(post_id), EntityRef::quest(&quest_id)]
        );

        let quest = call(&handler, "get_quest", json!({ "quest_id": quest_id }));
        assert_eq!(quest["task_graph"][0]["from"], head_id.as_str());
        assert_eq!(quest["task_graph"][0]["to"], post_id);
    }

    #[test]
    fn create_post_rejects_unknown_type() {
        let handler = setup();
        let sink = CollectingSink::new();
        let err = handler
            .call_tool("create_post", json!({ "type": "poem" }), &sink)
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::InvalidFieldValue));
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn update_post_accepts_null_to_clear_quest() {
        let handler = setup();
        let (quest_id, _) = create_quest(&handler, "Ship It");
        let post = call(
            &handler,
            "create_post",
            json!({ "type": "task", "quest_id": quest_id }),
        );

        let patched = call(
            &handler,
            "update_post",
            json!({ "post_id": post["id"], "quest_id": null }),
        );
        assert!(patched["quest_id"].is_null());
        assert!(patched["node_id"].is_null());
    }

    #[test]
    fn list_posts_hides_hidden_posts_by_default() {
        let handler = setup();
        let (quest_id, _) = create_quest(&handler, "Spam");
        for _ in 0..3 {
            call(&handler, "flag_quest", json!({ "quest_id": quest_id }));
        }

        let visible = call(&handler, "list_posts", json!({}));
        assert_eq!(visible["posts"].as_array().unwrap().len(), 1);

        let all = call(&handler, "list_posts", json!({ "include_hidden": true }));
        assert_eq!(all["posts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn delete_head_post_reports_quest_deletion() {
        let handler = setup();
        let (quest_id, head_id) = create_quest(&handler, "Short Lived");

        let sink = CollectingSink::new();
        let result = handler
            .call_tool("delete_post", json!({ "post_id": head_id }), &sink)
            .unwrap();

        assert_eq!(result["outcome"], "quest_deleted");
        assert_eq!(result["quest_id"], quest_id.as_str());
        assert_eq!(sink.drain(), vec![EntityRef::quest(&quest_id)]);

        let sink = CollectingSink::new();
        let err = handler
            .call_tool("get_quest", json!({ "quest_id": quest_id }), &sink)
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::QuestNotFound));
    }

    #[test]
    fn archive_twice_notifies_once() {
        let handler = setup();
        let (quest_id, _) = create_quest(&handler, "Ship It");
        let post = call(
            &handler,
            "create_post",
            json!({ "type": "task", "quest_id": quest_id }),
        );

        let sink = CollectingSink::new();
        handler
            .call_tool("archive_post", json!({ "post_id": post["id"] }), &sink)
            .unwrap();
        assert_eq!(sink.drain().len(), 2);

        let again = handler
            .call_tool("archive_post", json!({ "post_id": post["id"] }), &sink)
            .unwrap();
        assert_eq!(again["already_archived"], true);
        assert!(sink.drain().is_empty());
    }
}

mod quest_tool_tests {
    use super::*;

    #[test]
    fn complete_quest_notifies_cascade_targets() {
        let handler = setup();
        let (q1, _) = create_quest(&handler, "One");
        let (q2, _) = create_quest(&handler, "Two");
        let (q3, _) = create_quest(&handler, "Three");
        call(
            &handler,
            "link_item",
            json!({ "quest_id": q1, "item_id": q2, "item_type": "quest", "cascade_solution": true }),
        );
        call(
            &handler,
            "link_item",
            json!({ "quest_id": q2, "item_id": q3, "item_type": "quest", "notify_on_change": true }),
        );

        let sink = CollectingSink::new();
        let report = handler
            .call_tool("complete_quest", json!({ "quest_id": q1 }), &sink)
            .unwrap();

        assert_eq!(report["completed_quests"], json!([q1, q2]));
        assert_eq!(
            sink.drain(),
            vec![
                EntityRef::quest(&q1),
                EntityRef::quest(&q2),
                EntityRef::quest(&q3)
            ]
        );

        let active = call(&handler, "list_quests", json!({ "status": "active" }));
        let ids: Vec<&str> = active["quests"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec![q3.as_str()]);
    }

    #[test]
    fn flag_quest_reports_review_post() {
        let handler = setup();
        let (quest_id, _) = create_quest(&handler, "Spam");

        call(&handler, "flag_quest", json!({ "quest_id": quest_id }));
        call(&handler, "flag_quest", json!({ "quest_id": quest_id }));
        let report = call(&handler, "flag_quest", json!({ "quest_id": quest_id }));

        assert_eq!(report["approval_status"], "flagged");
        assert_eq!(report["flag_count"], 3);
        assert!(report["review_post_id"].is_string());

        let flagged = call(
            &handler,
            "list_quests",
            json!({ "approval_status": "flagged" }),
        );
        assert_eq!(flagged["quests"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn quest_tree_and_check_graph() {
        let handler = setup();
        let (quest_id, head_id) = create_quest(&handler, "Tree");
        let child = call(
            &handler,
            "create_post",
            json!({ "type": "task", "quest_id": quest_id, "parent_id": head_id }),
        );

        let tree = call(&handler, "quest_tree", json!({ "quest_id": quest_id }));
        assert_eq!(tree["post_id"], head_id.as_str());
        assert_eq!(tree["children"][0]["post_id"], child["id"]);
        assert_eq!(tree["children"][0]["node_id"], "Q:tree:T01");

        let check = call(&handler, "check_graph", json!({}));
        assert_eq!(check["ok"], true);
        assert_eq!(check["quests"], json!([]));
    }

    #[test]
    fn missing_required_field_names_the_field() {
        let handler = setup();
        let sink = CollectingSink::new();
        let err = handler
            .call_tool("link_item", json!({ "quest_id": "q" }), &sink)
            .unwrap_err();
        let tool_err: quest_graph::error::ToolError = err.into();
        assert_eq!(tool_err.code, ErrorCode::MissingRequiredField);
        assert_eq!(tool_err.field.as_deref(), Some("item_id"));
    }
}

mod subscription_tests {
    use super::*;

    #[test]
    fn tool_changes_map_to_subscribed_uris() {
        let handler = setup();
        let subs = SubscriptionManager::new();
        subs.subscribe(ALL_QUESTS_URI);

        let sink = CollectingSink::new();
        handler
            .call_tool("create_quest", json!({ "title": "Watched" }), &sink)
            .unwrap();

        let affected = subs.affected_subscriptions(&sink.drain());
        assert_eq!(affected, vec![ALL_QUESTS_URI.to_string()]);
    }
}
