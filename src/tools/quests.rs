//! Quest tools: creation, lookup, moderation and completion.

use super::{get_string, make_tool, require_string};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::ToolError;
use crate::notify::{ChangeSink, EntityRef};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_quest",
            "Create a quest with its head post. The head post is the root task, addressed Q:<slug>:T00.",
            json!({
                "title": {
                    "type": "string",
                    "description": "Quest title, also used to derive the address slug"
                },
                "content": {
                    "type": "string",
                    "description": "Head post content (defaults to the title)"
                },
                "author": {
                    "type": "string",
                    "description": "Author ID"
                }
            }),
            vec!["title"],
        ),
        make_tool(
            "get_quest",
            "Get a quest with its task graph and linked items.",
            json!({
                "quest_id": {
                    "type": "string",
                    "description": "Quest ID"
                }
            }),
            vec!["quest_id"],
        ),
        make_tool(
            "list_quests",
            "List quests, optionally filtered by status or approval status.",
            json!({
                "status": {
                    "type": "string",
                    "enum": ["active", "completed"],
                    "description": "Filter by lifecycle status"
                },
                "approval_status": {
                    "type": "string",
                    "enum": ["pending", "approved", "flagged"],
                    "description": "Filter by moderation status"
                }
            }),
            vec![],
        ),
        make_tool(
            "quest_tree",
            "Get the nested task tree of a quest, rooted at its head post.",
            json!({
                "quest_id": {
                    "type": "string",
                    "description": "Quest ID"
                }
            }),
            vec!["quest_id"],
        ),
        make_tool(
            "flag_quest",
            "Flag a quest. Reaching the threshold while approved moves it to flagged and files a hidden review post.",
            json!({
                "quest_id": {
                    "type": "string",
                    "description": "Quest ID"
                },
                "reporter": {
                    "type": "string",
                    "description": "ID of whoever raised the flag"
                }
            }),
            vec!["quest_id"],
        ),
        make_tool(
            "complete_quest",
            "Mark a quest completed and cascade through its links: cascading quest links complete too, cascading post links get the solved tag, notify-only links are reported.",
            json!({
                "quest_id": {
                    "type": "string",
                    "description": "Quest ID"
                }
            }),
            vec!["quest_id"],
        ),
        make_tool(
            "check_graph",
            "Check task graph invariants (single parent, no duplicate edges, no foreign endpoints, no cycles). Returns only quests with violations.",
            json!({
                "quest_id": {
                    "type": "string",
                    "description": "Limit the check to one quest"
                }
            }),
            vec![],
        ),
    ]
}

pub fn create_quest(
    db: &Database,
    engine: &EngineConfig,
    sink: &dyn ChangeSink,
    args: Value,
) -> Result<Value> {
    let title = require_string(&args, "title")?;
    let content = get_string(&args, "content");
    let author = get_string(&args, "author");

    let (quest, head) = db.create_quest(&title, author.as_deref(), content.as_deref(), engine)?;

    sink.notify_change(&EntityRef::quest(&quest.id));
    sink.notify_change(&EntityRef::post(&head.id));

    Ok(json!({
        "quest_id": quest.id,
        "head_post_id": head.id,
        "node_id": head.node_id,
        "title": quest.title,
        "status": quest.status.as_str(),
        "approval_status": quest.approval_status.as_str(),
        "created_at": quest.created_at
    }))
}

pub fn get_quest(db: &Database, args: Value) -> Result<Value> {
    let quest_id = require_string(&args, "quest_id")?;
    let quest = db
        .get_quest(&quest_id)?
        .ok_or_else(|| ToolError::quest_not_found(&quest_id))?;
    Ok(serde_json::to_value(quest)?)
}

pub fn list_quests(db: &Database, args: Value) -> Result<Value> {
    let status = get_string(&args, "status");
    let approval_status = get_string(&args, "approval_status");

    let quests: Vec<_> = db
        .list_quests()?
        .into_iter()
        .filter(|q| status.as_deref().is_none_or(|s| q.status.as_str() == s))
        .filter(|q| {
            approval_status
                .as_deref()
                .is_none_or(|s| q.approval_status.as_str() == s)
        })
        .collect();

    Ok(json!({ "quests": quests }))
}

pub fn quest_tree(db: &Database, args: Value) -> Result<Value> {
    let quest_id = require_string(&args, "quest_id")?;
    let tree = db.quest_tree(&quest_id)?;
    Ok(serde_json::to_value(tree)?)
}

pub fn flag_quest(
    db: &Database,
    engine: &EngineConfig,
    sink: &dyn ChangeSink,
    args: Value,
) -> Result<Value> {
    let quest_id = require_string(&args, "quest_id")?;
    let reporter = get_string(&args, "reporter");

    let report = db.flag_quest(&quest_id, reporter.as_deref(), engine)?;

    sink.notify_change(&EntityRef::quest(&report.quest_id));
    if let Some(review_post_id) = &report.review_post_id {
        sink.notify_change(&EntityRef::post(review_post_id));
    }

    Ok(serde_json::to_value(report)?)
}

pub fn complete_quest(
    db: &Database,
    engine: &EngineConfig,
    sink: &dyn ChangeSink,
    args: Value,
) -> Result<Value> {
    let quest_id = require_string(&args, "quest_id")?;
    let report = db.complete_quest(&quest_id, engine)?;

    for id in &report.completed_quests {
        sink.notify_change(&EntityRef::quest(id));
    }
    for id in &report.solved_posts {
        sink.notify_change(&EntityRef::post(id));
    }
    for entity in &report.notifications {
        sink.notify_change(entity);
    }

    Ok(serde_json::to_value(report)?)
}

pub fn check_graph(db: &Database, args: Value) -> Result<Value> {
    let quest_id = get_string(&args, "quest_id");
    let found = db.check_graph(quest_id.as_deref())?;
    Ok(json!({
        "ok": found.is_empty(),
        "quests": found
    }))
}
