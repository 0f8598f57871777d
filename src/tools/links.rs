//! Link tools: cross-entity references used by the completion cascade.

use super::{get_bool, make_tool, require_string};
use crate::db::Database;
use crate::error::ToolError;
use crate::notify::{ChangeSink, EntityRef};
use crate::types::{ItemType, Link};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "link_item",
            "Link a post or quest to a quest. cascade_solution makes completion propagate to the target; notify_on_change reports the target when the quest completes.",
            json!({
                "quest_id": {
                    "type": "string",
                    "description": "Quest that owns the link"
                },
                "item_id": {
                    "type": "string",
                    "description": "Linked post or quest ID"
                },
                "item_type": {
                    "type": "string",
                    "enum": ["post", "quest"],
                    "description": "What item_id refers to"
                },
                "cascade_solution": {
                    "type": "boolean",
                    "description": "Propagate completion to the target (default: false)"
                },
                "notify_on_change": {
                    "type": "boolean",
                    "description": "Report the target when the quest completes (default: false)"
                }
            }),
            vec!["quest_id", "item_id", "item_type"],
        ),
        make_tool(
            "unlink_item",
            "Remove every link from a quest to an item.",
            json!({
                "quest_id": {
                    "type": "string",
                    "description": "Quest that owns the link"
                },
                "item_id": {
                    "type": "string",
                    "description": "Linked post or quest ID"
                }
            }),
            vec!["quest_id", "item_id"],
        ),
    ]
}

pub fn link_item(db: &Database, sink: &dyn ChangeSink, args: Value) -> Result<Value> {
    let quest_id = require_string(&args, "quest_id")?;
    let item_id = require_string(&args, "item_id")?;
    let item_type = require_string(&args, "item_type")?;
    let item_type = ItemType::from_str(&item_type).ok_or_else(|| {
        ToolError::invalid_value("item_type", &format!("Unknown item type: {}", item_type))
    })?;

    let link = Link {
        item_id,
        item_type,
        cascade_solution: get_bool(&args, "cascade_solution").unwrap_or(false),
        notify_on_change: get_bool(&args, "notify_on_change").unwrap_or(false),
    };

    let quest = db.link_item(&quest_id, link)?;
    sink.notify_change(&EntityRef::quest(&quest.id));

    Ok(json!({
        "quest_id": quest.id,
        "linked_posts": quest.linked_posts
    }))
}

pub fn unlink_item(db: &Database, sink: &dyn ChangeSink, args: Value) -> Result<Value> {
    let quest_id = require_string(&args, "quest_id")?;
    let item_id = require_string(&args, "item_id")?;

    let removed = db.unlink_item(&quest_id, &item_id)?;
    if removed > 0 {
        sink.notify_change(&EntityRef::quest(&quest_id));
    }

    Ok(json!({
        "quest_id": quest_id,
        "removed": removed
    }))
}
