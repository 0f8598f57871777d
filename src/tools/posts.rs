//! Post tools.

use super::{get_bool, get_nullable_string, get_string, make_tool, require_string};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::ToolError;
use crate::notify::{ChangeSink, EntityRef};
use crate::types::{DeleteOutcome, NewPost, PostPatch, PostType};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

const POST_TYPES: [&str; 8] = [
    "task",
    "log",
    "commit",
    "issue",
    "request",
    "review",
    "free",
    "meta_system",
];

fn parse_post_type(value: &str) -> Result<PostType> {
    PostType::from_str(value).ok_or_else(|| {
        ToolError::invalid_value("type", &format!("Unknown post type: {}", value))
            .with_details(format!("Expected one of: {}", POST_TYPES.join(", ")))
            .into()
    })
}

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_post",
            "Create a post. Inside a quest it gets a node address (tasks T, logs L, commits C, issues I). A task with a parent is added to the task tree.",
            json!({
                "type": {
                    "type": "string",
                    "enum": POST_TYPES,
                    "description": "Post type"
                },
                "quest_id": {
                    "type": "string",
                    "description": "Quest the post belongs to"
                },
                "content": {
                    "type": "string",
                    "description": "Post body"
                },
                "author": {
                    "type": "string",
                    "description": "Author ID"
                },
                "reply_to": {
                    "type": "string",
                    "description": "Post this one replies to; the default structural parent"
                },
                "parent_id": {
                    "type": "string",
                    "description": "Explicit structural parent, overriding reply_to"
                },
                "edge_type": {
                    "type": "string",
                    "description": "Annotation stored on the task edge"
                },
                "edge_label": {
                    "type": "string",
                    "description": "Label stored on the task edge"
                }
            }),
            vec!["type"],
        ),
        make_tool(
            "get_post",
            "Get a single post by ID.",
            json!({
                "post_id": {
                    "type": "string",
                    "description": "Post ID"
                }
            }),
            vec!["post_id"],
        ),
        make_tool(
            "list_posts",
            "List posts, optionally limited to one quest.",
            json!({
                "quest_id": {
                    "type": "string",
                    "description": "Only posts of this quest"
                },
                "include_archived": {
                    "type": "boolean",
                    "description": "Include archived posts (default: true)"
                },
                "include_hidden": {
                    "type": "boolean",
                    "description": "Include hidden posts (default: false)"
                }
            }),
            vec![],
        ),
        make_tool(
            "update_post",
            "Update a post. Changing quest_id, reply_to, parent_id or type re-derives its address and moves it in the task tree. Pass null to clear quest_id, reply_to or parent_id. Changing quest_id or reply_to without parent_id drops the explicit parent.",
            json!({
                "post_id": {
                    "type": "string",
                    "description": "Post ID"
                },
                "content": {
                    "type": "string",
                    "description": "New content"
                },
                "type": {
                    "type": "string",
                    "enum": POST_TYPES,
                    "description": "New post type"
                },
                "quest_id": {
                    "type": ["string", "null"],
                    "description": "Move to another quest, or null to detach"
                },
                "reply_to": {
                    "type": ["string", "null"],
                    "description": "New reply target, or null to clear"
                },
                "parent_id": {
                    "type": ["string", "null"],
                    "description": "New explicit structural parent, or null to fall back to reply_to"
                }
            }),
            vec!["post_id"],
        ),
        make_tool(
            "archive_post",
            "Archive a post. An archived task stays in place and its children move up to its parent.",
            json!({
                "post_id": {
                    "type": "string",
                    "description": "Post ID"
                }
            }),
            vec!["post_id"],
        ),
        make_tool(
            "delete_post",
            "Permanently delete a post. A task is removed from the tree and its children attach to its parent. Deleting a quest's head post deletes the quest instead.",
            json!({
                "post_id": {
                    "type": "string",
                    "description": "Post ID"
                }
            }),
            vec!["post_id"],
        ),
    ]
}

pub fn create_post(
    db: &Database,
    engine: &EngineConfig,
    sink: &dyn ChangeSink,
    args: Value,
) -> Result<Value> {
    let post_type = parse_post_type(&require_string(&args, "type")?)?;

    let new = NewPost {
        quest_id: get_string(&args, "quest_id"),
        post_type,
        content: get_string(&args, "content").unwrap_or_default(),
        author_id: get_string(&args, "author"),
        reply_to: get_string(&args, "reply_to"),
        parent_id: get_string(&args, "parent_id"),
        edge_type: get_string(&args, "edge_type"),
        edge_label: get_string(&args, "edge_label"),
    };

    let post = db.create_post(new, engine)?;

    sink.notify_change(&EntityRef::post(&post.id));
    if let Some(quest_id) = &post.quest_id {
        sink.notify_change(&EntityRef::quest(quest_id));
    }

    Ok(serde_json::to_value(post)?)
}

pub fn get_post(db: &Database, args: Value) -> Result<Value> {
    let post_id = require_string(&args, "post_id")?;
    let post = db
        .get_post(&post_id)?
        .ok_or_else(|| ToolError::post_not_found(&post_id))?;
    Ok(serde_json::to_value(post)?)
}

pub fn list_posts(db: &Database, args: Value) -> Result<Value> {
    let quest_id = get_string(&args, "quest_id");
    let include_archived = get_bool(&args, "include_archived").unwrap_or(true);
    let include_hidden = get_bool(&args, "include_hidden").unwrap_or(false);

    let posts: Vec<_> = db
        .list_posts(quest_id.as_deref())?
        .into_iter()
        .filter(|p| include_archived || !p.is_archived())
        .filter(|p| include_hidden || p.visibility == crate::types::Visibility::Public)
        .collect();

    Ok(json!({ "posts": posts }))
}

pub fn update_post(
    db: &Database,
    engine: &EngineConfig,
    sink: &dyn ChangeSink,
    args: Value,
) -> Result<Value> {
    let post_id = require_string(&args, "post_id")?;
    let post_type = get_string(&args, "type")
        .map(|s| parse_post_type(&s))
        .transpose()?;

    let patch = PostPatch {
        quest_id: get_nullable_string(&args, "quest_id")?,
        reply_to: get_nullable_string(&args, "reply_to")?,
        parent_id: get_nullable_string(&args, "parent_id")?,
        post_type,
        content: get_string(&args, "content"),
    };

    let old_quest_id = db.get_post(&post_id)?.and_then(|p| p.quest_id);
    let post = db.update_post(&post_id, patch, engine)?;

    sink.notify_change(&EntityRef::post(&post.id));
    for quest_id in old_quest_id.iter().chain(post.quest_id.iter()) {
        sink.notify_change(&EntityRef::quest(quest_id));
    }

    Ok(serde_json::to_value(post)?)
}

pub fn archive_post(db: &Database, sink: &dyn ChangeSink, args: Value) -> Result<Value> {
    let post_id = require_string(&args, "post_id")?;
    let outcome = db.archive_post(&post_id)?;

    if !outcome.already_archived {
        sink.notify_change(&EntityRef::post(&outcome.post.id));
        if let Some(quest_id) = &outcome.post.quest_id {
            sink.notify_change(&EntityRef::quest(quest_id));
        }
    }

    Ok(serde_json::to_value(outcome)?)
}

pub fn delete_post(db: &Database, sink: &dyn ChangeSink, args: Value) -> Result<Value> {
    let post_id = require_string(&args, "post_id")?;
    let quest_id = db.get_post(&post_id)?.and_then(|p| p.quest_id);
    let outcome = db.delete_post(&post_id)?;

    match &outcome {
        DeleteOutcome::QuestDeleted { quest_id } => {
            sink.notify_change(&EntityRef::quest(quest_id));
        }
        DeleteOutcome::PostDeleted { post_id, .. } => {
            sink.notify_change(&EntityRef::post(post_id));
            if let Some(quest_id) = &quest_id {
                sink.notify_change(&EntityRef::quest(quest_id));
            }
        }
    }

    Ok(serde_json::to_value(outcome)?)
}
