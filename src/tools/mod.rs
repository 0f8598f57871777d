//! MCP tool implementations.

pub mod links;
pub mod posts;
pub mod quests;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::ToolError;
use crate::notify::ChangeSink;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::Value;
use std::sync::Arc;

/// Tool handler that processes MCP tool calls.
pub struct ToolHandler {
    pub db: Arc<Database>,
    pub engine: EngineConfig,
}

impl ToolHandler {
    pub fn new(db: Arc<Database>, engine: EngineConfig) -> Self {
        Self { db, engine }
    }

    /// Get all available tools.
    pub fn get_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();

        // Quest tools
        tools.extend(quests::get_tools());

        // Post tools
        tools.extend(posts::get_tools());

        // Link tools
        tools.extend(links::get_tools());

        tools
    }

    /// Call a tool by name. Entities changed by the call are reported to `sink`.
    pub fn call_tool(&self, name: &str, arguments: Value, sink: &dyn ChangeSink) -> Result<Value> {
        let db = &self.db;
        let engine = &self.engine;
        match name {
            // Quest tools
            "create_quest" => quests::create_quest(db, engine, sink, arguments),
            "get_quest" => quests::get_quest(db, arguments),
            "list_quests" => quests::list_quests(db, arguments),
            "quest_tree" => quests::quest_tree(db, arguments),
            "flag_quest" => quests::flag_quest(db, engine, sink, arguments),
            "complete_quest" => quests::complete_quest(db, engine, sink, arguments),
            "check_graph" => quests::check_graph(db, arguments),

            // Post tools
            "create_post" => posts::create_post(db, engine, sink, arguments),
            "get_post" => posts::get_post(db, arguments),
            "list_posts" => posts::list_posts(db, arguments),
            "update_post" => posts::update_post(db, engine, sink, arguments),
            "archive_post" => posts::archive_post(db, sink, arguments),
            "delete_post" => posts::delete_post(db, sink, arguments),

            // Link tools
            "link_item" => links::link_item(db, sink, arguments),
            "unlink_item" => links::unlink_item(db, sink, arguments),

            _ => Err(ToolError::unknown_tool(name).into()),
        }
    }
}

/// Helper to create a tool definition.
pub fn make_tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let input_schema = rmcp::model::JsonObject::from_iter([
        ("type".to_string(), serde_json::json!("object")),
        ("properties".to_string(), properties),
        ("required".to_string(), serde_json::json!(required)),
    ]);

    Tool::new(name.to_string(), description.to_string(), input_schema)
}

/// Helper to get a string from arguments.
pub fn get_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str().map(String::from))
}

/// Helper to get a required string from arguments.
pub fn require_string(args: &Value, key: &str) -> Result<String> {
    get_string(args, key).ok_or_else(|| ToolError::missing_field(key).into())
}

/// Helper to get a bool from arguments.
pub fn get_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}

/// Helper for nullable fields: absent is `None`, explicit `null` is `Some(None)`.
pub fn get_nullable_string(args: &Value, key: &str) -> Result<Option<Option<String>>> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => Ok(Some(Some(s.clone()))),
        Some(_) => Err(ToolError::invalid_value(key, "Expected a string or null").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nullable_string_distinguishes_absent_and_null() {
        let args = json!({ "a": null, "b": "x", "c": 3 });
        assert_eq!(get_nullable_string(&args, "missing").unwrap(), None);
        assert_eq!(get_nullable_string(&args, "a").unwrap(), Some(None));
        assert_eq!(
            get_nullable_string(&args, "b").unwrap(),
            Some(Some("x".to_string()))
        );
        assert!(get_nullable_string(&args, "c").is_err());
    }

    #[test]
    fn require_string_reports_field() {
        let err = require_string(&json!({}), "quest_id").unwrap_err();
        let tool_err: ToolError = err.into();
        assert_eq!(tool_err.field.as_deref(), Some("quest_id"));
    }
}
