//! MCP resource implementations.
//!
//! Resources mirror the URIs used for change notifications, so a client can
//! subscribe to `quests://<id>` and re-read it when told it changed.

use crate::db::Database;
use crate::error::ToolError;
use crate::notify::{ALL_POSTS_URI, ALL_QUESTS_URI};
use anyhow::Result;
use rmcp::model::{Annotated, RawResource, RawResourceTemplate, Resource, ResourceTemplate};
use serde_json::{Value, json};
use std::sync::Arc;

/// Resource handler that processes MCP resource requests.
pub struct ResourceHandler {
    pub db: Arc<Database>,
}

fn template(uri_template: &str, name: &str, description: &str) -> ResourceTemplate {
    Annotated::new(
        RawResourceTemplate {
            uri_template: uri_template.into(),
            name: name.into(),
            title: None,
            description: Some(description.into()),
            mime_type: Some("application/json".into()),
            icons: None,
        },
        None,
    )
}

fn resource(uri: &str, name: &str, description: &str) -> Resource {
    Annotated::new(
        RawResource {
            uri: uri.into(),
            name: name.into(),
            title: None,
            description: Some(description.into()),
            mime_type: Some("application/json".into()),
            size: None,
            icons: None,
            meta: None,
        },
        None,
    )
}

impl ResourceHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Get all available resource templates.
    pub fn get_resource_templates(&self) -> Vec<ResourceTemplate> {
        vec![
            template(ALL_QUESTS_URI, "All Quests", "Every quest with its task graph"),
            template("quests://{quest_id}", "Quest", "One quest with its task graph and links"),
            template(
                "quests://tree/{quest_id}",
                "Quest Tree",
                "Nested task tree rooted at the head post",
            ),
            template(ALL_POSTS_URI, "All Posts", "Every public post"),
            template("posts://{post_id}", "Post", "One post with its node address"),
        ]
    }

    /// Get all concrete resources (those without template parameters).
    pub fn get_resources(&self) -> Vec<Resource> {
        vec![
            resource(ALL_QUESTS_URI, "All Quests", "Every quest with its task graph"),
            resource(ALL_POSTS_URI, "All Posts", "Every public post"),
        ]
    }

    /// Read a resource by URI.
    pub fn read_resource(&self, uri: &str) -> Result<Value> {
        if let Some(path) = uri.strip_prefix("quests://") {
            self.read_quests_resource(path)
        } else if let Some(path) = uri.strip_prefix("posts://") {
            self.read_posts_resource(path)
        } else {
            Err(anyhow::anyhow!("Unknown resource URI: {}", uri))
        }
    }

    fn read_quests_resource(&self, path: &str) -> Result<Value> {
        match path {
            "all" => Ok(json!({ "quests": self.db.list_quests()? })),
            _ => {
                if let Some(quest_id) = path.strip_prefix("tree/") {
                    return Ok(serde_json::to_value(self.db.quest_tree(quest_id)?)?);
                }
                let quest = self
                    .db
                    .get_quest(path)?
                    .ok_or_else(|| ToolError::quest_not_found(path))?;
                Ok(serde_json::to_value(quest)?)
            }
        }
    }

    fn read_posts_resource(&self, path: &str) -> Result<Value> {
        match path {
            "all" => {
                let posts: Vec<_> = self
                    .db
                    .list_posts(None)?
                    .into_iter()
                    .filter(|p| p.visibility == crate::types::Visibility::Public)
                    .collect();
                Ok(json!({ "posts": posts }))
            }
            post_id => {
                let post = self
                    .db
                    .get_post(post_id)?
                    .ok_or_else(|| ToolError::post_not_found(post_id))?;
                Ok(serde_json::to_value(post)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn reads_quest_and_tree_uris() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (quest, head) = db
            .create_quest("Resource Quest", None, None, &EngineConfig::default())
            .unwrap();
        let handler = ResourceHandler::new(Arc::clone(&db));

        let value = handler
            .read_resource(&format!("quests://{}", quest.id))
            .unwrap();
        assert_eq!(value["title"], "Resource Quest");

        let tree = handler
            .read_resource(&format!("quests://tree/{}", quest.id))
            .unwrap();
        assert_eq!(tree["post_id"], head.id.as_str());

        let all = handler.read_resource(ALL_POSTS_URI).unwrap();
        assert_eq!(all["posts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let handler = ResourceHandler::new(db);
        assert!(handler.read_resource("tasks://all").is_err());
        assert!(handler.read_resource("quests://missing").is_err());
    }
}
