//! Change notifications and MCP resource subscriptions.
//!
//! Mutations report the entities they touched to a [`ChangeSink`]. The MCP
//! server collects them per tool call and forwards a
//! `notifications/resources/updated` message for every URI the client has
//! subscribed to.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

/// URI that matches a change to any quest.
pub const ALL_QUESTS_URI: &str = "quests://all";

/// URI that matches a change to any post.
pub const ALL_POSTS_URI: &str = "posts://all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Quest,
    Post,
}

/// Reference to an entity that changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn quest(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Quest,
            id: id.into(),
        }
    }

    pub fn post(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Post,
            id: id.into(),
        }
    }

    /// Resource URI for this entity, e.g. `quests://<id>`.
    pub fn uri(&self) -> String {
        match self.kind {
            EntityKind::Quest => format!("quests://{}", self.id),
            EntityKind::Post => format!("posts://{}", self.id),
        }
    }

    fn collection_uri(&self) -> &'static str {
        match self.kind {
            EntityKind::Quest => ALL_QUESTS_URI,
            EntityKind::Post => ALL_POSTS_URI,
        }
    }
}

/// Receiver of "entity X changed" notifications.
pub trait ChangeSink: Send + Sync {
    fn notify_change(&self, entity: &EntityRef);
}

/// Sink that buffers notifications until drained. Duplicates are kept once.
#[derive(Debug, Default)]
pub struct CollectingSink {
    seen: Mutex<Vec<EntityRef>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything collected so far.
    pub fn drain(&self) -> Vec<EntityRef> {
        let mut seen = self.seen.lock().unwrap();
        std::mem::take(&mut *seen)
    }
}

impl ChangeSink for CollectingSink {
    fn notify_change(&self, entity: &EntityRef) {
        let mut seen = self.seen.lock().unwrap();
        if !seen.contains(entity) {
            seen.push(entity.clone());
        }
    }
}

/// Tracks which resource URIs the connected MCP client subscribed to.
///
/// MCP stdio is single-client, so one set of URIs is enough.
pub struct SubscriptionManager {
    subscribed: Mutex<HashSet<String>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    /// Subscribe to a resource URI. Returns `true` if newly added.
    pub fn subscribe(&self, uri: &str) -> bool {
        let mut set = self.subscribed.lock().unwrap();
        set.insert(uri.to_string())
    }

    /// Unsubscribe from a resource URI. Returns `true` if it was present.
    pub fn unsubscribe(&self, uri: &str) -> bool {
        let mut set = self.subscribed.lock().unwrap();
        set.remove(uri)
    }

    /// Subscribed URIs touched by the given changes, each listed once.
    pub fn affected_subscriptions(&self, changes: &[EntityRef]) -> Vec<String> {
        let set = self.subscribed.lock().unwrap();
        if set.is_empty() {
            return Vec::new();
        }

        let mut result: Vec<String> = Vec::new();
        for entity in changes {
            for uri in [entity.uri(), entity.collection_uri().to_string()] {
                if set.contains(&uri) && !result.contains(&uri) {
                    result.push(uri);
                }
            }
        }
        result
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
