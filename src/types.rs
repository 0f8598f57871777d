//! Core types for the quest graph engine.

use serde::{Deserialize, Serialize};

/// Post types. Only task, log, commit and issue take part in addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    Task,
    Log,
    Commit,
    Issue,
    Request,
    Review,
    Free,
    MetaSystem,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Task => "task",
            PostType::Log => "log",
            PostType::Commit => "commit",
            PostType::Issue => "issue",
            PostType::Request => "request",
            PostType::Review => "review",
            PostType::Free => "free",
            PostType::MetaSystem => "meta_system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task" => Some(PostType::Task),
            "log" => Some(PostType::Log),
            "commit" => Some(PostType::Commit),
            "issue" => Some(PostType::Issue),
            "request" => Some(PostType::Request),
            "review" => Some(PostType::Review),
            "free" => Some(PostType::Free),
            "meta_system" => Some(PostType::MetaSystem),
            _ => None,
        }
    }

    /// One-letter address segment, or `None` for types that are never addressed.
    pub fn segment(&self) -> Option<char> {
        match self {
            PostType::Task => Some('T'),
            PostType::Log => Some('L'),
            PostType::Commit => Some('C'),
            PostType::Issue => Some('I'),
            _ => None,
        }
    }
}

/// Quest lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Completed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(QuestStatus::Active),
            "completed" => Some(QuestStatus::Completed),
            _ => None,
        }
    }
}

/// Moderation state of a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Flagged,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Flagged => "flagged",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "flagged" => Some(ApprovalStatus::Flagged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Hidden,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Hidden => "hidden",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "hidden" => Some(Visibility::Hidden),
            _ => None,
        }
    }
}

/// A structural parent -> child relation in a quest's task tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            edge_type: None,
            label: None,
        }
    }

    /// True if both endpoints match.
    pub fn connects(&self, from: &str, to: &str) -> bool {
        self.from == from && self.to == to
    }
}

/// What a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Post,
    Quest,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Post => "post",
            ItemType::Quest => "quest",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "post" => Some(ItemType::Post),
            "quest" => Some(ItemType::Quest),
            _ => None,
        }
    }
}

/// A loose, possibly cross-quest reference. Links may form cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub item_id: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub cascade_solution: bool,
    #[serde(default)]
    pub notify_on_change: bool,
}

impl Link {
    pub fn new(item_id: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            item_id: item_id.into(),
            item_type,
            cascade_solution: false,
            notify_on_change: false,
        }
    }

    pub fn cascading(mut self) -> Self {
        self.cascade_solution = true;
        self
    }

    pub fn notifying(mut self) -> Self {
        self.notify_on_change = true;
        self
    }
}

/// A quest and its task tree. Loaded and saved as one aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub author_id: Option<String>,
    pub head_post_id: String,
    pub task_graph: Vec<Edge>,
    pub linked_posts: Vec<Link>,
    pub status: QuestStatus,
    pub approval_status: ApprovalStatus,
    pub flag_count: i32,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A post. Posts attached to a quest carry a hierarchical `node_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub quest_id: Option<String>,
    pub post_type: PostType,
    pub author_id: Option<String>,
    pub content: String,
    pub reply_to: Option<String>,
    /// Explicit structural parent. Takes precedence over `reply_to`.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub node_id: Option<String>,
    pub tags: Vec<String>,
    pub linked_items: Vec<Link>,
    pub visibility: Visibility,
    pub archived_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// The post this one hangs under: explicit parent first, then reply target.
    pub fn structural_parent(&self) -> Option<&str> {
        self.parent_id.as_deref().or(self.reply_to.as_deref())
    }
}

/// Input for creating a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub quest_id: Option<String>,
    pub post_type: PostType,
    #[serde(default)]
    pub content: String,
    pub author_id: Option<String>,
    /// Reply target; the default structural parent.
    pub reply_to: Option<String>,
    /// Explicit structural parent, overriding `reply_to` for the task tree.
    pub parent_id: Option<String>,
    pub edge_type: Option<String>,
    pub edge_label: Option<String>,
}

impl NewPost {
    pub fn new(post_type: PostType) -> Self {
        Self {
            quest_id: None,
            post_type,
            content: String::new(),
            author_id: None,
            reply_to: None,
            parent_id: None,
            edge_type: None,
            edge_label: None,
        }
    }

    pub fn in_quest(mut self, quest_id: impl Into<String>) -> Self {
        self.quest_id = Some(quest_id.into());
        self
    }

    pub fn replying_to(mut self, post_id: impl Into<String>) -> Self {
        self.reply_to = Some(post_id.into());
        self
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// The post the new one hangs under: explicit parent first, then reply target.
    pub fn structural_parent(&self) -> Option<&str> {
        self.parent_id.as_deref().or(self.reply_to.as_deref())
    }
}

/// Partial update of a post. `Some(None)` clears a nullable field.
///
/// Patching `reply_to` or `quest_id` without `parent_id` drops the explicit
/// parent, so the post hangs under its reply target again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostPatch {
    pub quest_id: Option<Option<String>>,
    pub reply_to: Option<Option<String>>,
    pub parent_id: Option<Option<String>>,
    pub post_type: Option<PostType>,
    pub content: Option<String>,
}

/// Result of deleting a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The post anchored its quest; the quest was destroyed and the post left untouched.
    QuestDeleted { quest_id: String },
    PostDeleted {
        post_id: String,
        reparented: Vec<Edge>,
    },
}

/// Result of archiving a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveOutcome {
    pub post: Post,
    pub already_archived: bool,
    pub reparented: Vec<Edge>,
}

/// Result of a completion cascade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// Quests marked completed, in visiting order, each at most once.
    pub completed_quests: Vec<String>,
    /// Posts that received the solved tag.
    pub solved_posts: Vec<String>,
    /// Entities that asked to be told about the change.
    pub notifications: Vec<crate::notify::EntityRef>,
}

/// Result of flagging a quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagReport {
    pub quest_id: String,
    pub flag_count: i32,
    pub approval_status: ApprovalStatus,
    /// Id of the hidden moderation post, when this flag crossed the threshold.
    pub review_post_id: Option<String>,
}
