//! Post storage and post-level lifecycle operations.
//!
//! Creating, patching, archiving and deleting a post may rewrite the task
//! graph of the quest it belongs to. Both writes happen in the same
//! transaction.

use super::counters::allocate_node_id;
use super::quests::{delete_quest_rows, load_quest, require_quest, save_quest};
use super::{Database, new_id, now_ms};
use crate::config::EngineConfig;
use crate::error::ToolError;
use crate::graph::tree::{attach, detach, parent_of, reparent_on_archive, reparent_on_remove};
use crate::types::{
    ArchiveOutcome, DeleteOutcome, Edge, Link, NewPost, Post, PostPatch, PostType, Quest,
    Visibility,
};
use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use std::collections::HashSet;
use tracing::{debug, info};

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        let col = row.as_ref().column_index(idx).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e))
    })
}

fn parse_post_row(row: &Row) -> rusqlite::Result<Post> {
    let post_type: String = row.get("post_type")?;
    let visibility: String = row.get("visibility")?;

    Ok(Post {
        id: row.get("id")?,
        quest_id: row.get("quest_id")?,
        post_type: PostType::from_str(&post_type).unwrap_or(PostType::Free),
        author_id: row.get("author_id")?,
        content: row.get("content")?,
        reply_to: row.get("reply_to")?,
        parent_id: row.get("parent_id")?,
        node_id: row.get("node_id")?,
        tags: json_column(row, "tags")?,
        linked_items: json_column::<Vec<Link>>(row, "linked_items")?,
        visibility: Visibility::from_str(&visibility).unwrap_or(Visibility::Public),
        archived_at: row.get("archived_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn load_post(conn: &Connection, post_id: &str) -> Result<Option<Post>> {
    let mut stmt = conn.prepare("SELECT * FROM posts WHERE id = ?1")?;
    match stmt.query_row(params![post_id], parse_post_row) {
        Ok(post) => Ok(Some(post)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn require_post(conn: &Connection, post_id: &str) -> Result<Post> {
    load_post(conn, post_id)?.ok_or_else(|| ToolError::post_not_found(post_id).into())
}

/// All posts carrying `quest_id`, oldest first.
pub(crate) fn posts_in_quest(conn: &Connection, quest_id: &str) -> Result<Vec<Post>> {
    let mut stmt =
        conn.prepare("SELECT * FROM posts WHERE quest_id = ?1 ORDER BY created_at, id")?;
    let posts = stmt
        .query_map(params![quest_id], parse_post_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(posts)
}

pub(crate) fn insert_post(conn: &Connection, post: &Post) -> Result<()> {
    conn.execute(
        "INSERT INTO posts (id, quest_id, post_type, author_id, content, reply_to, parent_id,
                            node_id, tags, linked_items, visibility, archived_at, created_at,
                            updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            post.id,
            post.quest_id,
            post.post_type.as_str(),
            post.author_id,
            post.content,
            post.reply_to,
            post.parent_id,
            post.node_id,
            serde_json::to_string(&post.tags)?,
            serde_json::to_string(&post.linked_items)?,
            post.visibility.as_str(),
            post.archived_at,
            post.created_at,
            post.updated_at
        ],
    )?;
    Ok(())
}

pub(crate) fn update_post_row(conn: &Connection, post: &Post) -> Result<()> {
    conn.execute(
        "UPDATE posts SET quest_id = ?1, post_type = ?2, content = ?3, reply_to = ?4,
                parent_id = ?5, node_id = ?6, tags = ?7, linked_items = ?8, visibility = ?9,
                archived_at = ?10, updated_at = ?11
         WHERE id = ?12",
        params![
            post.quest_id,
            post.post_type.as_str(),
            post.content,
            post.reply_to,
            post.parent_id,
            post.node_id,
            serde_json::to_string(&post.tags)?,
            serde_json::to_string(&post.linked_items)?,
            post.visibility.as_str(),
            post.archived_at,
            post.updated_at,
            post.id
        ],
    )?;
    Ok(())
}

/// Resolve a structural parent. It must exist and live in `quest_id`.
fn resolve_parent(
    conn: &Connection,
    quest_id: &str,
    parent_id: &str,
    field: &str,
) -> Result<Post> {
    let parent = load_post(conn, parent_id)?
        .ok_or_else(|| ToolError::parent_not_found(parent_id).with_field(field))?;
    if parent.quest_id.as_deref() != Some(quest_id) {
        return Err(ToolError::invalid_value(
            field,
            &format!("Parent {} does not belong to quest {}", parent_id, quest_id),
        )
        .into());
    }
    Ok(parent)
}

/// True if `ancestor` sits on the parent chain of `node`.
fn is_ancestor(quest: &Quest, ancestor: &str, node: &str) -> bool {
    let head = quest.head_post_id.as_str();
    let mut seen = HashSet::new();
    let mut current = node;
    while current != head && seen.insert(current) {
        if current == ancestor {
            return true;
        }
        current = parent_of(&quest.task_graph, head, current);
    }
    current == ancestor
}

/// Edge for a task hanging under `parent`. Only task parents carry tree edges.
fn tree_edge(parent: &Post, child_id: &str, edge_type: Option<String>, label: Option<String>) -> Option<Edge> {
    (parent.post_type == PostType::Task).then(|| Edge {
        from: parent.id.clone(),
        to: child_id.to_string(),
        edge_type,
        label,
    })
}

impl Database {
    /// Create a post, addressing it when it joins a quest.
    ///
    /// A task with a parent also gets an edge in the quest's task graph.
    pub fn create_post(&self, new: NewPost, engine: &EngineConfig) -> Result<Post> {
        self.with_tx(|tx| {
            let now = now_ms();
            let id = new_id();

            let mut context: Option<(Quest, Option<Post>)> = None;
            if let Some(quest_id) = new.quest_id.as_deref() {
                let quest = require_quest(tx, quest_id)?;
                let field = if new.parent_id.is_some() {
                    "parent_id"
                } else {
                    "reply_to"
                };
                let parent = new
                    .structural_parent()
                    .map(|pid| resolve_parent(tx, quest_id, pid, field))
                    .transpose()?;
                context = Some((quest, parent));
            } else if let Some(reply_to) = new.reply_to.as_deref()
                && load_post(tx, reply_to)?.is_none()
            {
                return Err(ToolError::parent_not_found(reply_to)
                    .with_field("reply_to")
                    .into());
            }

            let node_id = match &context {
                Some((quest, parent)) => {
                    let siblings = posts_in_quest(tx, &quest.id)?;
                    allocate_node_id(
                        tx,
                        quest,
                        &siblings,
                        new.post_type,
                        parent.as_ref(),
                        engine.addressing,
                    )?
                }
                None => None,
            };

            let post = Post {
                id,
                quest_id: new.quest_id.clone(),
                post_type: new.post_type,
                author_id: new.author_id.clone(),
                content: new.content.clone(),
                reply_to: new.reply_to.clone(),
                parent_id: new.parent_id.clone(),
                node_id,
                tags: Vec::new(),
                linked_items: Vec::new(),
                visibility: Visibility::Public,
                archived_at: None,
                created_at: now,
                updated_at: now,
            };
            insert_post(tx, &post)?;

            if let Some((mut quest, Some(parent))) = context
                && post.post_type == PostType::Task
                && let Some(edge) =
                    tree_edge(&parent, &post.id, new.edge_type.clone(), new.edge_label.clone())
                && attach(&mut quest.task_graph, edge)
            {
                save_quest(tx, &mut quest)?;
            }

            info!(
                post_id = %post.id,
                quest_id = ?post.quest_id,
                node_id = ?post.node_id,
                post_type = post.post_type.as_str(),
                "Post created"
            );
            Ok(post)
        })
    }

    /// Get a post by id.
    pub fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        self.with_conn(|conn| load_post(conn, post_id))
    }

    /// List posts of one quest, or every post when `quest_id` is `None`.
    pub fn list_posts(&self, quest_id: Option<&str>) -> Result<Vec<Post>> {
        self.with_conn(|conn| match quest_id {
            Some(quest_id) => posts_in_quest(conn, quest_id),
            None => {
                let mut stmt = conn.prepare("SELECT * FROM posts ORDER BY created_at, id")?;
                let posts = stmt
                    .query_map([], parse_post_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(posts)
            }
        })
    }

    /// Patch a post.
    ///
    /// Changing the quest, the structural parent or the type re-derives the
    /// address from scratch against the new context, and moves the post in the
    /// task graph: a task leaving its quest or its type is removed like a
    /// delete, a task changing parent is detached and attached again. A post
    /// whose quest no longer exists loses its address and is otherwise patched
    /// as usual.
    pub fn update_post(&self, post_id: &str, patch: PostPatch, engine: &EngineConfig) -> Result<Post> {
        self.with_tx(|tx| {
            let mut post = require_post(tx, post_id)?;
            let old_quest_id = post.quest_id.clone();
            let old_parent = post.structural_parent().map(String::from);
            let old_type = post.post_type;

            if let Some(content) = patch.content {
                post.content = content;
            }
            let moved = patch
                .quest_id
                .as_ref()
                .is_some_and(|q| *q != post.quest_id);

            if let Some(parent_id) = patch.parent_id {
                post.parent_id = parent_id;
            } else if moved || patch.reply_to.is_some() {
                post.parent_id = None;
            }
            if let Some(quest_id) = patch.quest_id {
                post.quest_id = quest_id;
            }
            if let Some(reply_to) = patch.reply_to {
                post.reply_to = reply_to;
            }
            if let Some(post_type) = patch.post_type {
                post.post_type = post_type;
            }
            let reparented = post.structural_parent() != old_parent.as_deref();
            let retyped = post.post_type != old_type;

            if moved || reparented || retyped {
                let old_quest = match old_quest_id.as_deref() {
                    Some(id) => load_quest(tx, id)?,
                    None => None,
                };
                if let Some(quest) = &old_quest
                    && quest.head_post_id == post.id
                {
                    return Err(ToolError::invalid_value(
                        "post_id",
                        "The head post of a quest cannot change quest, parent or type",
                    )
                    .into());
                }

                let parent_field = if post.parent_id.is_some() {
                    "parent_id"
                } else {
                    "reply_to"
                };
                for (field, target) in [("reply_to", &post.reply_to), ("parent_id", &post.parent_id)] {
                    if target.as_deref() == Some(post.id.as_str()) {
                        return Err(ToolError::invalid_value(
                            field,
                            "A post cannot be its own parent",
                        )
                        .into());
                    }
                }

                // Take the post out of its old place in the tree.
                if let Some(mut quest) = old_quest
                    && old_type == PostType::Task
                {
                    let leaves_tree = moved || post.post_type != PostType::Task;
                    if leaves_tree {
                        let surgery = reparent_on_remove(&quest.task_graph, &quest.head_post_id, &post.id);
                        quest.task_graph = surgery.edges;
                        save_quest(tx, &mut quest)?;
                    } else if detach(&mut quest.task_graph, &post.id) {
                        save_quest(tx, &mut quest)?;
                    }
                }

                post.node_id = None;
                if let Some(quest_id) = post.quest_id.clone() {
                    let quest = if moved {
                        Some(require_quest(tx, &quest_id)?)
                    } else {
                        load_quest(tx, &quest_id)?
                    };
                    match quest {
                        Some(mut quest) => {
                            let parent = post
                                .structural_parent()
                                .map(|pid| resolve_parent(tx, &quest_id, pid, parent_field))
                                .transpose()?;

                            let siblings: Vec<Post> = posts_in_quest(tx, &quest_id)?
                                .into_iter()
                                .filter(|p| p.id != post.id)
                                .collect();
                            post.node_id = allocate_node_id(
                                tx,
                                &quest,
                                &siblings,
                                post.post_type,
                                parent.as_ref(),
                                engine.addressing,
                            )?;

                            if post.post_type == PostType::Task
                                && let Some(parent) = &parent
                            {
                                if is_ancestor(&quest, &post.id, &parent.id) {
                                    return Err(ToolError::invalid_value(
                                        parent_field,
                                        "A task cannot be moved under its own subtree",
                                    )
                                    .into());
                                }
                                if let Some(edge) = tree_edge(parent, &post.id, None, None)
                                    && attach(&mut quest.task_graph, edge)
                                {
                                    save_quest(tx, &mut quest)?;
                                }
                            }
                        }
                        None => debug!(
                            post_id = %post.id,
                            quest_id = %quest_id,
                            "Quest missing, skipping address and tree surgery"
                        ),
                    }
                }

                debug!(
                    post_id = %post.id,
                    quest_id = ?post.quest_id,
                    node_id = ?post.node_id,
                    "Post address re-derived"
                );
            }

            post.updated_at = now_ms();
            update_post_row(tx, &post)?;
            Ok(post)
        })
    }

    /// Archive a post.
    ///
    /// An archived task keeps its place but its children move up to its parent.
    /// Archiving twice is a no-op.
    pub fn archive_post(&self, post_id: &str) -> Result<ArchiveOutcome> {
        self.with_tx(|tx| {
            let mut post = require_post(tx, post_id)?;
            if post.is_archived() {
                return Ok(ArchiveOutcome {
                    post,
                    already_archived: true,
                    reparented: Vec::new(),
                });
            }

            let now = now_ms();
            post.archived_at = Some(now);
            post.updated_at = now;
            update_post_row(tx, &post)?;

            let mut reparented = Vec::new();
            if post.post_type == PostType::Task
                && let Some(quest_id) = post.quest_id.as_deref()
            {
                match load_quest(tx, quest_id)? {
                    Some(mut quest) if quest.head_post_id != post.id => {
                        let surgery =
                            reparent_on_archive(&quest.task_graph, &quest.head_post_id, &post.id);
                        if surgery.edges != quest.task_graph {
                            quest.task_graph = surgery.edges;
                            save_quest(tx, &mut quest)?;
                        }
                        reparented = surgery.reparented;
                    }
                    Some(_) => {}
                    None => debug!(post_id = %post.id, quest_id, "Quest missing, skipping tree surgery"),
                }
            }

            info!(post_id = %post.id, reparented = reparented.len(), "Post archived");
            Ok(ArchiveOutcome {
                post,
                already_archived: false,
                reparented,
            })
        })
    }

    /// Permanently delete a post.
    ///
    /// Deleting the head post destroys its quest instead and leaves the post
    /// itself in place. Deleting any other task excises it from the tree and
    /// promotes its children to its parent.
    pub fn delete_post(&self, post_id: &str) -> Result<DeleteOutcome> {
        self.with_tx(|tx| {
            let post = require_post(tx, post_id)?;

            let quest = match post.quest_id.as_deref() {
                Some(quest_id) => load_quest(tx, quest_id)?,
                None => None,
            };

            if let Some(quest) = &quest
                && quest.head_post_id == post.id
            {
                delete_quest_rows(tx, &quest.id)?;
                info!(quest_id = %quest.id, head_post_id = %post.id, "Head post deleted, quest destroyed");
                return Ok(DeleteOutcome::QuestDeleted {
                    quest_id: quest.id.clone(),
                });
            }

            let mut reparented = Vec::new();
            match quest {
                Some(mut quest) if post.post_type == PostType::Task => {
                    let surgery =
                        reparent_on_remove(&quest.task_graph, &quest.head_post_id, &post.id);
                    if surgery.edges != quest.task_graph {
                        quest.task_graph = surgery.edges;
                        save_quest(tx, &mut quest)?;
                    }
                    reparented = surgery.reparented;
                }
                None if post.quest_id.is_some() => {
                    debug!(post_id = %post.id, quest_id = ?post.quest_id, "Quest missing, skipping tree surgery");
                }
                _ => {}
            }

            tx.execute("DELETE FROM posts WHERE id = ?1", params![post.id])?;
            info!(post_id = %post.id, reparented = reparented.len(), "Post deleted");
            Ok(DeleteOutcome::PostDeleted {
                post_id: post.id,
                reparented,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApprovalStatus, QuestStatus};

    fn quest(edges: &[(&str, &str)]) -> Quest {
        Quest {
            id: "q".to_string(),
            title: "Q".to_string(),
            author_id: None,
            head_post_id: "H".to_string(),
            task_graph: edges.iter().map(|(f, t)| Edge::new(*f, *t)).collect(),
            linked_posts: vec![],
            status: QuestStatus::Active,
            approval_status: ApprovalStatus::Approved,
            flag_count: 0,
            completed_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn ancestor_walks_parent_chain() {
        let q = quest(&[("A", "B"), ("B", "C")]);
        assert!(is_ancestor(&q, "A", "C"));
        assert!(is_ancestor(&q, "C", "C"));
        assert!(is_ancestor(&q, "H", "C"));
        assert!(!is_ancestor(&q, "C", "A"));
    }

    #[test]
    fn ancestor_terminates_on_cycles() {
        let q = quest(&[("A", "B"), ("B", "A")]);
        assert!(!is_ancestor(&q, "X", "A"));
    }
}
