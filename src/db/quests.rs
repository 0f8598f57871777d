//! Quest aggregate storage and quest-level lifecycle operations.

use super::counters::allocate_node_id;
use super::posts::{insert_post, load_post, posts_in_quest, update_post_row};
use super::{Database, new_id, now_ms};
use crate::config::EngineConfig;
use crate::error::ToolError;
use crate::graph::links::cascade_completion;
use crate::graph::moderation::apply_flag;
use crate::graph::tree::{TreeNode, nest};
use crate::graph::validate::{Violation, check_quest};
use crate::types::{
    ApprovalStatus, CascadeReport, Edge, FlagReport, ItemType, Link, Post, PostType, Quest,
    QuestStatus, Visibility,
};
use anyhow::Result;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Violations found in one quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestViolations {
    pub quest_id: String,
    pub violations: Vec<Violation>,
}

fn parse_quest_row(row: &Row) -> rusqlite::Result<Quest> {
    let status: String = row.get("status")?;
    let approval_status: String = row.get("approval_status")?;

    Ok(Quest {
        id: row.get("id")?,
        title: row.get("title")?,
        author_id: row.get("author_id")?,
        head_post_id: row.get("head_post_id")?,
        task_graph: Vec::new(),
        linked_posts: Vec::new(),
        status: QuestStatus::from_str(&status).unwrap_or(QuestStatus::Active),
        approval_status: ApprovalStatus::from_str(&approval_status)
            .unwrap_or(ApprovalStatus::Pending),
        flag_count: row.get("flag_count")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn load_edges(conn: &Connection, quest_id: &str) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        "SELECT from_id, to_id, edge_type, label FROM task_edges
         WHERE quest_id = ?1 ORDER BY seq",
    )?;
    let edges = stmt
        .query_map(params![quest_id], |row| {
            Ok(Edge {
                from: row.get(0)?,
                to: row.get(1)?,
                edge_type: row.get(2)?,
                label: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

fn parse_link_row(row: &Row) -> rusqlite::Result<Link> {
    let item_type: String = row.get("item_type")?;
    Ok(Link {
        item_id: row.get("item_id")?,
        item_type: ItemType::from_str(&item_type).unwrap_or(ItemType::Post),
        cascade_solution: row.get("cascade_solution")?,
        notify_on_change: row.get("notify_on_change")?,
    })
}

fn load_links(conn: &Connection, quest_id: &str) -> Result<Vec<Link>> {
    let mut stmt = conn.prepare(
        "SELECT item_id, item_type, cascade_solution, notify_on_change FROM quest_links
         WHERE quest_id = ?1 ORDER BY seq",
    )?;
    let links = stmt
        .query_map(params![quest_id], parse_link_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(links)
}

/// Outgoing links of every quest, keyed by quest id. Quests without links map to an empty list.
fn load_link_graph(conn: &Connection) -> Result<HashMap<String, Vec<Link>>> {
    let mut graph: HashMap<String, Vec<Link>> = HashMap::new();

    let mut stmt = conn.prepare("SELECT id FROM quests")?;
    for id in stmt.query_map([], |row| row.get::<_, String>(0))? {
        graph.insert(id?, Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT quest_id, item_id, item_type, cascade_solution, notify_on_change
         FROM quest_links ORDER BY quest_id, seq",
    )?;
    let rows = stmt.query_map([], |row| {
        let quest_id: String = row.get("quest_id")?;
        Ok((quest_id, parse_link_row(row)?))
    })?;
    for row in rows {
        let (quest_id, link) = row?;
        graph.entry(quest_id).or_default().push(link);
    }

    Ok(graph)
}

/// Load a full quest aggregate.
pub(crate) fn load_quest(conn: &Connection, quest_id: &str) -> Result<Option<Quest>> {
    let mut stmt = conn.prepare("SELECT * FROM quests WHERE id = ?1")?;
    let result = stmt.query_row(params![quest_id], parse_quest_row);

    let mut quest = match result {
        Ok(quest) => quest,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    quest.task_graph = load_edges(conn, quest_id)?;
    quest.linked_posts = load_links(conn, quest_id)?;
    Ok(Some(quest))
}

/// Load a quest or fail with `QUEST_NOT_FOUND`.
pub(crate) fn require_quest(conn: &Connection, quest_id: &str) -> Result<Quest> {
    load_quest(conn, quest_id)?.ok_or_else(|| ToolError::quest_not_found(quest_id).into())
}

fn write_edges(conn: &Connection, quest_id: &str, edges: &[Edge]) -> Result<()> {
    conn.execute("DELETE FROM task_edges WHERE quest_id = ?1", params![quest_id])?;
    for (seq, edge) in edges.iter().enumerate() {
        conn.execute(
            "INSERT INTO task_edges (quest_id, seq, from_id, to_id, edge_type, label)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![quest_id, seq as i64, edge.from, edge.to, edge.edge_type, edge.label],
        )?;
    }
    Ok(())
}

fn write_links(conn: &Connection, quest_id: &str, links: &[Link]) -> Result<()> {
    conn.execute("DELETE FROM quest_links WHERE quest_id = ?1", params![quest_id])?;
    for (seq, link) in links.iter().enumerate() {
        conn.execute(
            "INSERT INTO quest_links (quest_id, seq, item_id, item_type, cascade_solution, notify_on_change)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                quest_id,
                seq as i64,
                link.item_id,
                link.item_type.as_str(),
                link.cascade_solution,
                link.notify_on_change
            ],
        )?;
    }
    Ok(())
}

fn insert_quest(conn: &Connection, quest: &Quest) -> Result<()> {
    conn.execute(
        "INSERT INTO quests (id, title, author_id, head_post_id, status, approval_status,
                             flag_count, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            quest.id,
            quest.title,
            quest.author_id,
            quest.head_post_id,
            quest.status.as_str(),
            quest.approval_status.as_str(),
            quest.flag_count,
            quest.completed_at,
            quest.created_at,
            quest.updated_at
        ],
    )?;
    write_edges(conn, &quest.id, &quest.task_graph)?;
    write_links(conn, &quest.id, &quest.linked_posts)?;
    Ok(())
}

/// Write the whole aggregate back: row fields, task graph and links.
pub(crate) fn save_quest(conn: &Connection, quest: &mut Quest) -> Result<()> {
    quest.updated_at = now_ms();
    conn.execute(
        "UPDATE quests SET title = ?1, status = ?2, approval_status = ?3, flag_count = ?4,
                completed_at = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            quest.title,
            quest.status.as_str(),
            quest.approval_status.as_str(),
            quest.flag_count,
            quest.completed_at,
            quest.updated_at,
            quest.id
        ],
    )?;
    write_edges(conn, &quest.id, &quest.task_graph)?;
    write_links(conn, &quest.id, &quest.linked_posts)?;
    Ok(())
}

/// Destroy a quest record together with its edges, links and counters.
pub(crate) fn delete_quest_rows(conn: &Connection, quest_id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM quests WHERE id = ?1", params![quest_id])?;
    Ok(deleted > 0)
}

fn load_all_quests(conn: &Connection) -> Result<Vec<Quest>> {
    let ids: Vec<String> = {
        let mut stmt = conn.prepare("SELECT id FROM quests ORDER BY created_at, id")?;
        stmt.query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut quests = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(quest) = load_quest(conn, &id)? {
            quests.push(quest);
        }
    }
    Ok(quests)
}

impl Database {
    /// Create a quest together with its head post.
    ///
    /// The head post is a task addressed `Q:<slug>:T00`; the task graph starts empty.
    pub fn create_quest(
        &self,
        title: &str,
        author_id: Option<&str>,
        content: Option<&str>,
        engine: &EngineConfig,
    ) -> Result<(Quest, Post)> {
        if title.trim().is_empty() {
            return Err(ToolError::missing_field("title").into());
        }

        self.with_tx(|tx| {
            let now = now_ms();
            let quest = Quest {
                id: new_id(),
                title: title.to_string(),
                author_id: author_id.map(String::from),
                head_post_id: new_id(),
                task_graph: Vec::new(),
                linked_posts: Vec::new(),
                status: QuestStatus::Active,
                approval_status: ApprovalStatus::Approved,
                flag_count: 0,
                completed_at: None,
                created_at: now,
                updated_at: now,
            };
            insert_quest(tx, &quest)?;

            let node_id =
                allocate_node_id(tx, &quest, &[], PostType::Task, None, engine.addressing)?;
            let head = Post {
                id: quest.head_post_id.clone(),
                quest_id: Some(quest.id.clone()),
                post_type: PostType::Task,
                author_id: author_id.map(String::from),
                content: content.unwrap_or(title).to_string(),
                reply_to: None,
                parent_id: None,
                node_id,
                tags: Vec::new(),
                linked_items: Vec::new(),
                visibility: Visibility::Public,
                archived_at: None,
                created_at: now,
                updated_at: now,
            };
            insert_post(tx, &head)?;

            info!(quest_id = %quest.id, head_post_id = %head.id, "Quest created");
            Ok((quest, head))
        })
    }

    /// Get a quest aggregate by id.
    pub fn get_quest(&self, quest_id: &str) -> Result<Option<Quest>> {
        self.with_conn(|conn| load_quest(conn, quest_id))
    }

    /// List all quests, oldest first.
    pub fn list_quests(&self) -> Result<Vec<Quest>> {
        self.with_conn(load_all_quests)
    }

    /// Append a link to a quest. The target must exist; duplicates are allowed.
    pub fn link_item(&self, quest_id: &str, link: Link) -> Result<Quest> {
        self.with_tx(|tx| {
            let mut quest = require_quest(tx, quest_id)?;

            let target_exists = match link.item_type {
                ItemType::Quest => load_quest(tx, &link.item_id)?.is_some(),
                ItemType::Post => load_post(tx, &link.item_id)?.is_some(),
            };
            if !target_exists {
                return Err(match link.item_type {
                    ItemType::Quest => ToolError::quest_not_found(&link.item_id),
                    ItemType::Post => ToolError::post_not_found(&link.item_id),
                }
                .with_field("item_id")
                .into());
            }

            debug!(quest_id = %quest_id, item_id = %link.item_id, "Linking item");
            quest.linked_posts.push(link);
            save_quest(tx, &mut quest)?;
            Ok(quest)
        })
    }

    /// Remove every link from `quest_id` to `item_id`. Returns how many were removed.
    pub fn unlink_item(&self, quest_id: &str, item_id: &str) -> Result<usize> {
        self.with_tx(|tx| {
            let mut quest = require_quest(tx, quest_id)?;
            let before = quest.linked_posts.len();
            quest.linked_posts.retain(|l| l.item_id != item_id);
            let removed = before - quest.linked_posts.len();
            if removed > 0 {
                save_quest(tx, &mut quest)?;
            }
            Ok(removed)
        })
    }

    /// Record a flag against a quest.
    ///
    /// Crossing the threshold while approved moves the quest to `flagged` and
    /// files a hidden moderation post that links back to it.
    pub fn flag_quest(
        &self,
        quest_id: &str,
        reporter_id: Option<&str>,
        engine: &EngineConfig,
    ) -> Result<FlagReport> {
        self.with_tx(|tx| {
            let mut quest = require_quest(tx, quest_id)?;
            let newly_flagged = apply_flag(&mut quest, engine.flag_threshold);
            save_quest(tx, &mut quest)?;

            let review_post_id = if newly_flagged {
                let now = now_ms();
                let review = Post {
                    id: new_id(),
                    quest_id: None,
                    post_type: PostType::MetaSystem,
                    author_id: None,
                    content: format!(
                        "Quest \"{}\" reached {} flags and needs review.",
                        quest.title, quest.flag_count
                    ),
                    reply_to: None,
                    parent_id: None,
                    node_id: None,
                    tags: vec!["moderation".to_string()],
                    linked_items: vec![Link::new(quest.id.clone(), ItemType::Quest)],
                    visibility: Visibility::Hidden,
                    archived_at: None,
                    created_at: now,
                    updated_at: now,
                };
                insert_post(tx, &review)?;
                warn!(
                    quest_id = %quest.id,
                    flag_count = quest.flag_count,
                    review_post_id = %review.id,
                    "Quest flagged for moderation"
                );
                Some(review.id)
            } else {
                debug!(
                    quest_id = %quest.id,
                    flag_count = quest.flag_count,
                    reporter = ?reporter_id,
                    "Quest flag recorded"
                );
                None
            };

            Ok(FlagReport {
                quest_id: quest.id,
                flag_count: quest.flag_count,
                approval_status: quest.approval_status,
                review_post_id,
            })
        })
    }

    /// Mark a quest completed and cascade through its links.
    ///
    /// Each quest reached is completed at most once, linked posts marked for
    /// cascading get the solved tag, and notify-only links are reported back.
    pub fn complete_quest(&self, quest_id: &str, engine: &EngineConfig) -> Result<CascadeReport> {
        self.with_tx(|tx| {
            require_quest(tx, quest_id)?;

            let link_graph = load_link_graph(tx)?;
            let mut report = cascade_completion(quest_id, |id| link_graph.get(id).cloned());

            let now = now_ms();
            for id in &report.completed_quests {
                tx.execute(
                    "UPDATE quests SET status = ?1, completed_at = COALESCE(completed_at, ?2),
                            updated_at = ?2
                     WHERE id = ?3",
                    params![QuestStatus::Completed.as_str(), now, id],
                )?;
            }

            let mut solved = Vec::with_capacity(report.solved_posts.len());
            for post_id in &report.solved_posts {
                let Some(mut post) = load_post(tx, post_id)? else {
                    debug!(post_id = %post_id, "Skipping missing linked post");
                    continue;
                };
                if !post.tags.contains(&engine.solved_tag) {
                    post.tags.push(engine.solved_tag.clone());
                    post.updated_at = now;
                    update_post_row(tx, &post)?;
                }
                solved.push(post.id);
            }
            report.solved_posts = solved;

            info!(
                quest_id = %quest_id,
                completed = report.completed_quests.len(),
                solved = report.solved_posts.len(),
                notified = report.notifications.len(),
                "Quest completion cascade finished"
            );
            Ok(report)
        })
    }

    /// Nested task tree of a quest, rooted at its head post.
    pub fn quest_tree(&self, quest_id: &str) -> Result<TreeNode> {
        self.with_conn(|conn| {
            let quest = require_quest(conn, quest_id)?;
            let posts = posts_in_quest(conn, quest_id)?;
            Ok(nest(&quest, &posts))
        })
    }

    /// Check graph invariants for one quest or all quests.
    ///
    /// Only quests with at least one violation are returned.
    pub fn check_graph(&self, quest_id: Option<&str>) -> Result<Vec<QuestViolations>> {
        self.with_conn(|conn| {
            let quests = match quest_id {
                Some(id) => vec![require_quest(conn, id)?],
                None => load_all_quests(conn)?,
            };

            let mut found = Vec::new();
            for quest in quests {
                let posts = posts_in_quest(conn, &quest.id)?;
                let violations = check_quest(&quest, &posts);
                if !violations.is_empty() {
                    found.push(QuestViolations {
                        quest_id: quest.id,
                        violations,
                    });
                }
            }
            Ok(found)
        })
    }
}
