//! Node address allocation.
//!
//! In counter mode the next number for each address prefix is stored per quest
//! and bumped inside the caller's transaction, so two posts can never be handed
//! the same address. The stored value never falls behind the number of
//! siblings already present, which keeps quests created before counters
//! existed numbering where they left off.

use super::Database;
use crate::config::AddressingMode;
use crate::graph::address::{address_prefix, compute_node_id, count_siblings, zero_pad};
use crate::types::{Post, PostType, Quest};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

/// Assign an address for a post of `post_type` under `parent` in `quest`.
///
/// `siblings` must not contain the post being addressed.
pub(crate) fn allocate_node_id(
    conn: &Connection,
    quest: &Quest,
    siblings: &[Post],
    post_type: PostType,
    parent: Option<&Post>,
    mode: AddressingMode,
) -> Result<Option<String>> {
    if mode == AddressingMode::Scan {
        return Ok(compute_node_id(quest, siblings, post_type, parent));
    }

    let Some(prefix) = address_prefix(quest, post_type, parent) else {
        return Ok(None);
    };
    let scanned = count_siblings(quest, siblings, post_type, &prefix);

    let stored: Option<i64> = conn
        .query_row(
            "SELECT next_value FROM address_counters WHERE quest_id = ?1 AND prefix = ?2",
            params![quest.id, prefix],
            |row| row.get(0),
        )
        .optional()?;
    let value = stored.map(|v| v.max(0) as usize).unwrap_or(0).max(scanned);

    conn.execute(
        "INSERT INTO address_counters (quest_id, prefix, next_value) VALUES (?1, ?2, ?3)
         ON CONFLICT(quest_id, prefix) DO UPDATE SET next_value = excluded.next_value",
        params![quest.id, prefix, (value + 1) as i64],
    )?;

    Ok(Some(format!("{}{}", prefix, zero_pad(value))))
}

impl Database {
    /// Stored address counters of a quest as `(prefix, next_value)`, sorted by prefix.
    pub fn address_counters(&self, quest_id: &str) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT prefix, next_value FROM address_counters
                 WHERE quest_id = ?1 ORDER BY prefix",
            )?;
            let rows = stmt
                .query_map(params![quest_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}
