//! Task tree surgery and nested views.
//!
//! Every task node has at most one incoming edge. The head post is the implicit
//! root: a node without an incoming edge hangs under it.

use crate::types::{Edge, Post, PostType, Quest};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// New edge set plus the child edges that were moved to a new parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surgery {
    pub edges: Vec<Edge>,
    pub reparented: Vec<Edge>,
}

/// Structural parent of `node`: the source of its incoming edge, or the head post.
pub fn parent_of<'a>(edges: &'a [Edge], head_post_id: &'a str, node: &str) -> &'a str {
    edges
        .iter()
        .find(|e| e.to == node)
        .map(|e| e.from.as_str())
        .unwrap_or(head_post_id)
}

/// Direct children of `node`, in edge order.
pub fn children_of<'a>(edges: &'a [Edge], node: &str) -> Vec<&'a Edge> {
    edges.iter().filter(|e| e.from == node).collect()
}

/// Archive `node`: it stays under its parent, its children move up one level.
pub fn reparent_on_archive(edges: &[Edge], head_post_id: &str, node: &str) -> Surgery {
    splice(edges, head_post_id, node, false)
}

/// Permanently remove `node`: it leaves the tree, its children attach to its parent.
pub fn reparent_on_remove(edges: &[Edge], head_post_id: &str, node: &str) -> Surgery {
    splice(edges, head_post_id, node, true)
}

fn splice(edges: &[Edge], head_post_id: &str, node: &str, excise: bool) -> Surgery {
    let parent_id = parent_of(edges, head_post_id, node).to_string();
    let child_edges: Vec<&Edge> = children_of(edges, node);

    let mut next: Vec<Edge> = edges
        .iter()
        .filter(|e| e.from != node && !(excise && e.to == node))
        .cloned()
        .collect();

    let mut reparented = Vec::new();
    for child in child_edges {
        if next.iter().any(|e| e.connects(&parent_id, &child.to)) {
            continue;
        }
        let moved = Edge {
            from: parent_id.clone(),
            ..child.clone()
        };
        next.push(moved.clone());
        reparented.push(moved);
    }

    Surgery {
        edges: next,
        reparented,
    }
}

/// Insert `from -> to` unless `to` already has a parent. Returns whether it was added.
pub fn attach(edges: &mut Vec<Edge>, edge: Edge) -> bool {
    if edges.iter().any(|e| e.to == edge.to) {
        return false;
    }
    edges.push(edge);
    true
}

/// Drop the incoming edge of `node`, if any.
pub fn detach(edges: &mut Vec<Edge>, node: &str) -> bool {
    let before = edges.len();
    edges.retain(|e| e.to != node);
    edges.len() != before
}

/// A node in the nested tree view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub post_id: String,
    pub node_id: Option<String>,
    pub post_type: Option<PostType>,
    pub archived: bool,
    pub children: Vec<TreeNode>,
}

/// Build the nested task tree of a quest rooted at its head post.
///
/// Task posts without an incoming edge are listed under the head post. A node
/// already placed is never expanded twice, so cycles terminate.
pub fn nest(quest: &Quest, posts: &[Post]) -> TreeNode {
    let by_id: HashMap<&str, &Post> = posts.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &quest.task_graph {
        children
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    let has_parent: HashSet<&str> = quest.task_graph.iter().map(|e| e.to.as_str()).collect();
    let head = quest.head_post_id.as_str();
    let orphans: Vec<&str> = posts
        .iter()
        .filter(|p| p.post_type == PostType::Task)
        .filter(|p| p.quest_id.as_deref() == Some(quest.id.as_str()))
        .map(|p| p.id.as_str())
        .filter(|id| *id != head && !has_parent.contains(id))
        .collect();
    children.entry(head).or_default().extend(orphans);

    let mut placed = HashSet::new();
    build_node(head, &children, &by_id, &mut placed)
}

fn build_node<'a>(
    id: &'a str,
    children: &HashMap<&'a str, Vec<&'a str>>,
    by_id: &HashMap<&str, &Post>,
    placed: &mut HashSet<&'a str>,
) -> TreeNode {
    placed.insert(id);
    let post = by_id.get(id);

    let mut nested = Vec::new();
    if let Some(kids) = children.get(id) {
        for &kid in kids {
            if placed.contains(kid) {
                continue;
            }
            nested.push(build_node(kid, children, by_id, placed));
        }
    }

    TreeNode {
        post_id: id.to_string(),
        node_id: post.and_then(|p| p.node_id.clone()),
        post_type: post.map(|p| p.post_type),
        archived: post.map(|p| p.is_archived()).unwrap_or(false),
        children: nested,
    }
}
