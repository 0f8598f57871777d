//! Invariant checks over a quest aggregate.

use crate::types::{Post, Quest};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Violation {
    /// A node has more than one incoming edge.
    MultipleParents { node: String, parents: Vec<String> },
    /// The same `(from, to)` pair appears more than once.
    DuplicateEdge { from: String, to: String },
    /// An edge endpoint is neither the head post nor a post of this quest.
    ForeignEndpoint { post_id: String },
    /// These nodes sit on or behind a cycle.
    Cycle { nodes: Vec<String> },
}

/// Check the task tree of `quest` against the posts that belong to it.
pub fn check_quest(quest: &Quest, posts: &[Post]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let edges = &quest.task_graph;

    let mut seen_pairs: HashSet<(&str, &str)> = HashSet::new();
    let mut reported_pairs: HashSet<(&str, &str)> = HashSet::new();
    for edge in edges {
        let pair = (edge.from.as_str(), edge.to.as_str());
        if !seen_pairs.insert(pair) && reported_pairs.insert(pair) {
            violations.push(Violation::DuplicateEdge {
                from: edge.from.clone(),
                to: edge.to.clone(),
            });
        }
    }

    let mut parents: HashMap<&str, Vec<String>> = HashMap::new();
    for edge in edges {
        let list = parents.entry(edge.to.as_str()).or_default();
        if !list.contains(&edge.from) {
            list.push(edge.from.clone());
        }
    }
    let mut multi: Vec<(&str, Vec<String>)> = parents
        .into_iter()
        .filter(|(_, from)| from.len() > 1)
        .collect();
    multi.sort_by(|a, b| a.0.cmp(b.0));
    for (node, from) in multi {
        violations.push(Violation::MultipleParents {
            node: node.to_string(),
            parents: from,
        });
    }

    let members: HashSet<&str> = posts
        .iter()
        .filter(|p| p.quest_id.as_deref() == Some(quest.id.as_str()))
        .map(|p| p.id.as_str())
        .collect();
    let mut foreign: Vec<&str> = Vec::new();
    for edge in edges {
        for endpoint in [edge.from.as_str(), edge.to.as_str()] {
            if endpoint != quest.head_post_id
                && !members.contains(endpoint)
                && !foreign.contains(&endpoint)
            {
                foreign.push(endpoint);
            }
        }
    }
    for post_id in foreign {
        violations.push(Violation::ForeignEndpoint {
            post_id: post_id.to_string(),
        });
    }

    let stuck = nodes_on_cycles(quest);
    if !stuck.is_empty() {
        violations.push(Violation::Cycle { nodes: stuck });
    }

    violations
}

/// Kahn's algorithm; whatever cannot be peeled off lies on or behind a cycle.
fn nodes_on_cycles(quest: &Quest) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut out: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &quest.task_graph {
        in_degree.entry(edge.from.as_str()).or_insert(0);
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
        out.entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();

    while let Some(node) = queue.pop_front() {
        if let Some(targets) = out.get(node) {
            for &target in targets {
                if let Some(d) = in_degree.get_mut(target) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }
        in_degree.remove(node);
    }

    let mut remaining: Vec<String> = in_degree.keys().map(|n| n.to_string()).collect();
    remaining.sort();
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApprovalStatus, Edge, PostType, QuestStatus, Visibility};

    fn quest(edges: &[(&str, &str)]) -> Quest {
        Quest {
            id: "q1".to_string(),
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

    fn posts(ids: &[&str]) -> Vec<Post> {
        ids.iter()
            .map(|id| Post {
                id: id.to_string(),
                quest_id: Some("q1".to_string()),
                post_type: PostType::Task,
                author_id: None,
                content: String::new(),
                reply_to: None,
                parent_id: None,
                node_id: None,
                tags: vec![],
                linked_items: vec![],
                visibility: Visibility::Public,
                archived_at: None,
                created_at: 0,
                updated_at: 0,
            })
            .collect()
    }

    #[test]
    fn clean_tree_has_no_violations() {
        let q = quest(&[("H", "A"), ("A", "B"), ("A", "C")]);
        assert!(check_quest(&q, &posts(&["H", "A", "B", "C"])).is_empty());
    }

    #[test]
    fn head_post_needs_no_membership() {
        let q = quest(&[("H", "A")]);
        assert!(check_quest(&q, &posts(&["A"])).is_empty());
    }

    #[test]
    fn reports_duplicates_and_second_parents() {
        let q = quest(&[("A", "B"), ("A", "B"), ("C", "B")]);
        let v = check_quest(&q, &posts(&["A", "B", "C"]));

        assert!(v.contains(&Violation::DuplicateEdge {
            from: "A".to_string(),
            to: "B".to_string()
        }));
        assert!(v.contains(&Violation::MultipleParents {
            node: "B".to_string(),
            parents: vec!["A".to_string(), "C".to_string()]
        }));
    }

    #[test]
    fn reports_foreign_endpoints() {
        let q = quest(&[("A", "X")]);
        let v = check_quest(&q, &posts(&["A"]));
        assert_eq!(
            v,
            vec![Violation::ForeignEndpoint {
                post_id: "X".to_string()
            }]
        );
    }

    #[test]
    fn reports_cycles() {
        let q = quest(&[("H", "A"), ("A", "B"), ("B", "A")]);
        let v = check_quest(&q, &posts(&["A", "B"]));
        assert!(v.contains(&Violation::Cycle {
            nodes: vec!["A".to_string(), "B".to_string()]
        }));
    }
}
