//! Cascading completion over the link graph.
//!
//! Links are not constrained to a DAG. The walk keeps a visited set across the
//! whole cascade so link cycles between quests terminate.

use crate::notify::EntityRef;
use crate::types::{CascadeReport, ItemType, Link};
use std::collections::{HashSet, VecDeque};

/// Plan the completion of `root` and everything it cascades to.
///
/// `links_of` returns the outgoing links of a quest, or `None` if the quest no
/// longer exists; missing quests are skipped without aborting the walk.
pub fn cascade_completion<F>(root: &str, mut links_of: F) -> CascadeReport
where
    F: FnMut(&str) -> Option<Vec<Link>>,
{
    let mut report = CascadeReport::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(root.to_string());

    while let Some(quest_id) = queue.pop_front() {
        if !visited.insert(quest_id.clone()) {
            continue;
        }

        let Some(links) = links_of(&quest_id) else {
            continue;
        };
        report.completed_quests.push(quest_id);

        for link in links {
            match link.item_type {
                ItemType::Post => {
                    if link.cascade_solution {
                        if !report.solved_posts.contains(&link.item_id) {
                            report.solved_posts.push(link.item_id);
                        }
                    } else if link.notify_on_change {
                        push_unique(&mut report.notifications, EntityRef::post(link.item_id));
                    }
                }
                ItemType::Quest => {
                    if link.cascade_solution {
                        if !visited.contains(&link.item_id) {
                            queue.push_back(link.item_id);
                        }
                    } else if link.notify_on_change {
                        push_unique(&mut report.notifications, EntityRef::quest(link.item_id));
                    }
                }
            }
        }
    }

    report
}

fn push_unique(list: &mut Vec<EntityRef>, entity: EntityRef) {
    if !list.contains(&entity) {
        list.push(entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn graph(entries: &[(&str, Vec<Link>)]) -> HashMap<String, Vec<Link>> {
        entries
            .iter()
            .map(|(id, links)| (id.to_string(), links.clone()))
            .collect()
    }

    #[test]
    fn two_quest_cycle_terminates() {
        let g = graph(&[
            ("q1", vec![Link::new("q2", ItemType::Quest).cascading()]),
            ("q2", vec![Link::new("q1", ItemType::Quest).cascading()]),
        ]);

        let mut lookups = 0;
        let report = cascade_completion("q1", |id| {
            lookups += 1;
            g.get(id).cloned()
        });

        assert_eq!(report.completed_quests, vec!["q1", "q2"]);
        assert_eq!(lookups, 2);
    }

    #[test]
    fn self_link_terminates() {
        let g = graph(&[("q1", vec![Link::new("q1", ItemType::Quest).cascading()])]);
        let report = cascade_completion("q1", |id| g.get(id).cloned());
        assert_eq!(report.completed_quests, vec!["q1"]);
    }

    #[test]
    fn posts_are_solved_or_notified() {
        let g = graph(&[(
            "q1",
            vec![
                Link::new("p1", ItemType::Post).cascading(),
                Link::new("p2", ItemType::Post).notifying(),
                Link::new("p3", ItemType::Post).cascading().notifying(),
                Link::new("p4", ItemType::Post),
            ],
        )]);

        let report = cascade_completion("q1", |id| g.get(id).cloned());

        assert_eq!(report.solved_posts, vec!["p1", "p3"]);
        assert_eq!(report.notifications, vec![EntityRef::post("p2")]);
    }

    #[test]
    fn notify_only_quest_is_not_completed() {
        let g = graph(&[
            ("q1", vec![Link::new("q2", ItemType::Quest).notifying()]),
            ("q2", vec![Link::new("p9", ItemType::Post).cascading()]),
        ]);

        let report = cascade_completion("q1", |id| g.get(id).cloned());

        assert_eq!(report.completed_quests, vec!["q1"]);
        assert!(report.solved_posts.is_empty());
        assert_eq!(report.notifications, vec![EntityRef::quest("q2")]);
    }

    #[test]
    fn missing_quests_are_skipped() {
        let g = graph(&[(
            "q1",
            vec![
                Link::new("gone", ItemType::Quest).cascading(),
                Link::new("q3", ItemType::Quest).cascading(),
            ],
        ), ("q3", vec![])]);

        let report = cascade_completion("q1", |id| g.get(id).cloned());
        assert_eq!(report.completed_quests, vec!["q1", "q3"]);
    }

    #[test]
    fn diamond_visits_each_quest_once() {
        let g = graph(&[
            (
                "a",
                vec![
                    Link::new("b", ItemType::Quest).cascading(),
                    Link::new("c", ItemType::Quest).cascading(),
                ],
            ),
            ("b", vec![Link::new("d", ItemType::Quest).cascading()]),
            ("c", vec![Link::new("d", ItemType::Quest).cascading()]),
            ("d", vec![Link::new("shared", ItemType::Post).cascading()]),
        ]);

        let report = cascade_completion("a", |id| g.get(id).cloned());
        assert_eq!(report.completed_quests, vec!["a", "b", "c", "d"]);
        assert_eq!(report.solved_posts, vec!["shared"]);
    }
}
