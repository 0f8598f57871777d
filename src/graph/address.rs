//! Hierarchical node addresses for quest posts.
//!
//! An address is a colon-separated path such as `Q:my_quest:T00:L01`. It starts
//! with the quest slug and appends one `<segment><counter>` pair per level.
//! Tasks are always flat children of the quest; logs, commits and issues nest
//! under the address of their parent post.

use crate::types::{Post, PostType, Quest};
use regex_lite::Regex;
use std::sync::LazyLock;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("valid slug pattern"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Lower-case, drop everything outside `[a-z0-9\s]`, trim, and join words with `_`.
///
/// Any Unicode whitespace counts as a word break.
pub fn slug(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    WHITESPACE_RUN
        .replace_all(stripped.trim(), "_")
        .into_owned()
}

/// Root of every address in a quest: `Q:<slug>`.
pub fn quest_base(quest: &Quest) -> String {
    format!("Q:{}", slug(&quest.title))
}

/// Counters are left-padded to at least two digits.
pub fn zero_pad(n: usize) -> String {
    format!("{:02}", n)
}

/// Address without its counter, e.g. `Q:my_quest:T` or `Q:my_quest:T00:L`.
///
/// Returns `None` for post types that carry no segment.
pub fn address_prefix(quest: &Quest, post_type: PostType, parent: Option<&Post>) -> Option<String> {
    let segment = post_type.segment()?;
    let base = quest_base(quest);

    if segment == 'T' {
        return Some(format!("{}:T", base));
    }

    let base_path = parent
        .and_then(|p| p.node_id.as_deref())
        .map(str::to_string)
        .unwrap_or(base);
    Some(format!("{}:{}", base_path, segment))
}

/// Count existing siblings that already occupy a slot under `prefix`.
///
/// Tasks count every addressed task in the quest; nested segments count
/// addressed posts of the same segment whose address starts with `prefix`.
pub fn count_siblings(quest: &Quest, siblings: &[Post], post_type: PostType, prefix: &str) -> usize {
    let Some(segment) = post_type.segment() else {
        return 0;
    };

    siblings
        .iter()
        .filter(|p| p.quest_id.as_deref() == Some(quest.id.as_str()))
        .filter(|p| p.post_type.segment() == Some(segment))
        .filter(|p| match p.node_id.as_deref() {
            Some(node_id) => segment == 'T' || node_id.starts_with(prefix),
            None => false,
        })
        .count()
}

/// Compute the address of a new post from a snapshot of its siblings.
///
/// Returns `None` when the type is not addressable.
pub fn compute_node_id(
    quest: &Quest,
    siblings: &[Post],
    post_type: PostType,
    parent: Option<&Post>,
) -> Option<String> {
    let prefix = address_prefix(quest, post_type, parent)?;
    let count = count_siblings(quest, siblings, post_type, &prefix);
    Some(format!("{}{}", prefix, zero_pad(count)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApprovalStatus, QuestStatus, Visibility};

    fn quest(title: &str) -> Quest {
        Quest {
            id: "q1".to_string(),
            title: title.to_string(),
            author_id: None,
            head_post_id: "head".to_string(),
            task_graph: vec![],
            linked_posts: vec![],
            status: QuestStatus::Active,
            approval_status: ApprovalStatus::Approved,
            flag_count: 0,
            completed_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn post(id: &str, post_type: PostType, node_id: Option<&str>) -> Post {
        Post {
            id: id.to_string(),
            quest_id: Some("q1".to_string()),
            post_type,
            author_id: None,
            content: String::new(),
            reply_to: None,
            parent_id: None,
            node_id: node_id.map(str::to_string),
            tags: vec![],
            linked_items: vec![],
            visibility: Visibility::Public,
            archived_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn slug_normalizes_title() {
        assert_eq!(slug("My Quest"), "my_quest");
        assert_eq!(slug("  Hello,   World!  "), "hello_world");
        assert_eq!(slug("Ship v2.0 -- now"), "ship_v20_now");
        assert_eq!(slug("!!!"), "");
    }

    #[test]
    fn slug_splits_on_unicode_whitespace() {
        assert_eq!(slug("a\u{a0}b"), "a_b");
        assert_eq!(slug("Deep\u{2003}\u{3000}Space"), "deep_space");
    }

    #[test]
    fn zero_pad_keeps_two_digits_minimum() {
        assert_eq!(zero_pad(0), "00");
        assert_eq!(zero_pad(7), "07");
        assert_eq!(zero_pad(42), "42");
        assert_eq!(zero_pad(123), "123");
    }

    #[test]
    fn tasks_number_sequentially() {
        let q = quest("My Quest");
        let mut siblings = Vec::new();

        let first = compute_node_id(&q, &siblings, PostType::Task, None).unwrap();
        assert_eq!(first, "Q:my_quest:T00");
        siblings.push(post("a", PostType::Task, Some(&first)));

        let second = compute_node_id(&q, &siblings, PostType::Task, None).unwrap();
        assert_eq!(second, "Q:my_quest:T01");
    }

    #[test]
    fn tasks_ignore_parent() {
        let q = quest("My Quest");
        let parent = post("a", PostType::Task, Some("Q:my_quest:T00"));
        let siblings = vec![parent.clone()];

        let id = compute_node_id(&q, &siblings, PostType::Task, Some(&parent)).unwrap();
        assert_eq!(id, "Q:my_quest:T01");
    }

    #[test]
    fn logs_nest_under_parent() {
        let q = quest("My Quest");
        let parent = post("a", PostType::Task, Some("Q:my_quest:T00"));
        let mut siblings = vec![parent.clone()];

        let first = compute_node_id(&q, &siblings, PostType::Log, Some(&parent)).unwrap();
        assert_eq!(first, "Q:my_quest:T00:L00");
        siblings.push(post("l1", PostType::Log, Some(&first)));

        let second = compute_node_id(&q, &siblings, PostType::Log, Some(&parent)).unwrap();
        assert_eq!(second, "Q:my_quest:T00:L01");
    }

    #[test]
    fn segments_count_independently() {
        let q = quest("My Quest");
        let parent = post("a", PostType::Task, Some("Q:my_quest:T00"));
        let siblings = vec![
            parent.clone(),
            post("l1", PostType::Log, Some("Q:my_quest:T00:L00")),
        ];

        let commit = compute_node_id(&q, &siblings, PostType::Commit, Some(&parent)).unwrap();
        assert_eq!(commit, "Q:my_quest:T00:C00");
        let issue = compute_node_id(&q, &siblings, PostType::Issue, None).unwrap();
        assert_eq!(issue, "Q:my_quest:I00");
    }

    #[test]
    fn unaddressable_types_get_nothing() {
        let q = quest("My Quest");
        assert!(compute_node_id(&q, &[], PostType::Free, None).is_none());
        assert!(compute_node_id(&q, &[], PostType::MetaSystem, None).is_none());
    }

    #[test]
    fn other_quests_are_not_counted() {
        let q = quest("My Quest");
        let mut foreign = post("x", PostType::Task, Some("Q:my_quest:T00"));
        foreign.quest_id = Some("q2".to_string());

        let id = compute_node_id(&q, &[foreign], PostType::Task, None).unwrap();
        assert_eq!(id, "Q:my_quest:T00");
    }

    #[test]
    fn unaddressed_siblings_are_not_counted() {
        let q = quest("My Quest");
        let siblings = vec![post("a", PostType::Task, None)];
        let id = compute_node_id(&q, &siblings, PostType::Task, None).unwrap();
        assert_eq!(id, "Q:my_quest:T00");
    }
}
