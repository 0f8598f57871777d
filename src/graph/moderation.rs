//! Flag counting and the one-way `approved -> flagged` transition.

use crate::types::{ApprovalStatus, Quest};

/// Default number of flags that sends an approved quest to review.
pub const DEFAULT_FLAG_THRESHOLD: i32 = 3;

/// Record one flag on `quest`. Returns `true` if this flag moved it to `flagged`.
///
/// Only an approved quest transitions; once flagged, further flags just count.
pub fn apply_flag(quest: &mut Quest, threshold: i32) -> bool {
    quest.flag_count += 1;

    if quest.approval_status == ApprovalStatus::Approved && quest.flag_count >= threshold {
        quest.approval_status = ApprovalStatus::Flagged;
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QuestStatus;

    fn quest(approval_status: ApprovalStatus) -> Quest {
        Quest {
            id: "q1".to_string(),
            title: "Q".to_string(),
            author_id: None,
            head_post_id: "h".to_string(),
            task_graph: vec![],
            linked_posts: vec![],
            status: QuestStatus::Active,
            approval_status,
            flag_count: 0,
            completed_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn third_flag_transitions_once() {
        let mut q = quest(ApprovalStatus::Approved);

        assert!(!apply_flag(&mut q, DEFAULT_FLAG_THRESHOLD));
        assert!(!apply_flag(&mut q, DEFAULT_FLAG_THRESHOLD));
        assert!(apply_flag(&mut q, DEFAULT_FLAG_THRESHOLD));
        assert_eq!(q.approval_status, ApprovalStatus::Flagged);

        assert!(!apply_flag(&mut q, DEFAULT_FLAG_THRESHOLD));
        assert_eq!(q.flag_count, 4);
        assert_eq!(q.approval_status, ApprovalStatus::Flagged);
    }

    #[test]
    fn pending_quests_only_count() {
        let mut q = quest(ApprovalStatus::Pending);
        for _ in 0..5 {
            assert!(!apply_flag(&mut q, DEFAULT_FLAG_THRESHOLD));
        }
        assert_eq!(q.approval_status, ApprovalStatus::Pending);
        assert_eq!(q.flag_count, 5);
    }
}
