//! Pure graph logic: addressing, task-tree surgery, link cascades, moderation,
//! and invariant checks. Nothing here touches storage.

pub mod address;
pub mod links;
pub mod moderation;
pub mod tree;
pub mod validate;

pub use address::compute_node_id;
pub use links::cascade_completion;
pub use tree::{reparent_on_archive, reparent_on_remove, Surgery};
pub use validate::{check_quest, Violation};
