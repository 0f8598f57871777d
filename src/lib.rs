//! Quest Graph Library
//!
//! Hierarchical node addressing, task-tree surgery and cascading completion
//! for quests and their posts. This module exports the core components for
//! testing and integration.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod notify;
pub mod resources;
pub mod tools;
pub mod types;
