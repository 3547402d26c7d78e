//! Core value types: actions, artifacts, task nodes, and the validated graph.

pub mod action;
pub mod artifact;
pub mod graph;
pub mod node;
pub mod retry;
pub mod types;
