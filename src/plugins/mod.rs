//! Project-facing components built on the core store: rules, the debug
//! diary with its scheduler and issue workflow, sessions, context assembly.
//! Flight configs are the one component shared across projects.

pub mod diary;
pub mod flight;
pub mod orient;
pub mod rules;
pub mod scheduler;
pub mod sessions;
pub mod tracker;
