//! Core of STARLOG: storage, reference resolution and template rendering.
//!
//! Everything stateful goes through one explicitly constructed
//! [`store::DocumentStore`]; the resolver and renderer hold no state of their own.

pub mod assets;
pub mod broker;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod expr;
pub mod models;
pub mod pool;
pub mod project;
pub mod resolver;
pub mod schemas;
pub mod store;
pub mod template;
pub mod time;
