//! Database repositories for loomwork.
//!
//! This module provides Postgres implementations of:
//! - The instance store (workflow instances and the node execution log)
//! - The template source

pub mod instance;
pub mod template;

pub use instance::PgInstanceStore;
pub use template::PgTemplateSource;
