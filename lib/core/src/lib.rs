//! Core domain types and utilities for loomwork.
//!
//! This crate provides the typed ids, id generation and the error-handling
//! foundation shared by the engine, its adapters and the server.

pub mod error;
pub mod id;
pub mod snowflake;

pub use error::Result;
pub use id::{
    FileId, KnowledgeBaseId, ModelId, NodeInstanceId, ParseIdError, TemplateId, UserId,
    WorkflowInstanceId,
};
pub use snowflake::{IdGenerator, SnowflakeGenerator};
