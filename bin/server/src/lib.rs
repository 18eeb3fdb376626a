//! loomwork HTTP server.
//!
//! This crate wires the workflow engine to Postgres, the configured model
//! and search providers, and exposes it over a JSON API.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
