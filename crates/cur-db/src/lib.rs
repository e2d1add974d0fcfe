//! cur-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and query modules for all
//! curatorr entities (sources, libraries, items, quality scores, and
//! completeness records).

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
