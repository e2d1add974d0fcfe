//! Route handler modules.

pub mod config;
pub mod events;
pub mod health;
pub mod items;
pub mod libraries;
pub mod scheduler;
pub mod sources;
