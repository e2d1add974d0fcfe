//! Query modules, one per entity.

pub mod completeness;
pub mod items;
pub mod libraries;
pub mod quality;
pub mod sources;
