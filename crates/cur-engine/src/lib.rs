//! cur-engine: pure analysis functions for library curation.
//!
//! Two engines live here, both free of I/O so they can be tested
//! exhaustively in isolation:
//!
//! - [`quality`] -- classifies a media item's technical metadata into a
//!   resolution tier and a LOW/MEDIUM/HIGH quality rating with a list of
//!   human-readable deficiencies.
//! - [`completeness`] -- diffs the owned portion of a scope (series,
//!   collection, discography) against its canonical external catalog and
//!   reports what is missing.
//!
//! Callers fetch metadata and canonical listings themselves and pass them
//! in; nothing in this crate touches the network or the database.

pub mod completeness;
pub mod quality;

pub use completeness::{
    diff_catalog, diff_series, CatalogEntry, CompletenessRecord, SeasonGap, SeriesCompleteness,
};
pub use quality::{
    classify, AudioTrackInfo, MediaTechInfo, QualityScore, ResolutionTier, TierQuality,
};
