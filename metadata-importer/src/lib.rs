//! Loads the AppId metadata dataset into the metadata store.
//!
//! A dataset arrives as CSV text, either uploaded directly or fetched from
//! blob storage, and every well-formed row is upserted by AppId.

pub mod blob;
pub mod config;
pub mod dataset;
pub mod import;
pub mod metrics_defs;

pub use import::{ImportError, ImportSummary, Importer};
