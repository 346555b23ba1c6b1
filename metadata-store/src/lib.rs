//! Storage for AppId metadata records.
//!
//! The tag reconciler reads records by AppId and the importer upserts them.
//! Both only see the [`MetadataStore`] trait; the concrete backend is picked
//! from configuration at startup.

pub mod config;
pub mod cosmos;
pub mod memory;
pub mod metrics_defs;
pub mod types;

use async_trait::async_trait;
use config::MetadataStoreConfig;
use std::sync::Arc;
pub use types::AppMetadataRecord;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status {
        status: http::StatusCode,
        body: String,
    },
    #[error("invalid master key: {0}")]
    InvalidKey(#[from] base64::DecodeError),
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),
    #[error("could not decode document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Returns the record whose id equals `id` exactly, if any.
    async fn find_by_id(&self, id: &str) -> Result<Option<AppMetadataRecord>, StoreError>;

    /// Inserts the record or replaces the existing one with the same id.
    async fn upsert(&self, record: &AppMetadataRecord) -> Result<(), StoreError>;
}

pub fn from_config(config: &MetadataStoreConfig) -> Result<Arc<dyn MetadataStore>, StoreError> {
    match config {
        MetadataStoreConfig::Cosmos(cosmos) => {
            Ok(Arc::new(cosmos::CosmosMetadataStore::new(cosmos)?))
        }
        MetadataStoreConfig::Memory => {
            tracing::warn!("Using the in-memory metadata store. Records are lost on restart.");
            Ok(Arc::new(memory::InMemoryMetadataStore::new()))
        }
    }
}
