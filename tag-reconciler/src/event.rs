//! Event Grid envelope types for resource change notifications.
//!
//! The dispatcher posts a JSON array of envelopes. Only the first envelope of
//! a batch is processed.
//!
//! # Example
//! ```json
//! [{
//!   "id": "6b1b…",
//!   "eventType": "Microsoft.Resources.ResourceWriteSuccess",
//!   "subject": "/subscriptions/…/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/sa",
//!   "data": {
//!     "resourceUri": "/subscriptions/…/storageAccounts/sa",
//!     "operationName": "Microsoft.Storage/storageAccounts/write"
//!   }
//! }]
//! ```
//!
//! A subscription handshake carries `{"validationCode": "…"}` in `data`
//! instead.

use crate::errors::EventError;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

const TAG_WRITE_OPERATION: &str = "tags/write";
const DEPLOYMENT_WRITE_OPERATION: &str = "deployments/write";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub data: EventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub validation_code: Option<String>,
    pub resource_uri: Option<String>,
    pub operation_name: Option<String>,

    /// Remaining payload fields (`status`, `authorization`, `claims`, ...), kept for logging.
    #[serde(flatten)]
    pub extra_fields: HashMap<String, JsonValue>,
}

/// What the reconciler should do with one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Subscription handshake; echo the code back
    Validate { code: String },
    /// Our own tag write coming back around; drop it
    Filter {
        resource_uri: String,
        operation: String,
    },
    /// Group deployment; reconcile every output resource
    Deployment { resource_uri: String },
    /// Single resource write
    Resource { resource_uri: String },
}

/// Parses a request body and returns the first envelope of the batch.
pub fn parse_batch(body: &[u8]) -> Result<EventEnvelope, EventError> {
    let batch: Vec<EventEnvelope> =
        serde_json::from_slice(body).map_err(|e| EventError::InvalidPayload(e.to_string()))?;

    let mut batch = batch.into_iter();
    let first = batch.next().ok_or(EventError::EmptyBatch)?;

    let ignored = batch.count();
    if ignored > 0 {
        tracing::debug!(ignored, "Ignoring trailing events in batch");
    }
    Ok(first)
}

impl EventData {
    pub fn action(&self) -> Result<EventAction, EventError> {
        if let Some(code) = &self.validation_code {
            return Ok(EventAction::Validate { code: code.clone() });
        }

        let operation = self
            .operation_name
            .as_deref()
            .ok_or(EventError::MissingOperationName)?;
        let operation_lower = operation.to_ascii_lowercase();

        if operation_lower.contains(TAG_WRITE_OPERATION) {
            return Ok(EventAction::Filter {
                resource_uri: self.resource_uri.clone().unwrap_or_default(),
                operation: operation.to_string(),
            });
        }

        let resource_uri = self
            .resource_uri
            .clone()
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(EventError::MissingResourceUri)?;

        if operation_lower.contains(DEPLOYMENT_WRITE_OPERATION) {
            Ok(EventAction::Deployment { resource_uri })
        } else {
            Ok(EventAction::Resource { resource_uri })
        }
    }
}
