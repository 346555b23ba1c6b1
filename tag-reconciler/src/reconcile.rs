//! Single-resource tag reconciliation.
//!
//! For one resource: read its tags, resolve creation time and creator on a
//! best-effort basis, find the AppId tag, look up the AppId metadata, merge
//! the managed tags into the existing set and write the full set back.

use crate::errors::{ArmError, ReconcileError};
use crate::metrics_defs::{RECONCILE_DURATION, RECONCILE_FAILURE, RECONCILE_SUCCESS};
use crate::resources::{Resource, ResourceClients, earliest_caller};
use crate::tags::{ManagedTags, TagKeys, TagSet, UNKNOWN};
use chrono::{Duration, Utc};
use metadata_store::MetadataStore;
use shared::notify::Notifier;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

/// API version tried first when reading resource metadata
pub const PRIMARY_API_VERSION: &str = "2021-11-01";
/// Fallback for resource providers that reject the primary version
pub const FALLBACK_API_VERSION: &str = "2021-04-01";

const NOTIFY_SUBJECT: &str = "Unsuccessful Tag Update Operation";

/// Half-width of the activity log window around "now"
fn attribution_window() -> Duration {
    Duration::hours(1)
}

#[derive(Clone)]
pub struct Reconciler {
    clients: ResourceClients,
    store: Arc<dyn MetadataStore>,
    notifier: Arc<dyn Notifier>,
    keys: TagKeys,
    notify_on_failure: bool,
}

impl Reconciler {
    pub fn new(
        clients: ResourceClients,
        store: Arc<dyn MetadataStore>,
        notifier: Arc<dyn Notifier>,
        keys: TagKeys,
    ) -> Self {
        Reconciler {
            clients,
            store,
            notifier,
            keys,
            notify_on_failure: false,
        }
    }

    pub fn with_failure_notifications(mut self, enabled: bool) -> Self {
        self.notify_on_failure = enabled;
        self
    }

    pub fn clients(&self) -> &ResourceClients {
        &self.clients
    }

    /// Reconciles one resource and returns the tag set that was written.
    pub async fn reconcile(&self, resource_uri: &str) -> Result<TagSet, ReconcileError> {
        let started = Instant::now();
        let result = self.reconcile_inner(resource_uri).await;
        histogram!(RECONCILE_DURATION).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => {
                counter!(RECONCILE_SUCCESS).increment(1);
                tracing::info!(resource_uri, "Tag updates were successful");
            }
            Err(e) => {
                counter!(RECONCILE_FAILURE, "reason" => e.kind()).increment(1);
                tracing::error!(resource_uri, error = %e, "Error updating tags");
                if self.notify_on_failure {
                    self.notify_failure(resource_uri).await;
                }
            }
        }

        result
    }

    async fn reconcile_inner(&self, resource_uri: &str) -> Result<TagSet, ReconcileError> {
        let mut tags = self
            .clients
            .tags
            .get_tags(resource_uri)
            .await
            .map_err(|e| ReconcileError::UnsupportedResourceKind(e.to_string()))?;

        let resource = self.creation_resource(resource_uri).await;
        let ctime = creation_time(resource.as_ref());
        let creator = self
            .resolve_creator(resource_uri, &tags, resource.as_ref())
            .await;

        let app_id = tags
            .app_id()
            .ok_or(ReconcileError::MissingAppIdTag)?
            .to_string();

        let record = match self.store.find_by_id(&app_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(ReconcileError::MetadataLookupFailed {
                    app_id,
                    reason: "no record found".into(),
                });
            }
            Err(e) => {
                return Err(ReconcileError::MetadataLookupFailed {
                    app_id,
                    reason: e.to_string(),
                });
            }
        };

        tags.merge(
            &self.keys,
            ManagedTags {
                app_name: record.app_name,
                app_id,
                owner: record.owner,
                ctime,
                creator,
            },
        );

        self.clients
            .tags
            .replace_tags(resource_uri, &tags)
            .await
            .map_err(|e| ReconcileError::TagWriteFailed(e.to_string()))?;

        Ok(tags)
    }

    /// Reads the metadata used for creation attribution.
    ///
    /// Network interfaces are redirected to their virtual machine. Returns
    /// `None` if nothing could be read.
    async fn creation_resource(&self, resource_uri: &str) -> Option<Resource> {
        let resource = match self.read_resource(resource_uri).await {
            Ok(resource) => resource,
            Err(e) => {
                tracing::info!(resource_uri, error = %e, "Could not read resource metadata");
                return None;
            }
        };

        if !resource.is_network_interface() {
            return Some(resource);
        }

        let Some(parent) = resource.parent_virtual_machine() else {
            tracing::debug!(resource_uri, "Network interface is not attached to a VM");
            return Some(resource);
        };

        match self
            .clients
            .resources
            .get_resource(parent, PRIMARY_API_VERSION)
            .await
        {
            Ok(vm) => Some(vm),
            Err(e) => {
                tracing::info!(resource_uri, parent, error = %e, "Could not read parent VM metadata");
                None
            }
        }
    }

    async fn read_resource(&self, resource_uri: &str) -> Result<Resource, ArmError> {
        match self
            .clients
            .resources
            .get_resource(resource_uri, PRIMARY_API_VERSION)
            .await
        {
            Ok(resource) => Ok(resource),
            Err(e) => {
                tracing::debug!(resource_uri, error = %e, "Retrying resource read with fallback API version");
                self.clients
                    .resources
                    .get_resource(resource_uri, FALLBACK_API_VERSION)
                    .await
            }
        }
    }

    /// Keeps an existing creator tag, otherwise attributes the resource to the
    /// caller of its recent write operations.
    async fn resolve_creator(
        &self,
        resource_uri: &str,
        tags: &TagSet,
        resource: Option<&Resource>,
    ) -> String {
        if let Some(existing) = tags.get(&self.keys.creator)
            && existing != UNKNOWN
        {
            return existing.to_string();
        }

        let now = Utc::now();
        let window = attribution_window();
        match self
            .clients
            .activity_log
            .query(resource_uri, now - window, now + window)
            .await
        {
            Ok(entries) => {
                if let Some(caller) = earliest_caller(entries) {
                    return caller;
                }
            }
            Err(e) => {
                tracing::info!(resource_uri, error = %e, "Activity log lookup failed");
            }
        }

        resource
            .and_then(Resource::system_created_by)
            .unwrap_or(UNKNOWN)
            .to_string()
    }

    async fn notify_failure(&self, resource_uri: &str) {
        let message = format!("Tag update was unsuccessful for ResourceId: {resource_uri}");
        if let Err(e) = self.notifier.notify(NOTIFY_SUBJECT, &message).await {
            tracing::warn!(resource_uri, error = %e, "Could not send failure notification");
        }
    }
}

/// `timeCreated` property, then `systemData.createdAt`, then the unknown sentinel.
pub fn creation_time(resource: Option<&Resource>) -> String {
    resource
        .and_then(|r| r.time_created().or_else(|| r.system_created_at()))
        .unwrap_or(UNKNOWN)
        .to_string()
}
