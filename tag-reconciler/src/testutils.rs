use crate::errors::ArmError;
use crate::reconcile::Reconciler;
use crate::resources::{
    ActivityLog, ActivityLogEntry, Deployments, Resource, ResourceClients, ResourceMetadata,
    ResourceTags,
};
use crate::tags::{TagKeys, TagSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::StatusCode;
use metadata_store::{AppMetadataRecord, MetadataStore, StoreError};
use serde_json::Value as JsonValue;
use shared::notify::NoopNotifier;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const STORAGE: &str =
    "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/sa1";
pub const NIC: &str =
    "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic1";
pub const VM: &str =
    "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1";
pub const DEPLOYMENT: &str =
    "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Resources/deployments/dep1";

fn not_found(uri: &str) -> ArmError {
    ArmError::Status {
        status: StatusCode::NOT_FOUND,
        body: format!("{uri} not found"),
    }
}

/// In-memory resource manager.
///
/// Resources without tags configured behave as if tagging were unsupported.
#[derive(Default)]
pub struct FakeArm {
    tags: Mutex<HashMap<String, TagSet>>,
    // (uri, api version); `None` matches every version
    resources: Mutex<HashMap<(String, Option<String>), JsonValue>>,
    deployments: Mutex<HashMap<String, Option<Vec<String>>>>,
    activity: Mutex<HashMap<String, Vec<ActivityLogEntry>>>,
    failing_writes: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    activity_log_fails: Mutex<bool>,
    writes: Mutex<Vec<(String, TagSet)>>,
    activity_windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    calls: AtomicUsize,
}

impl FakeArm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_tags(&self, uri: &str, tags: TagSet) {
        self.tags.lock().unwrap().insert(uri.to_string(), tags);
    }

    pub fn set_resource(&self, uri: &str, resource: JsonValue) {
        self.resources
            .lock()
            .unwrap()
            .insert((uri.to_string(), None), resource);
    }

    pub fn set_resource_for_version(&self, uri: &str, api_version: &str, resource: JsonValue) {
        self.resources
            .lock()
            .unwrap()
            .insert((uri.to_string(), Some(api_version.to_string())), resource);
    }

    pub fn set_deployment(&self, uri: &str, outputs: Option<&[&str]>) {
        self.deployments.lock().unwrap().insert(
            uri.to_string(),
            outputs.map(|ids| ids.iter().map(|id| id.to_string()).collect()),
        );
    }

    /// Activity log entries without timestamps, in response order
    pub fn set_activity_callers(&self, uri: &str, callers: &[&str]) {
        self.set_activity_log(
            uri,
            callers
                .iter()
                .map(|caller| ActivityLogEntry {
                    caller: Some(caller.to_string()),
                    event_timestamp: None,
                })
                .collect(),
        );
    }

    pub fn set_activity_log(&self, uri: &str, entries: Vec<ActivityLogEntry>) {
        self.activity.lock().unwrap().insert(uri.to_string(), entries);
    }

    pub fn fail_writes_for(&self, uri: &str) {
        self.failing_writes.lock().unwrap().insert(uri.to_string());
    }

    /// Any tag read of `uri` panics
    pub fn panic_for(&self, uri: &str) {
        self.panicking.lock().unwrap().insert(uri.to_string());
    }

    pub fn fail_activity_log(&self) {
        *self.activity_log_fails.lock().unwrap() = true;
    }

    pub fn writes(&self) -> Vec<(String, TagSet)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn activity_windows(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.activity_windows.lock().unwrap().clone()
    }

    /// Total number of calls across every collaborator trait
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceTags for FakeArm {
    async fn get_tags(&self, resource_uri: &str) -> Result<TagSet, ArmError> {
        self.record_call();
        let panics = self.panicking.lock().unwrap().contains(resource_uri);
        if panics {
            panic!("tag read exploded for {resource_uri}");
        }
        self.tags
            .lock()
            .unwrap()
            .get(resource_uri)
            .cloned()
            .ok_or_else(|| not_found(resource_uri))
    }

    async fn replace_tags(&self, resource_uri: &str, tags: &TagSet) -> Result<(), ArmError> {
        self.record_call();
        if self.failing_writes.lock().unwrap().contains(resource_uri) {
            return Err(ArmError::Status {
                status: StatusCode::FORBIDDEN,
                body: "AuthorizationFailed".into(),
            });
        }
        self.tags
            .lock()
            .unwrap()
            .insert(resource_uri.to_string(), tags.clone());
        self.writes
            .lock()
            .unwrap()
            .push((resource_uri.to_string(), tags.clone()));
        Ok(())
    }
}

#[async_trait]
impl ResourceMetadata for FakeArm {
    async fn get_resource(
        &self,
        resource_uri: &str,
        api_version: &str,
    ) -> Result<Resource, ArmError> {
        self.record_call();
        let resources = self.resources.lock().unwrap();
        let value = resources
            .get(&(resource_uri.to_string(), Some(api_version.to_string())))
            .or_else(|| resources.get(&(resource_uri.to_string(), None)))
            .cloned()
            .ok_or_else(|| not_found(resource_uri))?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl Deployments for FakeArm {
    async fn get_output_resources(
        &self,
        deployment_uri: &str,
    ) -> Result<Option<Vec<String>>, ArmError> {
        self.record_call();
        self.deployments
            .lock()
            .unwrap()
            .get(deployment_uri)
            .cloned()
            .ok_or_else(|| not_found(deployment_uri))
    }
}

#[async_trait]
impl ActivityLog for FakeArm {
    async fn query(
        &self,
        resource_uri: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityLogEntry>, ArmError> {
        self.record_call();
        self.activity_windows.lock().unwrap().push((start, end));
        if *self.activity_log_fails.lock().unwrap() {
            return Err(ArmError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "throttled".into(),
            });
        }
        Ok(self
            .activity
            .lock()
            .unwrap()
            .get(resource_uri)
            .cloned()
            .unwrap_or_default())
    }
}

/// Metadata store wrapper counting every call that reaches it.
pub struct CountingStore<S> {
    inner: S,
    calls: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        CountingStore {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: MetadataStore> MetadataStore for CountingStore<S> {
    async fn find_by_id(&self, id: &str) -> Result<Option<AppMetadataRecord>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_id(id).await
    }

    async fn upsert(&self, record: &AppMetadataRecord) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(record).await
    }
}

pub fn reconciler_with(arm: &Arc<FakeArm>, store: Arc<dyn MetadataStore>) -> Reconciler {
    Reconciler::new(
        ResourceClients::from_single(arm.clone()),
        store,
        Arc::new(NoopNotifier),
        TagKeys::with_prefix("bax-"),
    )
}
