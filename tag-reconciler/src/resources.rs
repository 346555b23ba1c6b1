//! Collaborator interfaces for the resource manager.
//!
//! The reconciler only talks to these traits. [`crate::arm::ArmClient`]
//! implements all of them over the REST API; tests substitute fakes.

use crate::errors::ArmError;
use crate::tags::TagSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub const NETWORK_INTERFACE_TYPE: &str = "Microsoft.Network/networkInterfaces";

/// Resource metadata as returned by a generic resource read
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Resource {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub properties: JsonValue,
    #[serde(rename = "systemData", default)]
    pub system_data: Option<SystemData>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemData {
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Resource {
    pub fn is_network_interface(&self) -> bool {
        self.kind.eq_ignore_ascii_case(NETWORK_INTERFACE_TYPE)
    }

    /// Id of the virtual machine a network interface is attached to
    pub fn parent_virtual_machine(&self) -> Option<&str> {
        self.properties
            .pointer("/virtualMachine/id")
            .and_then(JsonValue::as_str)
    }

    /// Explicit creation timestamp in the resource properties
    pub fn time_created(&self) -> Option<&str> {
        self.properties
            .get("timeCreated")
            .and_then(JsonValue::as_str)
    }

    pub fn system_created_at(&self) -> Option<&str> {
        self.system_data.as_ref()?.created_at.as_deref()
    }

    pub fn system_created_by(&self) -> Option<&str> {
        self.system_data.as_ref()?.created_by.as_deref()
    }
}

/// One management-plane operation from the activity log
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    #[serde(default)]
    pub caller: Option<String>,
    #[serde(default)]
    pub event_timestamp: Option<String>,
}

impl ActivityLogEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.event_timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Caller of the earliest operation in `entries`.
///
/// Timestamped entries take precedence over entries without one. Among equals,
/// the entry listed last wins, since the activity log lists newest first.
pub fn earliest_caller(entries: Vec<ActivityLogEntry>) -> Option<String> {
    let mut earliest: Option<(Option<DateTime<Utc>>, String)> = None;
    for entry in entries {
        let at = entry.timestamp();
        let Some(caller) = entry.caller.filter(|caller| !caller.is_empty()) else {
            continue;
        };
        let replace = match (&earliest, at) {
            (None, _) | (Some((None, _)), _) => true,
            (Some((Some(best), _)), Some(at)) => at <= *best,
            (Some((Some(_), _)), None) => false,
        };
        if replace {
            earliest = Some((at, caller));
        }
    }
    earliest.map(|(_, caller)| caller)
}

#[async_trait]
pub trait ResourceTags: Send + Sync {
    async fn get_tags(&self, resource_uri: &str) -> Result<TagSet, ArmError>;

    /// Replaces the whole tag collection of the resource with `tags`.
    async fn replace_tags(&self, resource_uri: &str, tags: &TagSet) -> Result<(), ArmError>;
}

#[async_trait]
pub trait ResourceMetadata: Send + Sync {
    async fn get_resource(&self, resource_uri: &str, api_version: &str)
    -> Result<Resource, ArmError>;
}

#[async_trait]
pub trait Deployments: Send + Sync {
    /// Resource ids produced by a deployment, `None` if it exposes no output list.
    async fn get_output_resources(
        &self,
        deployment_uri: &str,
    ) -> Result<Option<Vec<String>>, ArmError>;
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn query(
        &self,
        resource_uri: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityLogEntry>, ArmError>;
}

/// Handles to every resource manager collaborator
#[derive(Clone)]
pub struct ResourceClients {
    pub tags: Arc<dyn ResourceTags>,
    pub resources: Arc<dyn ResourceMetadata>,
    pub deployments: Arc<dyn Deployments>,
    pub activity_log: Arc<dyn ActivityLog>,
}

impl ResourceClients {
    /// Uses one client for every collaborator
    pub fn from_single<C>(client: Arc<C>) -> Self
    where
        C: ResourceTags + ResourceMetadata + Deployments + ActivityLog + 'static,
    {
        ResourceClients {
            tags: client.clone(),
            resources: client.clone(),
            deployments: client.clone(),
            activity_log: client,
        }
    }
}
