//! Resource manager REST client.

use crate::credential::TokenProvider;
use crate::errors::ArmError;
use crate::resources::{
    ActivityLog, ActivityLogEntry, Deployments, Resource, ResourceMetadata, ResourceTags,
};
use crate::tags::TagSet;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

pub const TAGS_API_VERSION: &str = "2021-04-01";
pub const DEPLOYMENTS_API_VERSION: &str = "2021-04-01";
pub const ACTIVITY_LOG_API_VERSION: &str = "2015-04-01";

// Upper bound on activity log pages followed for a single query
const MAX_ACTIVITY_LOG_PAGES: usize = 10;

#[derive(Serialize, Deserialize, Default)]
struct TagsProperties {
    #[serde(default)]
    tags: Option<TagSet>,
}

#[derive(Serialize, Deserialize)]
struct TagsResource {
    #[serde(default)]
    properties: TagsProperties,
}

#[derive(Deserialize)]
struct OutputResource {
    id: String,
}

#[derive(Deserialize)]
struct DeploymentProperties {
    #[serde(rename = "outputResources", default)]
    output_resources: Option<Vec<OutputResource>>,
}

#[derive(Deserialize)]
struct Deployment {
    properties: Option<DeploymentProperties>,
}

#[derive(Deserialize)]
struct ActivityLogPage {
    #[serde(default)]
    value: Vec<ActivityLogEntry>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

pub struct ArmClient {
    client: reqwest::Client,
    base_url: Url,
    credential: Arc<dyn TokenProvider>,
}

impl ArmClient {
    pub fn new(base_url: Url, credential: Arc<dyn TokenProvider>) -> Self {
        ArmClient {
            client: reqwest::Client::new(),
            base_url,
            credential,
        }
    }

    /// Resolves a resource id (`/subscriptions/...`) plus optional suffix against the base URL.
    fn resource_url(
        &self,
        resource_uri: &str,
        suffix: &str,
        api_version: &str,
    ) -> Result<Url, ArmError> {
        let resource_uri = resource_uri.trim().trim_end_matches('/');
        if !resource_uri.starts_with('/') {
            return Err(ArmError::InvalidResourceUri(resource_uri.to_string()));
        }

        let mut url = self
            .base_url
            .join(&format!("{resource_uri}{suffix}"))
            .map_err(|e| ArmError::InvalidResourceUri(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("api-version", api_version);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ArmError> {
        let token = self.credential.token().await?;
        let response = self.client.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArmError::Status { status, body });
        }

        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }
}

/// Extracts the subscription id from a resource id.
pub fn subscription_id(resource_uri: &str) -> Option<&str> {
    let mut segments = resource_uri.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("subscriptions") {
            return segments.next();
        }
    }
    None
}

/// Formats a timestamp the way the activity log filter expects (millisecond precision, `Z`).
pub fn format_filter_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl ResourceTags for ArmClient {
    async fn get_tags(&self, resource_uri: &str) -> Result<TagSet, ArmError> {
        let url = self.resource_url(
            resource_uri,
            "/providers/Microsoft.Resources/tags/default",
            TAGS_API_VERSION,
        )?;
        let resource: TagsResource = self.get_json(url).await?;
        Ok(resource.properties.tags.unwrap_or_default())
    }

    async fn replace_tags(&self, resource_uri: &str, tags: &TagSet) -> Result<(), ArmError> {
        let url = self.resource_url(
            resource_uri,
            "/providers/Microsoft.Resources/tags/default",
            TAGS_API_VERSION,
        )?;
        let body = TagsResource {
            properties: TagsProperties {
                tags: Some(tags.clone()),
            },
        };

        let token = self.credential.token().await?;
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArmError::Status { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceMetadata for ArmClient {
    async fn get_resource(
        &self,
        resource_uri: &str,
        api_version: &str,
    ) -> Result<Resource, ArmError> {
        let url = self.resource_url(resource_uri, "", api_version)?;
        self.get_json(url).await
    }
}

#[async_trait]
impl Deployments for ArmClient {
    async fn get_output_resources(
        &self,
        deployment_uri: &str,
    ) -> Result<Option<Vec<String>>, ArmError> {
        let url = self.resource_url(deployment_uri, "", DEPLOYMENTS_API_VERSION)?;
        let deployment: Deployment = self.get_json(url).await?;

        Ok(deployment
            .properties
            .and_then(|p| p.output_resources)
            .map(|outputs| outputs.into_iter().map(|o| o.id).collect()))
    }
}

#[async_trait]
impl ActivityLog for ArmClient {
    async fn query(
        &self,
        resource_uri: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityLogEntry>, ArmError> {
        let subscription = subscription_id(resource_uri)
            .ok_or_else(|| ArmError::InvalidResourceUri(resource_uri.to_string()))?;

        let filter = format!(
            "eventTimestamp ge '{}' and eventTimestamp le '{}' and resourceUri eq '{}'",
            format_filter_timestamp(start),
            format_filter_timestamp(end),
            resource_uri
        );

        let mut url = self
            .base_url
            .join(&format!(
                "/subscriptions/{subscription}/providers/Microsoft.Insights/eventtypes/management/values"
            ))
            .map_err(|e| ArmError::InvalidResourceUri(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("api-version", ACTIVITY_LOG_API_VERSION)
            .append_pair("$filter", &filter);

        let mut entries = Vec::new();
        let mut pages = 0;
        loop {
            let page: ActivityLogPage = self.get_json(url).await?;
            entries.extend(page.value);
            pages += 1;

            let Some(next) = page.next_link else {
                break;
            };
            if pages == MAX_ACTIVITY_LOG_PAGES {
                tracing::warn!(
                    resource_uri,
                    pages,
                    entries = entries.len(),
                    "Activity log truncated, later pages were not read"
                );
                break;
            }
            url = Url::parse(&next).map_err(|e| ArmError::InvalidResourceUri(e.to_string()))?;
        }

        Ok(entries)
    }
}
