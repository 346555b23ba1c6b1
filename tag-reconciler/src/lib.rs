//! Propagates application metadata onto Azure resource tags.
//!
//! Resource change events are turned into [`event::EventAction`]s. Single
//! resource writes are reconciled directly; group deployments fan out over
//! their output resources.

pub mod arm;
pub mod config;
pub mod credential;
pub mod errors;
pub mod event;
pub mod handler;
pub mod metrics_defs;
pub mod reconcile;
pub mod resources;
pub mod tags;

#[cfg(test)]
mod testutils;

use arm::ArmClient;
use errors::CredentialError;
use handler::EventHandler;
use metadata_store::MetadataStore;
use reconcile::Reconciler;
use resources::ResourceClients;
use shared::notify::Notifier;
use std::sync::Arc;
use tags::TagKeys;

#[derive(thiserror::Error, Debug)]
pub enum TagReconcilerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] config::ValidationError),
    #[error("credential setup failed: {0}")]
    Credential(#[from] CredentialError),
}

/// Wires the resource manager client and the given collaborators into an event handler.
pub fn from_config(
    config: &config::Config,
    store: Arc<dyn MetadataStore>,
    notifier: Arc<dyn Notifier>,
) -> Result<EventHandler, TagReconcilerError> {
    config.validate()?;

    let credential = credential::from_config(&config.credentials, &config.arm_url)?;
    let arm = Arc::new(ArmClient::new(config.arm_url.clone(), credential));

    let reconciler = Reconciler::new(
        ResourceClients::from_single(arm),
        store,
        notifier,
        TagKeys::with_prefix(&config.tag_prefix),
    )
    .with_failure_notifications(config.notify_on_failure);

    Ok(EventHandler::new(reconciler))
}
