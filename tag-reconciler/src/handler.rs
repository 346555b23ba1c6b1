use crate::errors::EventError;
use crate::event::{EventAction, parse_batch};
use crate::metrics_defs::{EVENTS_FILTERED, EVENTS_RECEIVED};
use crate::reconcile::Reconciler;
use http::StatusCode;
use http_body_util::combinators::BoxBody;
use hyper::Response;
use hyper::body::Bytes;
use serde::Serialize;
use shared::counter;
use shared::http::{make_boxed_error_response, make_json_response, make_text_response};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::task::JoinSet;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationResponse<'a> {
    validation_response: &'a str,
}

/// Result of handling one event batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Validated {
        code: String,
    },
    Filtered {
        resource_uri: String,
        operation: String,
    },
    Rejected(EventError),
    Updated {
        resource_uri: String,
    },
    Failed {
        resource_uri: String,
        reason: String,
    },
    /// Every output resource of a deployment was attempted. `failures` maps
    /// resource URI to error message.
    DeploymentCompleted {
        resource_uri: String,
        failures: BTreeMap<String, String>,
    },
}

impl EventOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            EventOutcome::Validated { .. }
            | EventOutcome::Updated { .. }
            | EventOutcome::DeploymentCompleted { .. } => StatusCode::OK,
            EventOutcome::Filtered { .. }
            | EventOutcome::Rejected(_)
            | EventOutcome::Failed { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Plain-text response body. The validation handshake is answered with JSON
    /// instead, see [`EventOutcome::into_response`].
    pub fn message(&self) -> String {
        match self {
            EventOutcome::Validated { code } => format!("Validation code: {code}"),
            EventOutcome::Filtered {
                resource_uri,
                operation,
            } => format!("Operation was filtered for Uri: {resource_uri} | {operation}"),
            EventOutcome::Rejected(e) => e.to_string(),
            EventOutcome::Updated { resource_uri } => {
                format!("Tag updates were successful for: {resource_uri}")
            }
            EventOutcome::Failed {
                resource_uri,
                reason,
            } => format!("Error updating tags for {resource_uri} : {reason}"),
            EventOutcome::DeploymentCompleted {
                resource_uri,
                failures,
            } if failures.is_empty() => {
                format!("All tag updates were successful for group deployment: {resource_uri}")
            }
            EventOutcome::DeploymentCompleted {
                resource_uri,
                failures,
            } => format!(
                "Some tag updates failed for group deployment: {resource_uri}: {}",
                serde_json::to_string(failures).unwrap_or_default()
            ),
        }
    }

    pub fn into_response<E>(self) -> Response<BoxBody<Bytes, E>> {
        if let EventOutcome::Validated { code } = &self {
            let body = ValidationResponse {
                validation_response: code,
            };
            return make_json_response(StatusCode::OK, &body).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Could not serialize validation response");
                make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
            });
        }
        make_text_response(self.status(), self.message())
    }
}

/// Entry point for resource change events.
#[derive(Clone)]
pub struct EventHandler {
    reconciler: Reconciler,
}

impl EventHandler {
    pub fn new(reconciler: Reconciler) -> Self {
        EventHandler { reconciler }
    }

    pub async fn handle(&self, body: &[u8]) -> EventOutcome {
        let action = match parse_batch(body).and_then(|envelope| envelope.data.action()) {
            Ok(action) => action,
            Err(e) => {
                counter!(EVENTS_RECEIVED, "action" => "rejected").increment(1);
                tracing::warn!(error = %e, "Rejecting event batch");
                return EventOutcome::Rejected(e);
            }
        };

        match action {
            EventAction::Validate { code } => {
                counter!(EVENTS_RECEIVED, "action" => "validate").increment(1);
                tracing::info!(code, "Answering subscription validation");
                EventOutcome::Validated { code }
            }
            EventAction::Filter {
                resource_uri,
                operation,
            } => {
                counter!(EVENTS_RECEIVED, "action" => "filter").increment(1);
                counter!(EVENTS_FILTERED).increment(1);
                tracing::info!(resource_uri, operation, "Operation was filtered");
                EventOutcome::Filtered {
                    resource_uri,
                    operation,
                }
            }
            EventAction::Resource { resource_uri } => {
                counter!(EVENTS_RECEIVED, "action" => "resource").increment(1);
                match self.reconciler.reconcile(&resource_uri).await {
                    Ok(_) => EventOutcome::Updated { resource_uri },
                    Err(e) => EventOutcome::Failed {
                        resource_uri,
                        reason: e.to_string(),
                    },
                }
            }
            EventAction::Deployment { resource_uri } => {
                counter!(EVENTS_RECEIVED, "action" => "deployment").increment(1);
                self.reconcile_deployment(resource_uri).await
            }
        }
    }

    async fn reconcile_deployment(&self, deployment_uri: String) -> EventOutcome {
        let outputs = match self
            .reconciler
            .clients()
            .deployments
            .get_output_resources(&deployment_uri)
            .await
        {
            Ok(outputs) => outputs.unwrap_or_default(),
            Err(e) => {
                tracing::error!(resource_uri = deployment_uri, error = %e, "Could not read deployment");
                return EventOutcome::Failed {
                    resource_uri: deployment_uri,
                    reason: e.to_string(),
                };
            }
        };

        let outputs: BTreeSet<String> = outputs.into_iter().collect();
        tracing::info!(
            resource_uri = deployment_uri,
            outputs = outputs.len(),
            "Reconciling deployment outputs"
        );

        let mut join_set = JoinSet::new();
        let mut pending = HashSet::new();

        for resource_uri in outputs {
            let reconciler = self.reconciler.clone();
            pending.insert(resource_uri.clone());
            join_set.spawn(async move {
                let result = reconciler.reconcile(&resource_uri).await;
                (resource_uri, result)
            });
        }

        let mut failures = BTreeMap::new();
        while let Some(join_result) = join_set.join_next().await {
            match join_result {
                Ok((resource_uri, result)) => {
                    pending.remove(&resource_uri);
                    if let Err(e) = result {
                        failures.insert(resource_uri, e.to_string());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Reconcile task panicked"),
            }
        }

        // Whatever is still pending belonged to a task that never returned
        for resource_uri in pending {
            failures.insert(resource_uri, "Tag update task failed".into());
        }

        EventOutcome::DeploymentCompleted {
            resource_uri: deployment_uri,
            failures,
        }
    }
}
