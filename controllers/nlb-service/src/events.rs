//! Kubernetes Events on Services.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails
//! the reconcile that produced it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Client, Resource};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

pub const REASON_CREATE: &str = "CREATE";
pub const REASON_MODIFY: &str = "MODIFY";
pub const REASON_DELETE: &str = "DELETE";
pub const REASON_ERROR: &str = "ERROR";
pub const REASON_SYNCED: &str = "SYNCED";

/// Publishes Events about a Service.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, service: &Service, type_: EventType, reason: &str, note: String);
}

/// [`EventPublisher`] backed by `kube_runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    /// `controller_name` shows up as the reporting component.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, service: &Service, type_: EventType, reason: &str, note: String) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &service.object_ref(&())).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}
