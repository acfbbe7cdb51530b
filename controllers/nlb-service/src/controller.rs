//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the AWS client, the caches and the reconciler together and runs
//! the Service watcher next to the metrics server.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::metrics::{self, Metrics};
use crate::reconciler::Reconciler;
use crate::watcher::{Context, Watcher};
use aws_client::AwsClient;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Name reported on Kubernetes Events.
pub const CONTROLLER_NAME: &str = "nlb-service-controller";

/// Main controller for Service load balancers.
pub struct Controller {
    service_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<std::io::Result<()>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing NLB Service Controller");
        let config = Arc::new(config);

        let kube_client = Client::try_default().await?;
        let metrics = Arc::new(Metrics::new()?);

        if config.vpc_id.is_empty() {
            warn!("AWS_VPC_ID is not set, target group creation will fail");
        }
        let aws = AwsClient::new(
            config.cluster_name.clone(),
            config.vpc_id.clone(),
            config.aws_call_timeout,
        )
        .await
        .with_observer(metrics.clone());

        let watcher = Watcher::new(kube_client.clone(), config.clone());
        let store = watcher.store();
        let events: Arc<dyn EventPublisher> = Arc::new(KubeEventPublisher::new(kube_client.clone(), CONTROLLER_NAME));
        let reconciler = Arc::new(Reconciler::new(Arc::new(aws), Arc::new(store.clone()), events.clone()));
        let ctx = Arc::new(Context::new(
            reconciler,
            kube_client,
            config.clone(),
            events,
            metrics.clone(),
        ));

        // reconciles requeue until every cache finished its first listing
        {
            let metrics = metrics.clone();
            tokio::spawn(async move {
                match store.wait_until_ready().await {
                    Ok(()) => metrics.mark_ready(),
                    Err(e) => error!(error = %e, "Caches never became ready"),
                }
            });
        }

        let metrics_server = tokio::spawn(metrics::serve(metrics, config.metrics_port));
        let service_watcher = tokio::spawn(async move { watcher.watch_services(ctx).await });

        Ok(Self {
            service_watcher,
            metrics_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("NLB Service Controller running");

        tokio::select! {
            result = &mut self.service_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Service watcher panicked: {e}")))??;
                info!("Service watcher exited, shutting down");
            }
            result = &mut self.metrics_server => {
                result
                    .map_err(|e| ControllerError::Watch(format!("Metrics server panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("Metrics server error: {e}")))?;
            }
        }

        self.metrics_server.abort();
        Ok(())
    }
}
