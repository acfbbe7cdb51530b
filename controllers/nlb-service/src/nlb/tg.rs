//! One backend's target group: configuration, tags, attributes, targets.

use super::attributes::AttributesController;
use super::tags::TagsController;
use super::targets::TargetsController;
use super::{Backend, SharedAws, SharedStore, ServiceListener, service_ns_name, service_ports};
use crate::error::{ControllerError, StageExt};
use crate::generator::{NameGenerator, NameTagGenerator, TagGenerator};
use aws_client::{
    CreateTargetGroupRequest, HealthCheck, ModifyTargetGroupRequest, Protocol, Tags, Target, TargetGroup, TargetType,
};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use service_annotations::{ServiceAnnotations, TRAFFIC_PORT};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Targets are always registered with an explicit port, so the port a
/// target group is created with is only a placeholder.
const TARGET_GROUP_DEFAULT_PORT: i32 = 1;

/// Converged state of one backend's target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroupInfo {
    pub arn: String,
    pub target_type: TargetType,
    pub targets: BTreeSet<Target>,
}

pub struct TargetGroupController {
    aws: SharedAws,
    generator: Arc<NameTagGenerator>,
    tags: TagsController,
    attributes: AttributesController,
    targets: TargetsController,
}

impl TargetGroupController {
    pub fn new(aws: SharedAws, store: SharedStore, generator: Arc<NameTagGenerator>) -> Self {
        Self {
            tags: TagsController::new(aws.clone()),
            attributes: AttributesController::new(aws.clone()),
            targets: TargetsController::new(aws.clone(), store),
            aws,
            generator,
        }
    }

    pub async fn reconcile(
        &self,
        service: &Service,
        annotations: &ServiceAnnotations,
        listener: &ServiceListener,
    ) -> Result<TargetGroupInfo, ControllerError> {
        let (namespace, name) = service_ns_name(service);
        let backend = &listener.backend;
        let target_type = annotations.target_group.target_type;

        let health_check_port =
            resolve_health_check_port(service, &annotations.health_check.port, target_type)
                .stage("resolve healthcheck port")?;
        let health_check = desired_health_check(annotations, health_check_port);

        let tg_name = self.generator.name_tg(
            namespace,
            &backend.service_name,
            &backend.service_port,
            target_type,
            listener.protocol,
        );
        let existing = self
            .aws
            .get_target_group_by_name(&tg_name)
            .await
            .stage("find existing targetGroup")?;

        let tags = self.build_tags(namespace, name, backend, &annotations.tags);
        let instance = match existing {
            None => self
                .create(tg_name, listener.protocol, target_type, health_check, tags.clone())
                .await
                .stage("create targetGroup")?,
            Some(instance) => self
                .modify(instance, health_check)
                .await
                .stage("modify targetGroup")?,
        };

        self.tags
            .reconcile(&instance.arn, &tags)
            .await
            .stage("reconcile targetGroup tags")?;
        self.attributes
            .reconcile_target_group(&instance.arn, &annotations.target_group.attributes)
            .await
            .stage("reconcile targetGroup attributes")?;

        let targets = self
            .targets
            .desired_targets(service, backend, target_type)
            .stage("resolve targetGroup targets")?;
        self.targets
            .reconcile(&instance.arn, &targets)
            .await
            .stage("reconcile targetGroup targets")?;

        Ok(TargetGroupInfo {
            arn: instance.arn,
            target_type,
            targets,
        })
    }

    async fn create(
        &self,
        name: String,
        protocol: Protocol,
        target_type: TargetType,
        health_check: HealthCheck,
        tags: Tags,
    ) -> Result<TargetGroup, ControllerError> {
        info!(name = %name, "Creating target group");
        let instance = self
            .aws
            .create_target_group(CreateTargetGroupRequest {
                name,
                protocol,
                port: TARGET_GROUP_DEFAULT_PORT,
                target_type,
                health_check,
                tags,
            })
            .await?;
        info!(name = %instance.name, arn = %instance.arn, "Target group created");
        Ok(instance)
    }

    async fn modify(&self, instance: TargetGroup, desired: HealthCheck) -> Result<TargetGroup, ControllerError> {
        if !health_check_needs_modification(&instance.health_check, &desired) {
            return Ok(instance);
        }
        info!(arn = %instance.arn, "Modifying target group");
        Ok(self
            .aws
            .modify_target_group(ModifyTargetGroupRequest {
                arn: instance.arn,
                health_check: desired,
            })
            .await?)
    }

    fn build_tags(&self, namespace: &str, service_name: &str, backend: &Backend, extra: &Tags) -> Tags {
        let mut owned = self.generator.tag_tg_group(namespace, service_name);
        owned.extend(
            self.generator
                .tag_tg(namespace, &backend.service_name, &backend.service_port),
        );
        self.generator.with_defaults(owned, extra)
    }
}

/// Health check port to configure for `annotated`.
///
/// Numbers and `traffic-port` are used as they are. A port name is looked up
/// on the Service: instance targets use its node port, IP targets its
/// numeric target port. A named target port only has a number on the
/// endpoints, which is the port IP targets are registered on, so it maps to
/// `traffic-port`.
pub fn resolve_health_check_port(
    service: &Service,
    annotated: &str,
    target_type: TargetType,
) -> Result<String, ControllerError> {
    if annotated == TRAFFIC_PORT || annotated.parse::<i32>().is_ok() {
        return Ok(annotated.to_string());
    }

    let (_, name) = service_ns_name(service);
    let port = service_ports(service)
        .iter()
        .find(|p| p.name.as_deref() == Some(annotated))
        .ok_or_else(|| ControllerError::HealthCheckPort {
            service: name.to_string(),
            port: annotated.to_string(),
        })?;

    match target_type {
        TargetType::Instance => port
            .node_port
            .filter(|p| *p != 0)
            .map(|p| p.to_string())
            .ok_or_else(|| ControllerError::MissingNodePort {
                service: name.to_string(),
                port: annotated.to_string(),
            }),
        TargetType::Ip => Ok(match &port.target_port {
            Some(IntOrString::Int(p)) => p.to_string(),
            Some(IntOrString::String(_)) => TRAFFIC_PORT.to_string(),
            None => port.port.to_string(),
        }),
    }
}

fn desired_health_check(annotations: &ServiceAnnotations, port: String) -> HealthCheck {
    let protocol = annotations.health_check.protocol;
    let http = protocol.is_http();
    HealthCheck {
        protocol,
        port,
        path: http.then(|| annotations.health_check.path.clone()),
        interval_seconds: annotations.health_check.interval_seconds,
        healthy_threshold_count: annotations.target_group.healthy_threshold_count,
        unhealthy_threshold_count: annotations.target_group.unhealthy_threshold_count,
        matcher: http.then(|| annotations.target_group.success_codes.clone()),
    }
}

fn health_check_needs_modification(current: &HealthCheck, desired: &HealthCheck) -> bool {
    // path and matcher only exist on HTTP(S) checks
    let http_changed =
        desired.protocol.is_http() && (current.path != desired.path || current.matcher != desired.matcher);

    http_changed
        || current.port != desired.port
        || current.protocol != desired.protocol
        || current.interval_seconds != desired.interval_seconds
        || current.healthy_threshold_count != desired.healthy_threshold_count
        || current.unhealthy_threshold_count != desired.unhealthy_threshold_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_service, service_port};

    fn service() -> Service {
        create_test_service(
            "default",
            "web",
            vec![
                service_port("http", 80, "TCP", IntOrString::Int(8080), Some(31080)),
                service_port("admin", 9000, "TCP", IntOrString::Int(9000), None),
            ],
        )
    }

    #[test]
    fn test_health_check_port_by_name() {
        let service = service();
        assert_eq!(resolve_health_check_port(&service, "http", TargetType::Instance).unwrap(), "31080");
        assert_eq!(resolve_health_check_port(&service, "http", TargetType::Ip).unwrap(), "8080");
    }

    #[test]
    fn test_named_target_port_checks_the_traffic_port() {
        let service = create_test_service(
            "default",
            "web",
            vec![service_port("http", 80, "TCP", IntOrString::String("web".to_string()), Some(31080))],
        );
        assert_eq!(resolve_health_check_port(&service, "http", TargetType::Ip).unwrap(), TRAFFIC_PORT);
        assert_eq!(resolve_health_check_port(&service, "http", TargetType::Instance).unwrap(), "31080");
    }

    #[test]
    fn test_health_check_port_passthrough() {
        let service = service();
        assert_eq!(
            resolve_health_check_port(&service, TRAFFIC_PORT, TargetType::Instance).unwrap(),
            TRAFFIC_PORT
        );
        assert_eq!(resolve_health_check_port(&service, "10254", TargetType::Ip).unwrap(), "10254");
    }

    #[test]
    fn test_health_check_port_errors() {
        let service = service();
        assert!(matches!(
            resolve_health_check_port(&service, "grpc", TargetType::Ip),
            Err(ControllerError::HealthCheckPort { .. })
        ));
        let err = resolve_health_check_port(&service, "admin", TargetType::Instance).unwrap_err();
        assert_eq!(err.to_string(), "failed to find valid NodePort for service web with port admin");
    }

    fn tcp_check() -> HealthCheck {
        HealthCheck {
            protocol: Protocol::Tcp,
            port: TRAFFIC_PORT.to_string(),
            path: None,
            interval_seconds: 10,
            healthy_threshold_count: 3,
            unhealthy_threshold_count: 3,
            matcher: None,
        }
    }

    #[test]
    fn test_tcp_check_ignores_path_and_matcher() {
        let current = HealthCheck {
            path: Some("/old".to_string()),
            ..tcp_check()
        };
        assert!(!health_check_needs_modification(&current, &tcp_check()));
    }

    #[test]
    fn test_http_check_compares_path_and_matcher() {
        let desired = HealthCheck {
            protocol: Protocol::Http,
            path: Some("/healthz".to_string()),
            matcher: Some("200-399".to_string()),
            ..tcp_check()
        };
        let current = HealthCheck {
            path: Some("/".to_string()),
            ..desired.clone()
        };
        assert!(health_check_needs_modification(&current, &desired));
        assert!(!health_check_needs_modification(&desired, &desired));

        let changed_threshold = HealthCheck {
            unhealthy_threshold_count: 2,
            ..tcp_check()
        };
        assert!(health_check_needs_modification(&tcp_check(), &changed_threshold));
    }
}
