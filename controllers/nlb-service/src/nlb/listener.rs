//! Listeners and their ordered actions.
//!
//! Listeners are keyed by port: missing ones are created, ones whose
//! protocol or actions drifted are modified, and ports the Service no
//! longer declares are deleted.

use super::tg_group::TargetGroupGroup;
use super::{Backend, SharedAws, service_listeners};
use crate::error::ControllerError;
use aws_client::{Action, Listener, ListenerConfig};
use k8s_openapi::api::core::v1::Service;
use service_annotations::ServiceAnnotations;
use std::collections::BTreeMap;
use tracing::info;

/// Actions for `backend`, numbered from 1.
pub fn build_actions(
    annotations: &ServiceAnnotations,
    backend: &Backend,
    group: &TargetGroupGroup,
) -> Result<Vec<Action>, ControllerError> {
    let mut actions = if backend.uses_annotation() {
        vec![
            annotations
                .actions
                .get_action(&backend.service_name)
                .map_err(ControllerError::from_action)?,
        ]
    } else {
        let tg = group
            .get(backend)
            .ok_or_else(|| ControllerError::MissingTargetGroup(backend.to_string()))?;
        vec![Action::forward(&tg.arn)]
    };

    for (order, action) in (1..).zip(actions.iter_mut()) {
        action.order = Some(order);
    }
    Ok(actions)
}

#[derive(Clone)]
pub struct ListenerGroupController {
    aws: SharedAws,
}

impl ListenerGroupController {
    pub fn new(aws: SharedAws) -> Self {
        Self { aws }
    }

    pub async fn reconcile(
        &self,
        load_balancer_arn: &str,
        service: &Service,
        annotations: &ServiceAnnotations,
        group: &TargetGroupGroup,
    ) -> Result<(), ControllerError> {
        let mut desired = BTreeMap::new();
        for listener in service_listeners(service, annotations.target_group.backend_protocol) {
            let config = ListenerConfig {
                port: listener.port,
                protocol: listener.protocol,
                default_actions: build_actions(annotations, &listener.backend, group)?,
            };
            desired.insert(listener.port, config);
        }

        let mut current: BTreeMap<i32, Listener> = self
            .aws
            .get_listeners(load_balancer_arn)
            .await?
            .into_iter()
            .map(|l| (l.port, l))
            .collect();

        for (port, config) in &desired {
            match current.remove(port) {
                None => {
                    info!(lb = load_balancer_arn, port, protocol = %config.protocol, "Creating listener");
                    self.aws.create_listener(load_balancer_arn, config).await?;
                }
                Some(live) if needs_modification(&live, config) => {
                    info!(arn = %live.arn, port, protocol = %config.protocol, "Modifying listener");
                    self.aws.modify_listener(&live.arn, config).await?;
                }
                Some(_) => {}
            }
        }

        // whatever is left is no longer declared
        for stale in current.values() {
            info!(arn = %stale.arn, port = stale.port, "Deleting listener");
            self.aws.delete_listener(&stale.arn).await?;
        }
        Ok(())
    }

    /// Delete every listener on the load balancer.
    pub async fn delete(&self, load_balancer_arn: &str) -> Result<(), ControllerError> {
        for listener in self.aws.get_listeners(load_balancer_arn).await? {
            info!(arn = %listener.arn, port = listener.port, "Deleting listener");
            self.aws.delete_listener(&listener.arn).await?;
        }
        Ok(())
    }
}

fn needs_modification(live: &Listener, desired: &ListenerConfig) -> bool {
    let mut actions = live.default_actions.clone();
    actions.sort_by_key(|a| a.order);
    live.protocol != desired.protocol || actions != desired.default_actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlb::tg::TargetGroupInfo;
    use aws_client::{Protocol, TargetType};
    use service_annotations::{AnnotationDefaults, DEFAULT_ANNOTATION_PREFIX};
    use std::collections::BTreeSet;

    fn annotations(pairs: &[(&str, &str)]) -> ServiceAnnotations {
        let annos: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{DEFAULT_ANNOTATION_PREFIX}/{k}"), (*v).to_string()))
            .collect();
        let defaults = AnnotationDefaults {
            target_type: TargetType::Ip,
            backend_protocol: Protocol::Tcp,
        };
        ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &annos, defaults).unwrap()
    }

    fn group(backend: &Backend, arn: &str) -> TargetGroupGroup {
        let mut group = TargetGroupGroup::default();
        group.by_backend.insert(
            backend.clone(),
            TargetGroupInfo {
                arn: arn.to_string(),
                target_type: TargetType::Ip,
                targets: BTreeSet::new(),
            },
        );
        group
    }

    #[test]
    fn test_forward_action_for_backend() {
        let backend = Backend::new("web", "80");
        let actions = build_actions(&annotations(&[]), &backend, &group(&backend, "arn:tg-a")).unwrap();
        assert_eq!(
            actions,
            vec![Action {
                order: Some(1),
                ..Action::forward("arn:tg-a")
            }]
        );
    }

    #[test]
    fn test_missing_target_group() {
        let err = build_actions(&annotations(&[]), &Backend::new("web", "80"), &TargetGroupGroup::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "unable to find targetGroup for backend web:80");
    }

    #[test]
    fn test_annotation_action() {
        let annos = annotations(&[(
            "actions.blue",
            r#"{"Type":"forward","TargetGroupArn":"arn:static"}"#,
        )]);
        let backend = Backend::new("blue", "use-annotation");
        let actions = build_actions(&annos, &backend, &TargetGroupGroup::default()).unwrap();
        assert_eq!(actions[0].target_group_arn.as_deref(), Some("arn:static"));
        assert_eq!(actions[0].order, Some(1));
    }

    #[test]
    fn test_annotation_action_errors() {
        let backend = Backend::new("blue", "use-annotation");
        let err = build_actions(&annotations(&[]), &backend, &TargetGroupGroup::default()).unwrap_err();
        assert!(matches!(err, ControllerError::UnknownAction(_)));

        let annos = annotations(&[("actions.blue", r#"{"Type":"redirect"}"#)]);
        let err = build_actions(&annos, &backend, &TargetGroupGroup::default()).unwrap_err();
        assert!(matches!(err, ControllerError::UnsupportedAction(_)));

        let annos = annotations(&[("actions.blue", r#"{"Type":"forward"}"#)]);
        let err = build_actions(&annos, &backend, &TargetGroupGroup::default()).unwrap_err();
        assert!(matches!(err, ControllerError::UnsupportedAction(_)));
    }
}
