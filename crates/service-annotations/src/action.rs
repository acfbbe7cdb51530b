//! Static listener actions declared as `<prefix>/actions.<name>` JSON annotations.

use crate::error::AnnotationError;
use crate::parser::AnnotationParser;
use aws_client::{ACTION_TYPE_FORWARD, Action};
use std::collections::BTreeMap;

/// Marker telling the controller to route a port with an annotation action
/// instead of a target group it manages.
pub const USE_ANNOTATION: &str = "use-annotation";

/// Whether a backend port refers to an annotation-declared action.
#[must_use]
pub fn uses_annotation(service_port: &str) -> bool {
    service_port == USE_ANNOTATION
}

/// Actions declared on a Service, keyed by action name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionAnnotations {
    key_prefix: String,
    actions: BTreeMap<String, Action>,
}

impl ActionAnnotations {
    pub(crate) fn parse(parser: &AnnotationParser<'_>) -> Result<Self, AnnotationError> {
        let mut actions = BTreeMap::new();
        for (name, raw) in parser.get_prefixed("actions") {
            let action: Action = serde_json::from_str(raw).map_err(|e| {
                AnnotationError::invalid(&parser.key(&format!("actions.{name}")), e.to_string())
            })?;
            actions.insert(name, action);
        }
        Ok(Self {
            key_prefix: parser.key("actions."),
            actions,
        })
    }

    /// The action named `name`, validated for use on a network load balancer.
    pub fn get_action(&self, name: &str) -> Result<Action, AnnotationError> {
        if name.is_empty() {
            return Err(AnnotationError::Missing(format!("{}<port-name>", self.key_prefix)));
        }
        let action = self.actions.get(name).ok_or_else(|| {
            AnnotationError::ActionNotSet(format!(
                "backend with `targetPort: {USE_ANNOTATION}` was configured with port name `{name}` but an action annotation for {name} is not set"
            ))
        })?;
        if action.action_type != ACTION_TYPE_FORWARD {
            return Err(AnnotationError::UnsupportedAction(format!(
                "an invalid action type {} was configured in {name}",
                action.action_type
            )));
        }
        if action.target_group_arn.as_deref().is_none_or(str::is_empty) {
            return Err(AnnotationError::UnsupportedAction(format!(
                "{name} is type forward but did not include a valid TargetGroupArn configuration"
            )));
        }
        Ok(action.clone())
    }
}
