//! Service class selection.

use std::collections::BTreeMap;

/// Annotation selecting which controller owns a Service.
pub const SERVICE_CLASS_ANNOTATION: &str = "kubernetes.io/service.class";

/// The service class declared on a Service, if any.
#[must_use]
pub fn service_class(annotations: &BTreeMap<String, String>) -> Option<&str> {
    annotations
        .get(SERVICE_CLASS_ANNOTATION)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Whether a Service carrying `annotations` belongs to the controller for `class`.
#[must_use]
pub fn is_valid_service(annotations: &BTreeMap<String, String>, class: &str) -> bool {
    service_class(annotations) == Some(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_must_match() {
        let mut annos = BTreeMap::new();
        assert!(!is_valid_service(&annos, "nlb"));

        annos.insert(SERVICE_CLASS_ANNOTATION.to_string(), "alb".to_string());
        assert!(!is_valid_service(&annos, "nlb"));

        annos.insert(SERVICE_CLASS_ANNOTATION.to_string(), " nlb ".to_string());
        assert!(is_valid_service(&annos, "nlb"));
    }
}
