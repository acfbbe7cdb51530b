//! Ownership tags for load balancers and target groups.
//!
//! The ownership tags double as the garbage-collection marker: target groups
//! owned by a Service are found by matching [`TagGenerator::tag_tg_group`].
//! Default and annotation tags never replace an ownership key.

use aws_client::Tags;

pub const TAG_KEY_NAMESPACE: &str = "kubernetes.io/namespace";
pub const TAG_KEY_SERVICE_NAME: &str = "kubernetes.io/service-name";
pub const TAG_KEY_SERVICE_PORT: &str = "kubernetes.io/service-port";
/// Keys understood by the upstream AWS Load Balancer Controller, kept so a
/// migration to it can adopt the resources.
pub const TAG_KEY_LBC_SERVICE_RESOURCE: &str = "service.k8s.aws/resource";
pub const TAG_KEY_LBC_CLUSTER: &str = "elbv2.k8s.aws/cluster";
pub const TAG_KEY_LBC_STACK: &str = "service.k8s.aws/stack";

/// Tags for the cloud resources owned by a Service.
pub trait TagGenerator: Send + Sync {
    /// Ownership tags for the Service's load balancer.
    fn tag_lb(&self, namespace: &str, service_name: &str) -> Tags;

    /// Ownership tags shared by every target group of the Service.
    fn tag_tg_group(&self, namespace: &str, service_name: &str) -> Tags;

    /// Tags identifying one backend's target group.
    fn tag_tg(&self, namespace: &str, service_name: &str, service_port: &str) -> Tags;

    /// Full tag set of a resource: defaults, then `extra`, then `owned`.
    fn with_defaults(&self, owned: Tags, extra: &Tags) -> Tags;
}

/// [`TagGenerator`] keyed by cluster name, with optional default tags.
#[derive(Debug, Clone)]
pub struct ClusterTagGenerator {
    cluster_name: String,
    default_tags: Tags,
}

impl ClusterTagGenerator {
    #[must_use]
    pub fn new(cluster_name: impl Into<String>, default_tags: Tags) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            default_tags,
        }
    }

    fn cluster_tag_key(&self) -> String {
        format!("kubernetes.io/cluster/{}", self.cluster_name)
    }

    fn tag_service_resources(&self, namespace: &str, service_name: &str) -> Tags {
        let mut tags = Tags::new();
        tags.insert(self.cluster_tag_key(), "owned".to_string());
        tags.insert(TAG_KEY_NAMESPACE.to_string(), namespace.to_string());
        tags.insert(TAG_KEY_SERVICE_NAME.to_string(), service_name.to_string());
        tags.insert(TAG_KEY_LBC_CLUSTER.to_string(), self.cluster_name.clone());
        tags.insert(TAG_KEY_LBC_STACK.to_string(), format!("{namespace}/{service_name}"));
        tags
    }
}

impl TagGenerator for ClusterTagGenerator {
    fn tag_lb(&self, namespace: &str, service_name: &str) -> Tags {
        let mut tags = self.tag_service_resources(namespace, service_name);
        tags.insert(TAG_KEY_LBC_SERVICE_RESOURCE.to_string(), "LoadBalancer".to_string());
        tags
    }

    fn tag_tg_group(&self, namespace: &str, service_name: &str) -> Tags {
        self.tag_service_resources(namespace, service_name)
    }

    fn tag_tg(&self, namespace: &str, service_name: &str, service_port: &str) -> Tags {
        Tags::from([
            (TAG_KEY_SERVICE_NAME.to_string(), service_name.to_string()),
            (TAG_KEY_SERVICE_PORT.to_string(), service_port.to_string()),
            (
                TAG_KEY_LBC_SERVICE_RESOURCE.to_string(),
                format!("{namespace}/{service_name}:{service_port}"),
            ),
        ])
    }

    fn with_defaults(&self, owned: Tags, extra: &Tags) -> Tags {
        let mut tags = self.default_tags.clone();
        tags.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        tags.extend(owned);
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> ClusterTagGenerator {
        ClusterTagGenerator::new(
            "prod",
            Tags::from([
                ("team".to_string(), "net".to_string()),
                (TAG_KEY_NAMESPACE.to_string(), "spoofed".to_string()),
            ]),
        )
    }

    #[test]
    fn test_lb_tags() {
        let generator = generator();
        let tags = generator.with_defaults(generator.tag_lb("default", "foo"), &Tags::new());
        assert_eq!(tags.get("kubernetes.io/cluster/prod").map(String::as_str), Some("owned"));
        assert_eq!(tags.get(TAG_KEY_NAMESPACE).map(String::as_str), Some("default"));
        assert_eq!(tags.get(TAG_KEY_SERVICE_NAME).map(String::as_str), Some("foo"));
        assert_eq!(tags.get(TAG_KEY_LBC_CLUSTER).map(String::as_str), Some("prod"));
        assert_eq!(tags.get(TAG_KEY_LBC_STACK).map(String::as_str), Some("default/foo"));
        assert_eq!(tags.get(TAG_KEY_LBC_SERVICE_RESOURCE).map(String::as_str), Some("LoadBalancer"));
        assert_eq!(tags.get("team").map(String::as_str), Some("net"));
    }

    #[test]
    fn test_ownership_keys_win_over_defaults_and_extra() {
        let generator = generator();
        let extra = Tags::from([
            (TAG_KEY_SERVICE_NAME.to_string(), "other".to_string()),
            ("kubernetes.io/cluster/prod".to_string(), "shared".to_string()),
            ("team".to_string(), "web".to_string()),
        ]);
        let tags = generator.with_defaults(generator.tag_tg_group("default", "foo"), &extra);
        assert_eq!(tags.get(TAG_KEY_NAMESPACE).map(String::as_str), Some("default"));
        assert_eq!(tags.get(TAG_KEY_SERVICE_NAME).map(String::as_str), Some("foo"));
        assert_eq!(tags.get("kubernetes.io/cluster/prod").map(String::as_str), Some("owned"));
        assert_eq!(tags.get("team").map(String::as_str), Some("web"));
        assert!(!tags.contains_key(TAG_KEY_LBC_SERVICE_RESOURCE));
    }

    #[test]
    fn test_gc_selector_ignores_default_tags() {
        let selector = generator().tag_tg_group("default", "foo");
        assert!(!selector.contains_key("team"));
        assert_eq!(selector.get(TAG_KEY_NAMESPACE).map(String::as_str), Some("default"));
    }

    #[test]
    fn test_tg_tags() {
        let tags = generator().tag_tg("default", "foo", "80");
        assert_eq!(tags.len(), 3);
        assert_eq!(tags.get(TAG_KEY_SERVICE_PORT).map(String::as_str), Some("80"));
        assert_eq!(tags.get(TAG_KEY_LBC_SERVICE_RESOURCE).map(String::as_str), Some("default/foo:80"));
    }
}
