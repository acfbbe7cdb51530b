//! Naming and tagging of the cloud resources owned by a Service.

pub mod name;
pub mod tag;

pub use name::{NameGenerator, PrefixNameGenerator};
pub use tag::{ClusterTagGenerator, TagGenerator};

use crate::config::ControllerConfig;
use aws_client::{Protocol, Tags, TargetType};

/// Combined [`NameGenerator`] and [`TagGenerator`] built from the controller config.
#[derive(Debug, Clone)]
pub struct NameTagGenerator {
    names: PrefixNameGenerator,
    tags: ClusterTagGenerator,
}

impl NameTagGenerator {
    #[must_use]
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            names: PrefixNameGenerator::new(config.name_prefix.clone()),
            tags: ClusterTagGenerator::new(config.cluster_name.clone(), config.default_tags.clone()),
        }
    }
}

impl NameGenerator for NameTagGenerator {
    fn name_lb(&self, namespace: &str, service_name: &str) -> String {
        self.names.name_lb(namespace, service_name)
    }

    fn name_tg(
        &self,
        namespace: &str,
        service_name: &str,
        service_port: &str,
        target_type: TargetType,
        protocol: Protocol,
    ) -> String {
        self.names
            .name_tg(namespace, service_name, service_port, target_type, protocol)
    }
}

impl TagGenerator for NameTagGenerator {
    fn tag_lb(&self, namespace: &str, service_name: &str) -> Tags {
        self.tags.tag_lb(namespace, service_name)
    }

    fn tag_tg_group(&self, namespace: &str, service_name: &str) -> Tags {
        self.tags.tag_tg_group(namespace, service_name)
    }

    fn tag_tg(&self, namespace: &str, service_name: &str, service_port: &str) -> Tags {
        self.tags.tag_tg(namespace, service_name, service_port)
    }

    fn with_defaults(&self, owned: Tags, extra: &Tags) -> Tags {
        self.tags.with_defaults(owned, extra)
    }
}
