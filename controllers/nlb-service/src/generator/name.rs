//! Deterministic load balancer and target group names.
//!
//! Names are pure functions of their inputs so a restarted controller finds
//! the resources it created earlier by looking them up by name.

use aws_client::{Protocol, TargetType};
use md5::{Digest, Md5};

/// Longest load balancer name before the hash suffix is appended.
const LB_NAME_MAX_LEN: usize = 26;
const LB_HASH_LEN: usize = 4;
const TG_PREFIX_MAX_LEN: usize = 12;
const TG_HASH_LEN: usize = 19;

/// Names for the cloud resources owned by a Service.
pub trait NameGenerator: Send + Sync {
    /// Load balancer name for `namespace/service_name`.
    fn name_lb(&self, namespace: &str, service_name: &str) -> String;

    /// Target group name for one backend of `namespace/service_name`.
    fn name_tg(
        &self,
        namespace: &str,
        service_name: &str,
        service_port: &str,
        target_type: TargetType,
        protocol: Protocol,
    ) -> String;
}

/// [`NameGenerator`] that prefixes every name with a configured string.
#[derive(Debug, Clone)]
pub struct PrefixNameGenerator {
    prefix: String,
}

impl PrefixNameGenerator {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl NameGenerator for PrefixNameGenerator {
    fn name_lb(&self, namespace: &str, service_name: &str) -> String {
        let hash = md5_hex(&[namespace, service_name]);
        let prefix: String = self
            .prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let mut name = format!("{prefix}-{}{}", strip(namespace), strip(service_name));
        name.truncate(LB_NAME_MAX_LEN);
        format!("{name}-{}", &hash[..LB_HASH_LEN])
    }

    fn name_tg(
        &self,
        namespace: &str,
        service_name: &str,
        service_port: &str,
        target_type: TargetType,
        protocol: Protocol,
    ) -> String {
        let lb_name = self.name_lb(namespace, service_name);
        let hash = md5_hex(&[
            &lb_name,
            service_name,
            service_port,
            protocol.as_str(),
            target_type.as_str(),
        ]);
        let prefix: String = self.prefix.chars().take(TG_PREFIX_MAX_LEN).collect();
        format!("{prefix}-{}", &hash[..TG_HASH_LEN])
    }
}

/// Drop everything that is not an ASCII letter or digit.
fn strip(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}

fn md5_hex(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lb_name_is_stable() {
        let names = PrefixNameGenerator::new("nlb");
        assert_eq!(names.name_lb("default", "foo"), "nlb-defaultfoo-a4dd");
        assert_eq!(names.name_lb("default", "foo"), names.name_lb("default", "foo"));
    }

    #[test]
    fn test_lb_name_is_truncated_before_suffix() {
        let names = PrefixNameGenerator::new("nlb");
        let name = names.name_lb("averyveryverylongnamespace", "averylongservicename");
        assert_eq!(name, "nlb-averyveryverylongnames-11b9");
        assert_eq!(name.len(), LB_NAME_MAX_LEN + 1 + LB_HASH_LEN);
    }

    #[test]
    fn test_lb_name_sanitizes_inputs() {
        let names = PrefixNameGenerator::new("my_lb");
        let name = names.name_lb("kube-system", "my.service");
        assert!(name.starts_with("my-lb-kubesystemmyservice-"), "{name}");
    }

    #[test]
    fn test_tg_name() {
        let names = PrefixNameGenerator::new("nlb");
        let name = names.name_tg("default", "foo", "80", TargetType::Ip, Protocol::Tcp);
        assert_eq!(name, "nlb-f34f421be378051e323");
    }

    #[test]
    fn test_tg_name_depends_on_backend_identity() {
        let names = PrefixNameGenerator::new("nlb");
        let base = names.name_tg("default", "foo", "80", TargetType::Ip, Protocol::Tcp);
        assert_ne!(base, names.name_tg("default", "foo", "443", TargetType::Ip, Protocol::Tcp));
        assert_ne!(base, names.name_tg("default", "foo", "80", TargetType::Instance, Protocol::Tcp));
        assert_ne!(base, names.name_tg("default", "foo", "80", TargetType::Ip, Protocol::Udp));
        assert_ne!(base, names.name_tg("other", "foo", "80", TargetType::Ip, Protocol::Tcp));
    }

    #[test]
    fn test_tg_prefix_is_capped() {
        let names = PrefixNameGenerator::new("abcdefghijklmnop");
        let name = names.name_tg("default", "foo", "80", TargetType::Ip, Protocol::Tcp);
        assert!(name.starts_with("abcdefghijkl-"), "{name}");
        assert_eq!(name.len(), TG_PREFIX_MAX_LEN + 1 + TG_HASH_LEN);
    }
}
