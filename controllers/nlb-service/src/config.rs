//! Controller configuration.
//!
//! Settings come from environment variables. The internet-facing whitelist
//! (and optionally scheme restriction and default tags) can also be supplied
//! as a YAML file named by `NLB_CONTROLLER_CONFIG`; environment variables win
//! over the file.
//!
//! ```yaml
//! restrictScheme: true
//! internetFacingServices:
//!   default: [frontend]
//! defaultTags:
//!   team: network
//! ```

use crate::error::ControllerError;
use aws_client::{Protocol, Tags, TargetType};
use md5::{Digest, Md5};
use serde::Deserialize;
use service_annotations::{AnnotationDefaults, DEFAULT_ANNOTATION_PREFIX, parse_key_values};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use tracing::warn;

/// Longest name prefix that still leaves room for the target group hash.
pub const MAX_NAME_PREFIX_LEN: usize = 12;

const DEFAULT_NAME_PREFIX: &str = "nlb";
const DEFAULT_SERVICE_CLASS: &str = "nlb";
const DEFAULT_METRICS_PORT: u16 = 8080;
const DEFAULT_AWS_CALL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RESYNC_SECS: u64 = 600;

/// Optional file layer, camelCase keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FileConfig {
    restrict_scheme: Option<bool>,
    internet_facing_services: BTreeMap<String, Vec<String>>,
    default_tags: Tags,
}

/// Runtime configuration shared by every component.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub cluster_name: String,
    /// Prefix of every load balancer and target group name
    pub name_prefix: String,
    /// Value of `kubernetes.io/service.class` this controller owns
    pub service_class: String,
    pub annotations_prefix: String,
    pub default_target_type: TargetType,
    pub default_backend_protocol: Protocol,
    /// Only whitelisted Services may ask for internet-facing load balancers
    pub restrict_scheme: bool,
    /// namespace -> Service names allowed to be internet-facing
    pub internet_facing_services: BTreeMap<String, Vec<String>>,
    pub default_tags: Tags,
    pub max_concurrent_reconciles: u16,
    pub vpc_id: String,
    pub watch_namespace: Option<String>,
    pub metrics_port: u16,
    pub aws_call_timeout: Duration,
    pub reconcile_timeout: Duration,
    /// Converged Services are reconciled again after this long
    pub resync_period: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            service_class: DEFAULT_SERVICE_CLASS.to_string(),
            annotations_prefix: DEFAULT_ANNOTATION_PREFIX.to_string(),
            default_target_type: TargetType::Ip,
            default_backend_protocol: Protocol::Tcp,
            restrict_scheme: false,
            internet_facing_services: BTreeMap::new(),
            default_tags: Tags::new(),
            max_concurrent_reconciles: 1,
            vpc_id: String::new(),
            watch_namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            aws_call_timeout: Duration::from_secs(DEFAULT_AWS_CALL_TIMEOUT_SECS),
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            resync_period: Duration::from_secs(DEFAULT_RESYNC_SECS),
        }
    }
}

impl ControllerConfig {
    /// Load from the process environment and the optional config file.
    pub fn from_env() -> Result<Self, ControllerError> {
        let file = match env::var("NLB_CONTROLLER_CONFIG").ok().filter(|p| !p.is_empty()) {
            Some(path) => Some(std::fs::read_to_string(&path).map_err(|e| {
                ControllerError::InvalidConfig(format!("failed to read config file {path}: {e}"))
            })?),
            None => None,
        };
        Self::from_lookup(|key| env::var(key).ok(), file.as_deref())
    }

    /// Build and validate a configuration from `lookup` (environment) and
    /// optional YAML `file` contents.
    pub fn from_lookup<F>(raw_lookup: F, file: Option<&str>) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| raw_lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let file: FileConfig = match file {
            Some(raw) => serde_yaml::from_str(raw)
                .map_err(|e| ControllerError::InvalidConfig(format!("invalid config file: {e}")))?,
            None => FileConfig::default(),
        };

        let mut config = Self {
            restrict_scheme: file.restrict_scheme.unwrap_or(false),
            internet_facing_services: file.internet_facing_services,
            default_tags: file.default_tags,
            ..Self::default()
        };

        config.cluster_name = lookup("CLUSTER_NAME").ok_or_else(|| {
            ControllerError::InvalidConfig("CLUSTER_NAME environment variable is required".to_string())
        })?;
        // Set but empty means "derive from the cluster name"
        config.name_prefix = match raw_lookup("NLB_NAME_PREFIX") {
            None => DEFAULT_NAME_PREFIX.to_string(),
            Some(prefix) if prefix.trim().is_empty() => derive_name_prefix(&config.cluster_name),
            Some(prefix) => prefix.trim().to_string(),
        };
        if let Some(class) = lookup("NLB_SERVICE_CLASS") {
            config.service_class = class;
        }
        if let Some(prefix) = lookup("NLB_ANNOTATIONS_PREFIX") {
            config.annotations_prefix = prefix;
        }
        if let Some(raw) = lookup("NLB_TARGET_TYPE") {
            config.default_target_type = parse_target_type(&raw)?;
        }
        if let Some(raw) = lookup("NLB_BACKEND_PROTOCOL") {
            config.default_backend_protocol = raw.parse().map_err(|_| {
                ControllerError::InvalidConfig(format!("NLB_BACKEND_PROTOCOL must be TCP, UDP or TCP_UDP, got `{raw}`"))
            })?;
        }
        if let Some(raw) = lookup("NLB_CONTROLLER_RESTRICT_SCHEME") {
            config.restrict_scheme = parse_env("NLB_CONTROLLER_RESTRICT_SCHEME", &raw)?;
        }
        if let Some(raw) = lookup("NLB_DEFAULT_TAGS") {
            let tags = parse_key_values(&raw).map_err(|bad| {
                ControllerError::InvalidConfig(format!(
                    "NLB_DEFAULT_TAGS: unable to parse `{}` into Key=Value pair(s)",
                    bad.join(", ")
                ))
            })?;
            config.default_tags.extend(tags);
        }
        if let Some(raw) = lookup("NLB_MAX_CONCURRENT_RECONCILES") {
            config.max_concurrent_reconciles = parse_env("NLB_MAX_CONCURRENT_RECONCILES", &raw)?;
        }
        config.vpc_id = lookup("AWS_VPC_ID").unwrap_or_default();
        config.watch_namespace = lookup("WATCH_NAMESPACE");
        if let Some(raw) = lookup("METRICS_PORT") {
            config.metrics_port = parse_env("METRICS_PORT", &raw)?;
        }
        if let Some(raw) = lookup("AWS_CALL_TIMEOUT_SECONDS") {
            config.aws_call_timeout = Duration::from_secs(parse_env("AWS_CALL_TIMEOUT_SECONDS", &raw)?);
        }
        if let Some(raw) = lookup("RECONCILE_TIMEOUT_SECONDS") {
            config.reconcile_timeout = Duration::from_secs(parse_env("RECONCILE_TIMEOUT_SECONDS", &raw)?);
        }
        if let Some(raw) = lookup("NLB_RESYNC_SECONDS") {
            config.resync_period = Duration::from_secs(parse_env("NLB_RESYNC_SECONDS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the controller cannot work with.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.cluster_name.is_empty() {
            return Err(ControllerError::InvalidConfig("cluster name must not be empty".to_string()));
        }
        if self.name_prefix.is_empty() || self.name_prefix.len() > MAX_NAME_PREFIX_LEN {
            return Err(ControllerError::InvalidConfig(format!(
                "name prefix `{}` must be between 1 and {MAX_NAME_PREFIX_LEN} characters",
                self.name_prefix
            )));
        }
        if !matches!(
            self.default_backend_protocol,
            Protocol::Tcp | Protocol::Udp | Protocol::TcpUdp
        ) {
            return Err(ControllerError::InvalidConfig(format!(
                "default backend protocol must be TCP, UDP or TCP_UDP, got `{}`",
                self.default_backend_protocol
            )));
        }
        if self.max_concurrent_reconciles == 0 {
            return Err(ControllerError::InvalidConfig(
                "NLB_MAX_CONCURRENT_RECONCILES must be at least 1".to_string(),
            ));
        }
        if self.resync_period.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "NLB_RESYNC_SECONDS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Defaults handed to the annotation parser.
    #[must_use]
    pub fn annotation_defaults(&self) -> AnnotationDefaults {
        AnnotationDefaults {
            target_type: self.default_target_type,
            backend_protocol: self.default_backend_protocol,
        }
    }

    /// Whether `namespace/name` may own an internet-facing load balancer.
    #[must_use]
    pub fn is_internet_facing_allowed(&self, namespace: &str, name: &str) -> bool {
        !self.restrict_scheme
            || self
                .internet_facing_services
                .get(namespace)
                .is_some_and(|names| names.iter().any(|n| n == name))
    }
}

/// `pod` is the historical spelling of `ip`.
fn parse_target_type(raw: &str) -> Result<TargetType, ControllerError> {
    if raw == "pod" {
        warn!("NLB_TARGET_TYPE=pod is deprecated, use `ip`");
        return Ok(TargetType::Ip);
    }
    raw.parse().map_err(|_| {
        ControllerError::InvalidConfig(format!("NLB_TARGET_TYPE must be `instance` or `ip`, got `{raw}`"))
    })
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ControllerError> {
    raw.parse()
        .map_err(|_| ControllerError::InvalidConfig(format!("{key} has invalid value `{raw}`")))
}

/// First 8 hex characters of md5(cluster name).
fn derive_name_prefix(cluster_name: &str) -> String {
    let digest = hex::encode(Md5::digest(cluster_name.as_bytes()));
    digest[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], file: Option<&str>) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|k| vars.get(k).cloned(), file)
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("CLUSTER_NAME", "prod")], None).unwrap();
        assert_eq!(config.name_prefix, "nlb");
        assert_eq!(config.service_class, "nlb");
        assert_eq!(config.annotations_prefix, DEFAULT_ANNOTATION_PREFIX);
        assert_eq!(config.default_target_type, TargetType::Ip);
        assert_eq!(config.default_backend_protocol, Protocol::Tcp);
        assert_eq!(config.max_concurrent_reconciles, 1);
        assert_eq!(config.metrics_port, 8080);
        assert_eq!(config.aws_call_timeout, Duration::from_secs(30));
        assert_eq!(config.reconcile_timeout, Duration::from_secs(300));
        assert_eq!(config.resync_period, Duration::from_secs(600));
        assert!(!config.restrict_scheme);
    }

    #[test]
    fn test_cluster_name_required() {
        assert!(matches!(load(&[], None), Err(ControllerError::InvalidConfig(_))));
        assert!(load(&[("CLUSTER_NAME", "  ")], None).is_err());
    }

    #[test]
    fn test_prefix_length_is_bounded() {
        let err = load(&[("CLUSTER_NAME", "prod"), ("NLB_NAME_PREFIX", "averyveryverylong")], None);
        assert!(err.is_err());
    }

    #[test]
    fn test_prefix_derived_from_cluster_name() {
        let config = load(&[("CLUSTER_NAME", "prod"), ("NLB_NAME_PREFIX", "")], None).unwrap();
        assert_eq!(config.name_prefix.len(), 8);
        assert_eq!(config.name_prefix, derive_name_prefix("prod"));
    }

    #[test]
    fn test_pod_target_type_means_ip() {
        let config = load(&[("CLUSTER_NAME", "prod"), ("NLB_TARGET_TYPE", "pod")], None).unwrap();
        assert_eq!(config.default_target_type, TargetType::Ip);
        assert!(load(&[("CLUSTER_NAME", "prod"), ("NLB_TARGET_TYPE", "lambda")], None).is_err());
    }

    #[test]
    fn test_tls_default_protocol_rejected() {
        assert!(load(&[("CLUSTER_NAME", "prod"), ("NLB_BACKEND_PROTOCOL", "TLS")], None).is_err());
    }

    #[test]
    fn test_default_tags_parsed() {
        let config = load(&[("CLUSTER_NAME", "prod"), ("NLB_DEFAULT_TAGS", "team=net,env=prod")], None).unwrap();
        assert_eq!(config.default_tags.len(), 2);
        assert!(load(&[("CLUSTER_NAME", "prod"), ("NLB_DEFAULT_TAGS", "team")], None).is_err());
    }

    #[test]
    fn test_file_whitelist_and_env_override() {
        let file = "restrictScheme: true\ninternetFacingServices:\n  default: [frontend]\ndefaultTags:\n  team: net\n";
        let config = load(&[("CLUSTER_NAME", "prod")], Some(file)).unwrap();
        assert!(config.restrict_scheme);
        assert!(config.is_internet_facing_allowed("default", "frontend"));
        assert!(!config.is_internet_facing_allowed("default", "backend"));
        assert!(!config.is_internet_facing_allowed("kube-system", "frontend"));
        assert_eq!(config.default_tags.get("team").map(String::as_str), Some("net"));

        let config = load(
            &[("CLUSTER_NAME", "prod"), ("NLB_CONTROLLER_RESTRICT_SCHEME", "false")],
            Some(file),
        )
        .unwrap();
        assert!(config.is_internet_facing_allowed("default", "backend"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(load(&[("CLUSTER_NAME", "prod"), ("METRICS_PORT", "http")], None).is_err());
        assert!(load(&[("CLUSTER_NAME", "prod"), ("NLB_MAX_CONCURRENT_RECONCILES", "0")], None).is_err());
        assert!(load(&[("CLUSTER_NAME", "prod"), ("NLB_RESYNC_SECONDS", "0")], None).is_err());
    }
}
