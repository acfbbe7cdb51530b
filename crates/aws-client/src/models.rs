//! ELBv2 / EC2 models
//!
//! Plain data types mirroring the subset of the ELBv2 and EC2 APIs the NLB
//! service controller works with. They carry no SDK types so they can be
//! built freely in tests and in the mock client.

use crate::error::AwsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tag map attached to load balancers, target groups and subnets.
pub type Tags = BTreeMap<String, String>;

/// Attribute map of a load balancer or target group.
pub type Attributes = BTreeMap<String, String>;

/// The only action type network load balancer listeners accept.
pub const ACTION_TYPE_FORWARD: &str = "forward";

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $value)] $variant),+
        }

        impl $name {
            /// Wire representation used by the AWS API.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AwsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    other => Err(AwsError::InvalidRequest(format!(
                        "unknown {} `{}`",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(
    /// Load balancer scheme.
    Scheme {
        /// Reachable only from inside the VPC
        Internal => "internal",
        /// Reachable from the internet
        InternetFacing => "internet-facing",
    }
);

string_enum!(
    /// IP address type of a load balancer.
    IpAddressType {
        /// IPv4 only
        Ipv4 => "ipv4",
        /// IPv4 and IPv6
        Dualstack => "dualstack",
    }
);

string_enum!(
    /// How targets are registered in a target group.
    TargetType {
        /// EC2 instance IDs on the service node port
        Instance => "instance",
        /// Pod IPs on the container port
        Ip => "ip",
    }
);

string_enum!(
    /// Listener, target group and health check protocols.
    Protocol {
        /// TCP
        Tcp => "TCP",
        /// UDP
        Udp => "UDP",
        /// TCP and UDP on the same port
        TcpUdp => "TCP_UDP",
        /// TLS (health checks are never TLS)
        Tls => "TLS",
        /// HTTP (health checks only)
        Http => "HTTP",
        /// HTTPS (health checks only)
        Https => "HTTPS",
    }
);

impl Protocol {
    /// Whether health checks with this protocol carry a path and matcher.
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

/// Availability zone placement of a load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityZone {
    pub zone_name: String,
    pub subnet_id: String,
}

/// A live network load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancer {
    pub arn: String,
    pub name: String,
    pub dns_name: String,
    pub scheme: Scheme,
    pub ip_address_type: IpAddressType,
    pub availability_zones: Vec<AvailabilityZone>,
    pub created_time: Option<DateTime<Utc>>,
}

impl LoadBalancer {
    /// Subnet IDs the load balancer is attached to, sorted.
    #[must_use]
    pub fn subnet_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .availability_zones
            .iter()
            .map(|az| az.subnet_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Request body for creating a network load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub scheme: Scheme,
    pub ip_address_type: IpAddressType,
    pub subnets: Vec<String>,
    pub tags: Tags,
}

/// Health check settings of a target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub protocol: Protocol,
    /// Port number or `traffic-port`
    pub port: String,
    /// Only set for HTTP/HTTPS health checks
    pub path: Option<String>,
    pub interval_seconds: i32,
    pub healthy_threshold_count: i32,
    pub unhealthy_threshold_count: i32,
    /// HTTP success codes, only set for HTTP/HTTPS health checks
    pub matcher: Option<String>,
}

/// A live target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroup {
    pub arn: String,
    pub name: String,
    pub protocol: Protocol,
    pub port: i32,
    pub target_type: TargetType,
    pub health_check: HealthCheck,
    pub load_balancer_arns: Vec<String>,
}

/// Request body for creating a target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTargetGroupRequest {
    pub name: String,
    pub protocol: Protocol,
    pub port: i32,
    pub target_type: TargetType,
    pub health_check: HealthCheck,
    pub tags: Tags,
}

/// Request body for modifying a target group's health check in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyTargetGroupRequest {
    pub arn: String,
    pub health_check: HealthCheck,
}

/// A registered target: an instance ID or an IP address, on a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub id: String,
    pub port: i32,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

/// A listener action.
///
/// Field names follow the AWS JSON shape so static actions can be declared
/// in annotations as `{"Type":"forward","TargetGroupArn":"arn:..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Action {
    #[serde(rename = "Type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

impl Action {
    /// Forward action to a target group.
    #[must_use]
    pub fn forward(target_group_arn: impl Into<String>) -> Self {
        Self {
            action_type: ACTION_TYPE_FORWARD.to_string(),
            target_group_arn: Some(target_group_arn.into()),
            order: None,
        }
    }
}

/// Desired listener configuration, used to create or modify a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub port: i32,
    pub protocol: Protocol,
    pub default_actions: Vec<Action>,
}

/// A live listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub arn: String,
    pub load_balancer_arn: String,
    pub port: i32,
    pub protocol: Protocol,
    pub default_actions: Vec<Action>,
}

/// An EC2 subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub id: String,
    pub availability_zone: String,
    pub tags: Tags,
}
