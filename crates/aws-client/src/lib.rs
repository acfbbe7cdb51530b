//! AWS ELBv2 / EC2 Client
//!
//! A thin, mockable client over the AWS SDK for the operations a network load
//! balancer controller needs: load balancers, target groups, targets,
//! listeners, tags, attributes and subnet discovery.
//!
//! # Example
//!
//! ```no_run
//! use aws_client::{AwsClient, AwsClientTrait};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AwsClient::new(
//!     "my-cluster".to_string(),
//!     "vpc-0123456789abcdef0".to_string(),
//!     Duration::from_secs(30),
//! )
//! .await;
//!
//! if let Some(lb) = client.get_load_balancer_by_name("nlb-defaultfoo-3d0b").await? {
//!     println!("{} -> {}", lb.arn, lb.dns_name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Deadlines**: every call is bounded by a per-client timeout
//! - **Request accounting**: an optional [`ApiObserver`] sees every call outcome
//! - **Mocking**: `MockAwsClient` behind the `test-util` feature

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod aws_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::AwsClient;
pub use common::{ApiObserver, CallOutcome, CallPolicy};
pub use error::AwsError;
pub use models::*;
pub use aws_trait::AwsClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockAwsClient;
