//! AWS cloud client for skyfleet
//!
//! Implements [`skyfleet_cloud::CloudClient`] on top of the EC2 API through
//! `aws-sdk-ec2`. Responses are converted into
//! [`skyfleet_cloud::ObservedResource`] values.
//!
//! # Requirements
//!
//! Credentials and region come from the usual AWS configuration chain
//! (`AWS_PROFILE`, `AWS_REGION`, `~/.aws/config`, instance metadata).
//!
//! # Example
//!
//! ```ignore
//! use skyfleet_cloud::{CloudClient, Query, ResourceKind};
//! use skyfleet_cloud_aws::AwsClient;
//!
//! let client = AwsClient::from_env(Some("us-east-1".to_string())).await;
//! let vpcs = client.describe(&Query::by_name(ResourceKind::Vpc, "sample_network")).await?;
//! ```

pub mod client;
pub mod convert;
pub mod error;

pub use client::AwsClient;
pub use error::{AwsError, Result};
