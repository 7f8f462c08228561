//! Typed resource constructs.
//!
//! Each construct adds a grouping node to the stack and one or more raw resources
//! under it, then hands back a handle that later declarations take instead of
//! logical-id strings.
//!
//! - [`ec2`]: VPC with subnets and flow logs, security groups, instances
//! - [`iam`]: roles, policy documents, managed policies
//! - [`logs`]: CloudWatch log groups

pub mod ec2;
pub mod iam;
pub mod logs;
pub mod tags;

pub use tags::{apply_tag, Tag, NAME_TAG};
