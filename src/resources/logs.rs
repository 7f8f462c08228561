//! CloudWatch Logs.

use serde_json::{json, Value};

use crate::construct::{Construct, NodeId, ResourceRef, Stack};
use crate::error::Result;
use crate::template::{CfnResource, RemovalPolicy};

/// Retention of log events, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionDays(pub u32);

impl RetentionDays {
    pub const ONE_WEEK: RetentionDays = RetentionDays(7);
    pub const ONE_MONTH: RetentionDays = RetentionDays(30);
    pub const ONE_YEAR: RetentionDays = RetentionDays(365);
    pub const TWO_YEARS: RetentionDays = RetentionDays(731);
}

/// Properties of a [`LogGroup`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogGroupProps {
    pub log_group_name: Option<String>,
    /// `None` keeps events forever
    pub retention: Option<RetentionDays>,
    pub removal_policy: RemovalPolicy,
}

impl Default for LogGroupProps {
    fn default() -> Self {
        Self {
            log_group_name: None,
            retention: Some(RetentionDays::TWO_YEARS),
            removal_policy: RemovalPolicy::Retain,
        }
    }
}

/// A CloudWatch log group.
#[derive(Debug, Clone, PartialEq)]
pub struct LogGroup {
    node: NodeId,
    resource: ResourceRef,
}

impl LogGroup {
    pub fn new(stack: &mut Stack, scope: impl Construct, id: &str, props: LogGroupProps) -> Result<Self> {
        let node = stack.add_construct(scope, id, "aws-cdk-lib.aws_logs.LogGroup")?;

        let mut resource = CfnResource::new("AWS::Logs::LogGroup").with_removal_policy(props.removal_policy);
        if let Some(name) = props.log_group_name {
            resource.set_property("LogGroupName", json!(name));
        }
        if let Some(RetentionDays(days)) = props.retention {
            resource.set_property("RetentionInDays", json!(days));
        }

        let resource = stack.add_resource(node, "Resource", resource)?;
        Ok(Self { node, resource })
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn log_group_arn(&self) -> Value {
        self.resource.get_att("Arn")
    }

    pub fn log_group_name(&self) -> Value {
        self.resource.reference()
    }
}

impl Construct for LogGroup {
    fn node_id(&self) -> NodeId {
        self.node
    }
}
