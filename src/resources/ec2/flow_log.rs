//! VPC flow logs.

use serde_json::{json, Value};

use crate::construct::{Construct, NodeId, ResourceRef, Stack};
use crate::error::Result;
use crate::resources::iam::{PolicyStatement, Role, RoleProps, ServicePrincipal};
use crate::resources::logs::{LogGroup, LogGroupProps};
use crate::template::CfnResource;

/// Service principal of the flow log delivery service.
pub const FLOW_LOGS_PRINCIPAL: &str = "vpc-flow-logs.amazonaws.com";

/// Which traffic is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowLogTrafficType {
    #[default]
    All,
    Accept,
    Reject,
}

impl FlowLogTrafficType {
    fn as_str(&self) -> &'static str {
        match self {
            FlowLogTrafficType::All => "ALL",
            FlowLogTrafficType::Accept => "ACCEPT",
            FlowLogTrafficType::Reject => "REJECT",
        }
    }
}

/// What the flow log is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowLogResourceType {
    Vpc,
    Subnet,
}

impl FlowLogResourceType {
    fn as_str(&self) -> &'static str {
        match self {
            FlowLogResourceType::Vpc => "VPC",
            FlowLogResourceType::Subnet => "Subnet",
        }
    }
}

/// Where records are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowLogDestination {
    /// A new log group written through a new role
    #[default]
    CloudWatchLogs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowLogOptions {
    pub destination: FlowLogDestination,
    pub traffic_type: FlowLogTrafficType,
}

/// A flow log with its delivery role and log group.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowLog {
    node: NodeId,
    role: Role,
    log_group: LogGroup,
    resource: ResourceRef,
}

impl FlowLog {
    pub fn new(
        stack: &mut Stack,
        scope: impl Construct,
        id: &str,
        resource_id: Value,
        resource_type: FlowLogResourceType,
        options: FlowLogOptions,
    ) -> Result<Self> {
        let node = stack.add_construct(scope, id, "aws-cdk-lib.aws_ec2.FlowLog")?;

        let mut role = Role::new(
            stack,
            node,
            "IAMRole",
            RoleProps::new(ServicePrincipal::new(FLOW_LOGS_PRINCIPAL)),
        )?;
        let log_group = LogGroup::new(stack, node, "LogGroup", LogGroupProps::default())?;

        role.add_to_policy(
            stack,
            PolicyStatement::allow()
                .with_actions([
                    "logs:CreateLogStream",
                    "logs:DescribeLogStreams",
                    "logs:PutLogEvents",
                ])
                .with_resources([log_group.log_group_arn()]),
        )?;
        let role_arn = role.role_arn();
        role.add_to_policy(
            stack,
            PolicyStatement::allow()
                .with_actions(["iam:PassRole"])
                .with_resources([role_arn.clone()]),
        )?;

        let resource = stack.add_resource(
            node,
            "FlowLog",
            CfnResource::new("AWS::EC2::FlowLog")
                .with_property("DeliverLogsPermissionArn", role_arn)
                .with_property("LogDestinationType", json!("cloud-watch-logs"))
                .with_property("LogGroupName", log_group.log_group_name())
                .with_property("ResourceId", resource_id)
                .with_property("ResourceType", json!(resource_type.as_str()))
                .with_property("TrafficType", json!(options.traffic_type.as_str())),
        )?;

        Ok(Self {
            node,
            role,
            log_group,
            resource,
        })
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn log_group(&self) -> &LogGroup {
        &self.log_group
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }
}

impl Construct for FlowLog {
    fn node_id(&self) -> NodeId {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{App, StackProps};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flow_log_to_cloudwatch() {
        let mut app = App::new();
        let stack = app.add_stack("S", StackProps::default()).unwrap();
        let vpc = stack
            .add_resource(NodeId::ROOT, "Vpc", CfnResource::new("AWS::EC2::VPC"))
            .unwrap();
        let flow_log = FlowLog::new(
            stack,
            NodeId::ROOT,
            "cw",
            vpc.reference(),
            FlowLogResourceType::Vpc,
            FlowLogOptions::default(),
        )
        .unwrap();

        let resource = stack.resource(flow_log.resource()).unwrap();
        assert_eq!(resource.property("TrafficType"), Some(&json!("ALL")));
        assert_eq!(resource.property("ResourceType"), Some(&json!("VPC")));
        assert_eq!(resource.property("ResourceId"), Some(&json!({"Ref": "Vpc"})));

        let policy = stack
            .resource(flow_log.role().default_policy().unwrap())
            .unwrap();
        let statements = &policy.property("PolicyDocument").unwrap()["Statement"];
        assert_eq!(
            statements[0]["Action"],
            json!(["logs:CreateLogStream", "logs:DescribeLogStreams", "logs:PutLogEvents"])
        );
        assert_eq!(statements[0]["Resource"], flow_log.log_group().log_group_arn());
        assert_eq!(statements[1]["Action"], json!("iam:PassRole"));
        assert_eq!(statements[1]["Resource"], flow_log.role().role_arn());

        let paths: Vec<String> = stack
            .resources()
            .values()
            .filter_map(|r| r.path().map(String::from))
            .collect();
        assert!(paths.contains(&"S/cw/IAMRole/DefaultPolicy/Resource".to_string()));
        assert!(paths.contains(&"S/cw/FlowLog".to_string()));
    }
}
