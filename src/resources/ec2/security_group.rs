//! Security groups.
//!
//! Rules are rendered inline on the group (`SecurityGroupIngress` /
//! `SecurityGroupEgress`), which is what the policy checks inspect.

use std::fmt;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::construct::{Construct, NodeId, ResourceRef, Stack};
use crate::error::{Error, Result};
use crate::template::CfnResource;

use super::vpc::Vpc;

/// Egress rule description used when all outbound traffic is allowed.
pub const ALLOW_ALL_OUTBOUND_DESCRIPTION: &str = "Allow all outbound traffic by default";

/// Source of an inbound rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// An IPv4 CIDR block
    Ipv4(String),
}

impl Peer {
    /// `0.0.0.0/0`
    pub fn any_ipv4() -> Self {
        Peer::Ipv4("0.0.0.0/0".to_string())
    }

    fn insert_into(&self, rule: &mut Map<String, Value>) {
        match self {
            Peer::Ipv4(cidr) => rule.insert("CidrIp".to_string(), json!(cidr)),
        };
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Ipv4(cidr) => write!(f, "{cidr}"),
        }
    }
}

/// IP protocol of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

/// Protocol and port of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
}

impl Port {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from_port: port,
            to_port: port,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let protocol = self.protocol.as_str().to_uppercase();
        if self.from_port == self.to_port {
            write!(f, "{} {}", protocol, self.from_port)
        } else {
            write!(f, "{} {}-{}", protocol, self.from_port, self.to_port)
        }
    }
}

fn rule_json(peer: &Peer, port: &Port, description: &str) -> Value {
    let mut rule = Map::new();
    peer.insert_into(&mut rule);
    rule.insert("Description".to_string(), json!(description));
    rule.insert("FromPort".to_string(), json!(port.from_port));
    rule.insert("IpProtocol".to_string(), json!(port.protocol.as_str()));
    rule.insert("ToPort".to_string(), json!(port.to_port));
    Value::Object(rule)
}

/// Properties of a [`SecurityGroup`].
#[derive(Debug, Clone)]
pub struct SecurityGroupProps<'a> {
    pub vpc: &'a Vpc,
    /// Defaults to the construct path
    pub description: Option<String>,
}

impl<'a> SecurityGroupProps<'a> {
    pub fn new(vpc: &'a Vpc) -> Self {
        Self {
            vpc,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A security group bound to a VPC. All outbound traffic is allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroup {
    node: NodeId,
    resource: ResourceRef,
}

impl SecurityGroup {
    pub fn new(
        stack: &mut Stack,
        scope: impl Construct,
        id: &str,
        props: SecurityGroupProps<'_>,
    ) -> Result<Self> {
        let node = stack.add_construct(scope, id, "aws-cdk-lib.aws_ec2.SecurityGroup")?;
        let description = match props.description {
            Some(description) => description,
            None => stack.node(node)?.path.clone(),
        };

        let egress = json!([{
            "CidrIp": "0.0.0.0/0",
            "Description": ALLOW_ALL_OUTBOUND_DESCRIPTION,
            "IpProtocol": "-1"
        }]);

        let resource = CfnResource::new("AWS::EC2::SecurityGroup")
            .with_property("GroupDescription", json!(description))
            .with_property("SecurityGroupEgress", egress)
            .with_property("VpcId", props.vpc.vpc_id());
        let resource = stack.add_resource(node, "Resource", resource)?;

        Ok(Self { node, resource })
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// `Fn::GetAtt GroupId`
    pub fn security_group_id(&self) -> Value {
        self.resource.get_att("GroupId")
    }

    /// Add an inbound rule.
    pub fn add_ingress_rule(
        &self,
        stack: &mut Stack,
        peer: Peer,
        port: Port,
        description: Option<&str>,
    ) -> Result<()> {
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("from {peer}:{port}"));
        self.push_rule(stack, "SecurityGroupIngress", rule_json(&peer, &port, &description))?;
        debug!(group = %self.resource.logical_id, %peer, %port, "Added ingress rule");
        Ok(())
    }

    fn push_rule(&self, stack: &mut Stack, key: &str, rule: Value) -> Result<()> {
        let path = stack.node(self.node)?.path.clone();
        let resource = stack.resource_mut(&self.resource)?;
        let rules = resource
            .properties
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
        match rules {
            Value::Array(items) => {
                if !items.contains(&rule) {
                    items.push(rule);
                }
                Ok(())
            }
            _ => Err(Error::unsupported(path, format!("{key} is not a list"))),
        }
    }
}

impl Construct for SecurityGroup {
    fn node_id(&self) -> NodeId {
        self.node
    }
}
