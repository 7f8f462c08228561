//! VPC with subnets, internet gateway and routing.

use std::net::Ipv4Addr;

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;

use crate::construct::{Construct, NodeId, ResourceRef, Stack};
use crate::error::{Error, Result};
use crate::resources::tags::{apply_tag, Tag, NAME_TAG};
use crate::template::intrinsics::{get_azs, select};
use crate::template::CfnResource;

use super::flow_log::{FlowLog, FlowLogOptions, FlowLogResourceType};

const SUBNET_NAME_TAG: &str = "aws-cdk:subnet-name";
const SUBNET_TYPE_TAG: &str = "aws-cdk:subnet-type";

/// Kind of subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetType {
    /// Routed to the internet gateway
    Public,
    /// No route out of the VPC
    PrivateIsolated,
}

impl SubnetType {
    fn tag_value(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::PrivateIsolated => "Isolated",
        }
    }
}

/// One subnet group, created once per availability zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetConfiguration {
    pub name: String,
    pub subnet_type: SubnetType,
    pub cidr_mask: u8,
    /// Defaults to true for public subnets
    pub map_public_ip_on_launch: Option<bool>,
}

impl SubnetConfiguration {
    pub fn public(name: impl Into<String>, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            subnet_type: SubnetType::Public,
            cidr_mask,
            map_public_ip_on_launch: None,
        }
    }

    pub fn isolated(name: impl Into<String>, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            subnet_type: SubnetType::PrivateIsolated,
            cidr_mask,
            map_public_ip_on_launch: None,
        }
    }
}

/// Properties of a [`Vpc`].
#[derive(Debug, Clone, PartialEq)]
pub struct VpcProps {
    pub cidr: String,
    pub max_azs: usize,
    pub nat_gateways: usize,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    pub subnet_configuration: Vec<SubnetConfiguration>,
    /// Flow logs keyed by construct id
    pub flow_logs: IndexMap<String, FlowLogOptions>,
}

impl Default for VpcProps {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 1,
            nat_gateways: 0,
            enable_dns_hostnames: true,
            enable_dns_support: true,
            subnet_configuration: vec![SubnetConfiguration::public("Public", 24)],
            flow_logs: IndexMap::new(),
        }
    }
}

/// A subnet and its route table.
#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    node: NodeId,
    pub name: String,
    pub subnet_type: SubnetType,
    pub cidr: String,
    pub availability_zone: Value,
    resource: ResourceRef,
    route_table: ResourceRef,
}

impl Subnet {
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn route_table(&self) -> &ResourceRef {
        &self.route_table
    }

    pub fn subnet_id(&self) -> Value {
        self.resource.reference()
    }
}

impl Construct for Subnet {
    fn node_id(&self) -> NodeId {
        self.node
    }
}

/// A VPC.
#[derive(Debug, Clone, PartialEq)]
pub struct Vpc {
    node: NodeId,
    resource: ResourceRef,
    subnets: Vec<Subnet>,
    internet_gateway: Option<ResourceRef>,
    gateway_attachment: Option<ResourceRef>,
    flow_logs: Vec<FlowLog>,
}

impl Vpc {
    pub fn new(stack: &mut Stack, scope: impl Construct, id: &str, props: VpcProps) -> Result<Self> {
        let node = stack.add_construct(scope, id, "aws-cdk-lib.aws_ec2.Vpc")?;
        let path = stack.node(node)?.path.clone();

        if props.nat_gateways > 0 {
            return Err(Error::unsupported(path, "NAT gateways are not supported"));
        }
        if props.max_azs == 0 {
            return Err(Error::unsupported(path, "max_azs must be at least 1"));
        }
        if props.subnet_configuration.is_empty() {
            return Err(Error::unsupported(path, "at least one subnet configuration is required"));
        }

        let resource = stack.add_resource(
            node,
            "Resource",
            CfnResource::new("AWS::EC2::VPC")
                .with_property("CidrBlock", json!(props.cidr))
                .with_property("EnableDnsHostnames", json!(props.enable_dns_hostnames))
                .with_property("EnableDnsSupport", json!(props.enable_dns_support))
                .with_property("InstanceTenancy", json!("default")),
        )?;

        let mut allocator = CidrAllocator::new(&props.cidr).map_err(|m| Error::unsupported(&path, m))?;
        let mut subnets = Vec::new();
        for config in &props.subnet_configuration {
            for az_index in 0..props.max_azs {
                let cidr = allocator
                    .allocate(config.cidr_mask)
                    .map_err(|m| Error::unsupported(&path, m))?;
                subnets.push(create_subnet(stack, node, &resource, config, az_index, cidr)?);
            }
        }

        let mut vpc = Self {
            node,
            resource,
            subnets,
            internet_gateway: None,
            gateway_attachment: None,
            flow_logs: Vec::new(),
        };

        if vpc.subnets.iter().any(|s| s.subnet_type == SubnetType::Public) {
            vpc.add_internet_gateway(stack)?;
        }

        for (flow_log_id, options) in props.flow_logs {
            let resource_id = vpc.resource.reference();
            let flow_log = FlowLog::new(
                stack,
                vpc.node,
                &flow_log_id,
                resource_id,
                FlowLogResourceType::Vpc,
                options,
            )?;
            vpc.flow_logs.push(flow_log);
        }

        apply_tag(stack, node, NAME_TAG, &path);
        debug!(vpc = %path, subnets = vpc.subnets.len(), "Declared VPC");
        Ok(vpc)
    }

    fn add_internet_gateway(&mut self, stack: &mut Stack) -> Result<()> {
        let igw = stack.add_resource(self.node, "IGW", CfnResource::new("AWS::EC2::InternetGateway"))?;
        let attachment = stack.add_resource(
            self.node,
            "VPCGW",
            CfnResource::new("AWS::EC2::VPCGatewayAttachment")
                .with_property("InternetGatewayId", igw.reference())
                .with_property("VpcId", self.resource.reference()),
        )?;

        for subnet in self.subnets.iter().filter(|s| s.subnet_type == SubnetType::Public) {
            stack.add_resource(
                subnet.node,
                "DefaultRoute",
                CfnResource::new("AWS::EC2::Route")
                    .with_property("DestinationCidrBlock", json!("0.0.0.0/0"))
                    .with_property("GatewayId", igw.reference())
                    .with_property("RouteTableId", subnet.route_table.reference())
                    .with_dependency(attachment.logical_id.clone()),
            )?;
        }

        self.internet_gateway = Some(igw);
        self.gateway_attachment = Some(attachment);
        Ok(())
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// `Ref` of the VPC.
    pub fn vpc_id(&self) -> Value {
        self.resource.reference()
    }

    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    pub fn public_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets_of(SubnetType::Public)
    }

    pub fn subnets_of(&self, subnet_type: SubnetType) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(move |s| s.subnet_type == subnet_type)
    }

    /// Subnets used when no selection is given: isolated ones if any, else public.
    pub fn default_subnets(&self) -> Vec<&Subnet> {
        let isolated: Vec<&Subnet> = self.subnets_of(SubnetType::PrivateIsolated).collect();
        if isolated.is_empty() {
            self.public_subnets().collect()
        } else {
            isolated
        }
    }

    pub fn internet_gateway(&self) -> Option<&ResourceRef> {
        self.internet_gateway.as_ref()
    }

    pub fn flow_logs(&self) -> &[FlowLog] {
        &self.flow_logs
    }
}

impl Construct for Vpc {
    fn node_id(&self) -> NodeId {
        self.node
    }
}

fn create_subnet(
    stack: &mut Stack,
    vpc_node: NodeId,
    vpc: &ResourceRef,
    config: &SubnetConfiguration,
    az_index: usize,
    cidr: String,
) -> Result<Subnet> {
    let id = format!("{}Subnet{}", config.name, az_index + 1);
    let node = stack.add_construct(vpc_node, &id, "aws-cdk-lib.aws_ec2.Subnet")?;
    let path = stack.node(node)?.path.clone();
    let availability_zone = select(az_index, get_azs(""));
    let map_public_ip = config
        .map_public_ip_on_launch
        .unwrap_or(config.subnet_type == SubnetType::Public);

    let resource = stack.add_resource(
        node,
        "Subnet",
        CfnResource::new("AWS::EC2::Subnet")
            .with_property("AvailabilityZone", availability_zone.clone())
            .with_property("CidrBlock", json!(cidr))
            .with_property("MapPublicIpOnLaunch", json!(map_public_ip))
            .with_property(
                "Tags",
                json!([
                    Tag::new(SUBNET_NAME_TAG, &config.name).to_json(),
                    Tag::new(SUBNET_TYPE_TAG, config.subnet_type.tag_value()).to_json(),
                ]),
            )
            .with_property("VpcId", vpc.reference()),
    )?;
    let route_table = stack.add_resource(
        node,
        "RouteTable",
        CfnResource::new("AWS::EC2::RouteTable").with_property("VpcId", vpc.reference()),
    )?;
    stack.add_resource(
        node,
        "RouteTableAssociation",
        CfnResource::new("AWS::EC2::SubnetRouteTableAssociation")
            .with_property("RouteTableId", route_table.reference())
            .with_property("SubnetId", resource.reference()),
    )?;
    apply_tag(stack, node, NAME_TAG, &path);

    Ok(Subnet {
        node,
        name: config.name.clone(),
        subnet_type: config.subnet_type,
        cidr,
        availability_zone,
        resource,
        route_table,
    })
}

/// Hands out consecutive, aligned blocks of a network.
#[derive(Debug)]
struct CidrAllocator {
    network: u32,
    prefix: u8,
    next: u64,
}

impl CidrAllocator {
    fn new(cidr: &str) -> std::result::Result<Self, String> {
        let (addr, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR '{cidr}'"))?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| format!("invalid CIDR '{cidr}'"))?;
        let prefix: u8 = prefix.parse().map_err(|_| format!("invalid CIDR '{cidr}'"))?;
        if prefix > 32 {
            return Err(format!("invalid CIDR '{cidr}'"));
        }
        let network = u32::from(addr) & mask(prefix);
        Ok(Self {
            network,
            prefix,
            next: u64::from(network),
        })
    }

    fn allocate(&mut self, cidr_mask: u8) -> std::result::Result<String, String> {
        if cidr_mask < self.prefix || cidr_mask > 28 {
            return Err(format!(
                "subnet mask /{cidr_mask} does not fit in a /{} network",
                self.prefix
            ));
        }
        let size = 1u64 << (32 - cidr_mask);
        let start = self.next.div_ceil(size) * size;
        let end = u64::from(self.network) + (1u64 << (32 - self.prefix));
        if start + size > end {
            return Err(format!("no room left for a /{cidr_mask} subnet"));
        }
        self.next = start + size;
        // start < end <= 2^32, so the cast is lossless.
        Ok(format!("{}/{}", Ipv4Addr::from(start as u32), cidr_mask))
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}
