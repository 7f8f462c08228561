//! EC2 instances.

use std::fmt;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::construct::{Construct, NodeId, ResourceRef, Stack};
use crate::error::{Error, Result};
use crate::resources::iam::{Role, RoleProps, ServicePrincipal};
use crate::resources::tags::{apply_tag, NAME_TAG};
use crate::template::CfnResource;

use super::machine_image::GenericLinuxImage;
use super::security_group::SecurityGroup;
use super::user_data::UserData;
use super::vpc::{SubnetType, Vpc};

/// Service principal for instance roles.
pub const EC2_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Instance family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceClass {
    Burstable3,
}

impl InstanceClass {
    fn prefix(&self) -> &'static str {
        match self {
            InstanceClass::Burstable3 => "t3",
        }
    }
}

/// Instance size within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSize {
    Medium,
}

impl InstanceSize {
    fn suffix(&self) -> &'static str {
        match self {
            InstanceSize::Medium => "medium",
        }
    }
}

/// An instance type such as `t3.medium`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceType(String);

impl InstanceType {
    pub fn of(class: InstanceClass, size: InstanceSize) -> Self {
        Self(format!("{}.{}", class.prefix(), size.suffix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// EBS options of a block device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EbsDeviceOptions {
    pub encrypted: Option<bool>,
    pub volume_type: Option<String>,
    pub delete_on_termination: Option<bool>,
}

/// Volume backing a block device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDeviceVolume {
    pub size_gib: u32,
    pub options: EbsDeviceOptions,
}

impl BlockDeviceVolume {
    pub fn ebs(size_gib: u32, options: EbsDeviceOptions) -> Self {
        Self { size_gib, options }
    }
}

/// A block device mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub device_name: String,
    pub volume: BlockDeviceVolume,
}

impl BlockDevice {
    fn to_json(&self) -> Value {
        let mut ebs = Map::new();
        if let Some(delete) = self.volume.options.delete_on_termination {
            ebs.insert("DeleteOnTermination".to_string(), json!(delete));
        }
        if let Some(encrypted) = self.volume.options.encrypted {
            ebs.insert("Encrypted".to_string(), json!(encrypted));
        }
        ebs.insert("VolumeSize".to_string(), json!(self.volume.size_gib));
        if let Some(ref volume_type) = self.volume.options.volume_type {
            ebs.insert("VolumeType".to_string(), json!(volume_type));
        }
        json!({ "DeviceName": self.device_name, "Ebs": ebs })
    }
}

/// Properties of an [`Instance`].
#[derive(Debug, Clone)]
pub struct InstanceProps<'a> {
    pub vpc: &'a Vpc,
    /// Defaults to the VPC's default subnets
    pub subnet_type: Option<SubnetType>,
    pub instance_type: InstanceType,
    pub machine_image: GenericLinuxImage,
    pub security_group: &'a SecurityGroup,
    /// A role is created when absent
    pub role: Option<&'a Role>,
    pub user_data: Option<UserData>,
    pub block_devices: Vec<BlockDevice>,
    pub detailed_monitoring: Option<bool>,
    pub disable_api_termination: Option<bool>,
}

impl<'a> InstanceProps<'a> {
    pub fn new(
        vpc: &'a Vpc,
        instance_type: InstanceType,
        machine_image: GenericLinuxImage,
        security_group: &'a SecurityGroup,
    ) -> Self {
        Self {
            vpc,
            subnet_type: None,
            instance_type,
            machine_image,
            security_group,
            role: None,
            user_data: None,
            block_devices: Vec::new(),
            detailed_monitoring: None,
            disable_api_termination: None,
        }
    }
}

/// An EC2 instance with its instance profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    node: NodeId,
    resource: ResourceRef,
    instance_profile: ResourceRef,
    role: ResourceRef,
    security_groups: Vec<ResourceRef>,
    user_data: UserData,
}

impl Instance {
    pub fn new(stack: &mut Stack, scope: impl Construct, id: &str, props: InstanceProps<'_>) -> Result<Self> {
        let node = stack.add_construct(scope, id, "aws-cdk-lib.aws_ec2.Instance")?;
        let path = stack.node(node)?.path.clone();

        let role = match props.role {
            Some(role) => role.resource().clone(),
            None => Role::new(stack, node, "InstanceRole", RoleProps::new(ServicePrincipal::new(EC2_PRINCIPAL)))?
                .resource()
                .clone(),
        };
        let instance_profile = stack.add_resource(
            node,
            "InstanceProfile",
            CfnResource::new("AWS::IAM::InstanceProfile").with_property("Roles", json!([role.reference()])),
        )?;

        let subnet = match props.subnet_type {
            Some(subnet_type) => props.vpc.subnets_of(subnet_type).next(),
            None => props.vpc.default_subnets().into_iter().next(),
        }
        .ok_or_else(|| Error::unsupported(&path, "the VPC has no matching subnet"))?;

        let image_id = props.machine_image.image_id(stack, node)?;
        let user_data = props.user_data.unwrap_or_else(UserData::for_linux);

        let mut resource = CfnResource::new("AWS::EC2::Instance")
            .with_property("AvailabilityZone", subnet.availability_zone.clone());
        if !props.block_devices.is_empty() {
            resource.set_property(
                "BlockDeviceMappings",
                Value::Array(props.block_devices.iter().map(BlockDevice::to_json).collect()),
            );
        }
        if let Some(disable) = props.disable_api_termination {
            resource.set_property("DisableApiTermination", json!(disable));
        }
        resource.set_property("IamInstanceProfile", instance_profile.reference());
        resource.set_property("ImageId", image_id);
        resource.set_property("InstanceType", json!(props.instance_type.as_str()));
        if let Some(monitoring) = props.detailed_monitoring {
            resource.set_property("Monitoring", json!(monitoring));
        }
        resource.set_property(
            "SecurityGroupIds",
            json!([props.security_group.security_group_id()]),
        );
        resource.set_property("SubnetId", subnet.subnet_id());
        resource.set_property("UserData", user_data.to_property());
        resource.add_dependency(role.logical_id.clone());

        let resource = stack.add_resource(node, "Resource", resource)?;
        apply_tag(stack, node, NAME_TAG, &path);
        debug!(instance = %path, instance_type = %props.instance_type, "Declared instance");

        Ok(Self {
            node,
            resource,
            instance_profile,
            role,
            security_groups: vec![props.security_group.resource().clone()],
            user_data,
        })
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn instance_profile(&self) -> &ResourceRef {
        &self.instance_profile
    }

    pub fn role(&self) -> &ResourceRef {
        &self.role
    }

    /// Attached groups; the primary group comes first.
    pub fn security_groups(&self) -> &[ResourceRef] {
        &self.security_groups
    }

    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    pub fn instance_public_dns_name(&self) -> Value {
        self.resource.get_att("PublicDnsName")
    }

    /// Append boot commands and re-render the `UserData` property.
    pub fn add_user_data<I, S>(&mut self, stack: &mut Stack, commands: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_data.add_commands(commands);
        let rendered = self.user_data.to_property();
        stack.resource_mut(&self.resource)?.set_property("UserData", rendered);
        Ok(())
    }

    /// Attach an additional security group after the primary one.
    pub fn add_security_group(&mut self, stack: &mut Stack, group: &SecurityGroup) -> Result<()> {
        if self.security_groups.contains(group.resource()) {
            return Ok(());
        }
        self.security_groups.push(group.resource().clone());
        let ids: Vec<Value> = self
            .security_groups
            .iter()
            .map(|g| g.get_att("GroupId"))
            .collect();
        stack
            .resource_mut(&self.resource)?
            .set_property("SecurityGroupIds", Value::Array(ids));
        debug!(instance = %self.resource.logical_id, group = %group.resource().logical_id, "Attached security group");
        Ok(())
    }
}

impl Construct for Instance {
    fn node_id(&self) -> NodeId {
        self.node
    }
}
