//! The workshop stack.
//!
//! One public subnet, two security groups, an execution role and a single instance
//! whose boot script installs the operator's SSH public key. Findings that are
//! acceptable for a short-lived workshop are suppressed next to the resources that
//! raise them.

use serde_json::json;
use tracing::{debug, info};

use crate::config::Settings;
use crate::construct::{App, NodeId, OutputRef, Stack, StackProps};
use crate::error::{Error, Result};
use crate::nag::{
    add_resource_suppressions, AwsSolutionsChecks, NagPackOptions, NagPackSuppression,
    SuppressionTarget,
};
use crate::resources::ec2::instance::EC2_PRINCIPAL;
use crate::resources::ec2::{
    BlockDevice, BlockDeviceVolume, EbsDeviceOptions, FlowLogOptions, GenericLinuxImage,
    Instance, InstanceClass, InstanceProps, InstanceSize, InstanceType, Peer, Port,
    SecurityGroup, SecurityGroupProps, SubnetConfiguration, UserData, Vpc, VpcProps,
};
use crate::resources::iam::{
    ManagedPolicy, PolicyDocument, PolicyStatement, Role, RoleProps, ServicePrincipal,
};
use crate::template::{intrinsics, CfnOutput};

/// Characters that would break out of the double-quoted `echo` in the boot script.
pub const FORBIDDEN_KEY_CHARS: [char; 6] = ['"', '\\', '`', '$', '\n', '\r'];

/// AMI per region.
pub const AMI_MAP: [(&str, &str); 1] = [("eu-central-1", "ami-0cee4a3eca5195216")];

/// Port the workshop application listens on.
pub const APP_PORT: u16 = 8085;

#[derive(Debug, Clone, Default)]
pub struct WorkshopStackProps {
    pub stack: StackProps,
    pub ssh_pub_key: String,
}

/// Handles to everything the workshop stack declares.
#[derive(Debug, Clone)]
pub struct WorkshopStack {
    id: String,
    vpc: Vpc,
    ssh_security_group: SecurityGroup,
    role: Role,
    app_security_group: SecurityGroup,
    instance: Instance,
    ssh_command: OutputRef,
}

/// Check that a public key can be embedded in the boot script.
pub fn validate_public_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::MissingPublicKey);
    }
    if let Some(found) = key.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
        return Err(Error::UnsafePublicKey { found });
    }
    Ok(())
}

/// The boot script line appending `key` to the default user's authorized keys.
pub fn authorized_keys_command(key: &str) -> String {
    format!("echo \"{key}\" >> /home/ubuntu/.ssh/authorized_keys")
}

impl WorkshopStack {
    /// Declare the stack on `app`. Nothing stays registered when declaration fails.
    pub fn new(app: &mut App, id: &str, props: WorkshopStackProps) -> Result<Self> {
        validate_public_key(&props.ssh_pub_key)?;

        let stack = app.add_stack(id, props.stack)?;
        match declare(stack, &props.ssh_pub_key) {
            Ok(workshop) => {
                info!(stack = %id, resources = stack.resources().len(), "Declared workshop stack");
                Ok(workshop)
            }
            Err(e) => {
                app.remove_stack(id);
                Err(e)
            }
        }
    }

    /// Construct id of the stack.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stack<'a>(&self, app: &'a App) -> Result<&'a Stack> {
        app.stack(&self.id)
    }

    pub fn vpc(&self) -> &Vpc {
        &self.vpc
    }

    pub fn ssh_security_group(&self) -> &SecurityGroup {
        &self.ssh_security_group
    }

    pub fn app_security_group(&self) -> &SecurityGroup {
        &self.app_security_group
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The `ssh-command` output.
    pub fn ssh_command(&self) -> &OutputRef {
        &self.ssh_command
    }
}

fn declare(stack: &mut Stack, ssh_pub_key: &str) -> Result<WorkshopStack> {
    let vpc = Vpc::new(
        stack,
        NodeId::ROOT,
        "workshop-vpc",
        VpcProps {
            nat_gateways: 0,
            max_azs: 1,
            subnet_configuration: vec![SubnetConfiguration {
                map_public_ip_on_launch: Some(true),
                ..SubnetConfiguration::public("workshop-public", 24)
            }],
            flow_logs: [("cw".to_string(), FlowLogOptions::default())].into_iter().collect(),
            ..VpcProps::default()
        },
    )?;

    let ssh_security_group = SecurityGroup::new(
        stack,
        NodeId::ROOT,
        "workshop-ssh-sg",
        SecurityGroupProps::new(&vpc).with_description("Workshop ssh security group"),
    )?;
    ssh_security_group.add_ingress_rule(
        stack,
        Peer::any_ipv4(),
        Port::tcp(22),
        Some("SSH from everywhere"),
    )?;
    add_resource_suppressions(
        stack,
        &ssh_security_group,
        &[NagPackSuppression::new(
            "AwsSolutions-EC23",
            "Can be open as workshop will be done in 1h.",
        )],
        false,
    )?;

    let role = Role::new(
        stack,
        NodeId::ROOT,
        "workshop-ec2-role",
        RoleProps::new(ServicePrincipal::new(EC2_PRINCIPAL))
            .with_inline_policy(
                "RetentionPolicy",
                PolicyDocument::new(vec![PolicyStatement::allow()
                    .with_actions(["logs:PutRetentionPolicy"])
                    .with_resources([json!("*")])]),
            )
            .with_managed_policy(ManagedPolicy::from_aws_managed_policy_name(
                "CloudWatchAgentServerPolicy",
            )),
    )?;
    add_resource_suppressions(
        stack,
        &role,
        &[
            NagPackSuppression::new("AwsSolutions-IAM4", "It is ok for our workshop"),
            NagPackSuppression::new("AwsSolutions-IAM5", "It is ok for our workshop")
                .applies_to(vec![SuppressionTarget::literal("Resource::*")]),
        ],
        false,
    )?;

    let app_security_group = SecurityGroup::new(
        stack,
        NodeId::ROOT,
        "workshop-app-sg",
        SecurityGroupProps::new(&vpc).with_description("Workshop app security group"),
    )?;
    app_security_group.add_ingress_rule(
        stack,
        Peer::any_ipv4(),
        Port::tcp(APP_PORT),
        Some("Our APP will be running on this port"),
    )?;
    add_resource_suppressions(
        stack,
        &app_security_group,
        &[NagPackSuppression::new(
            "AwsSolutions-EC23",
            "We need this open to access the app.",
        )],
        false,
    )?;

    let mut instance = Instance::new(
        stack,
        NodeId::ROOT,
        "workshop-ec2-instance",
        InstanceProps {
            role: Some(&role),
            user_data: Some(UserData::for_linux()),
            block_devices: vec![BlockDevice {
                device_name: "/dev/xvdh".to_string(),
                volume: BlockDeviceVolume::ebs(
                    8,
                    EbsDeviceOptions {
                        encrypted: Some(true),
                        ..EbsDeviceOptions::default()
                    },
                ),
            }],
            ..InstanceProps::new(
                &vpc,
                InstanceType::of(InstanceClass::Burstable3, InstanceSize::Medium),
                GenericLinuxImage::new(AMI_MAP),
                &app_security_group,
            )
        },
    )?;
    add_resource_suppressions(
        stack,
        &instance,
        &[
            NagPackSuppression::new(
                "AwsSolutions-EC28",
                "Basic monitoring is enough for this workshop",
            ),
            NagPackSuppression::new(
                "AwsSolutions-EC29",
                "No termination protection needed for this workshop",
            ),
        ],
        false,
    )?;
    instance.add_user_data(stack, [authorized_keys_command(ssh_pub_key)])?;
    instance.add_security_group(stack, &ssh_security_group)?;
    debug!(stack = %stack.id(), "Attached ssh security group to instance");

    let ssh_command = stack.add_output(
        NodeId::ROOT,
        "ssh-command",
        CfnOutput::new(intrinsics::join(
            "",
            vec![json!("ssh -i live ubuntu@"), instance.instance_public_dns_name()],
        )),
    )?;

    Ok(WorkshopStack {
        id: stack.id().to_string(),
        vpc,
        ssh_security_group,
        role,
        app_security_group,
        instance,
        ssh_command,
    })
}

/// Build the app: register the rule pack (unless disabled) and declare the stack once.
pub fn build_app(settings: &Settings) -> Result<(App, WorkshopStack)> {
    let config = &settings.config;
    let mut app = App::new();
    if config.nag.enabled {
        app.add_aspect(AwsSolutionsChecks::new(NagPackOptions::from(&config.nag)));
    }

    let props = WorkshopStackProps {
        stack: StackProps {
            env: Some(settings.environment.clone()),
            description: config.app.description.clone(),
            stack_name: Some(config.app.stack_name.clone()),
            bootstrap_qualifier: Some(config.app.bootstrap_qualifier.clone()),
        },
        ssh_pub_key: settings.ssh_pub_key.clone(),
    };
    let stack = WorkshopStack::new(&mut app, &config.app.stack_name, props)?;
    Ok((app, stack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample user@host";

    #[test]
    fn test_key_validation() {
        assert!(matches!(validate_public_key(""), Err(Error::MissingPublicKey)));
        assert!(matches!(validate_public_key("  \t"), Err(Error::MissingPublicKey)));
        assert!(matches!(
            validate_public_key("ssh-rsa $(reboot)"),
            Err(Error::UnsafePublicKey { found: '$' })
        ));
        assert!(validate_public_key(KEY).is_ok());
    }

    #[test]
    fn test_authorized_keys_command() {
        assert_eq!(
            authorized_keys_command(KEY),
            format!("echo \"{KEY}\" >> /home/ubuntu/.ssh/authorized_keys")
        );
    }

    #[test]
    fn test_failed_declaration_leaves_app_empty() {
        let mut app = App::new();
        let err = WorkshopStack::new(&mut app, "Workshop", WorkshopStackProps::default())
            .unwrap_err();
        assert!(matches!(err, Error::MissingPublicKey));
        assert!(app.stacks().is_empty());
    }

    #[test]
    fn test_instance_security_group_order() {
        let mut app = App::new();
        let workshop = WorkshopStack::new(
            &mut app,
            "Workshop",
            WorkshopStackProps {
                ssh_pub_key: KEY.to_string(),
                ..WorkshopStackProps::default()
            },
        )
        .unwrap();
        let groups = workshop.instance().security_groups();
        assert_eq!(groups[0], *workshop.app_security_group().resource());
        assert_eq!(groups[1], *workshop.ssh_security_group().resource());
        assert_eq!(workshop.ssh_command().logical_id, "sshcommand");
    }
}
