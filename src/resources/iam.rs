//! IAM roles and policies.

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;

use crate::construct::{Construct, NodeId, ResourceRef, Stack};
use crate::error::Result;
use crate::template::intrinsics::{join, pseudo, Pseudo};
use crate::template::CfnResource;

/// Policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// A service that can assume a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    pub fn new(service: impl Into<String>) -> Self {
        Self(service.into())
    }

    pub fn service(&self) -> &str {
        &self.0
    }

    /// Trust policy allowing this principal to assume a role.
    pub fn assume_role_policy(&self) -> Value {
        json!({
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": self.0 }
            }],
            "Version": POLICY_VERSION
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
}

impl Default for PolicyStatement {
    fn default() -> Self {
        Self {
            effect: Effect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
        }
    }
}

impl PolicyStatement {
    /// An `Allow` statement with no actions yet.
    pub fn allow() -> Self {
        Self::default()
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn with_resources<I>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.resources.extend(resources);
        self
    }

    /// Render the statement; single actions and resources collapse to a scalar.
    pub fn to_json(&self) -> Value {
        json!({
            "Action": collapse(self.actions.iter().map(|a| Value::String(a.clone())).collect()),
            "Effect": self.effect.as_str(),
            "Resource": collapse(self.resources.clone()),
        })
    }
}

fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

/// A set of policy statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { statements }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
            "Version": POLICY_VERSION
        })
    }
}

/// A managed policy attached by ARN.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedPolicy {
    arn: Value,
}

impl ManagedPolicy {
    /// An AWS managed policy, resolved against the stack's partition.
    pub fn from_aws_managed_policy_name(name: &str) -> Self {
        Self {
            arn: join(
                "",
                vec![
                    json!("arn:"),
                    pseudo(Pseudo::Partition),
                    json!(format!(":iam::aws:policy/{name}")),
                ],
            ),
        }
    }

}

/// Properties of a [`Role`].
#[derive(Debug, Clone)]
pub struct RoleProps {
    pub assumed_by: ServicePrincipal,
    pub inline_policies: IndexMap<String, PolicyDocument>,
    pub managed_policies: Vec<ManagedPolicy>,
    pub description: Option<String>,
}

impl RoleProps {
    pub fn new(assumed_by: ServicePrincipal) -> Self {
        Self {
            assumed_by,
            inline_policies: IndexMap::new(),
            managed_policies: Vec::new(),
            description: None,
        }
    }

    pub fn with_inline_policy(mut self, name: impl Into<String>, document: PolicyDocument) -> Self {
        self.inline_policies.insert(name.into(), document);
        self
    }

    pub fn with_managed_policy(mut self, policy: ManagedPolicy) -> Self {
        self.managed_policies.push(policy);
        self
    }
}

/// An IAM role.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    node: NodeId,
    resource: ResourceRef,
    default_policy: Option<ResourceRef>,
}

impl Role {
    pub fn new(stack: &mut Stack, scope: impl Construct, id: &str, props: RoleProps) -> Result<Self> {
        let node = stack.add_construct(scope, id, "aws-cdk-lib.aws_iam.Role")?;

        let mut resource = CfnResource::new("AWS::IAM::Role")
            .with_property("AssumeRolePolicyDocument", props.assumed_by.assume_role_policy());
        if let Some(description) = props.description {
            resource.set_property("Description", json!(description));
        }
        if !props.managed_policies.is_empty() {
            resource.set_property(
                "ManagedPolicyArns",
                Value::Array(props.managed_policies.iter().map(|p| p.arn.clone()).collect()),
            );
        }
        if !props.inline_policies.is_empty() {
            let policies: Vec<Value> = props
                .inline_policies
                .iter()
                .map(|(name, doc)| json!({ "PolicyDocument": doc.to_json(), "PolicyName": name }))
                .collect();
            resource.set_property("Policies", Value::Array(policies));
        }

        let resource = stack.add_resource(node, "Resource", resource)?;
        Ok(Self {
            node,
            resource,
            default_policy: None,
        })
    }

    /// The role resource.
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// The default policy resource, once a statement was added.
    pub fn default_policy(&self) -> Option<&ResourceRef> {
        self.default_policy.as_ref()
    }

    pub fn role_arn(&self) -> Value {
        self.resource.get_att("Arn")
    }

    /// `Ref` of the role (its name).
    pub fn role_name(&self) -> Value {
        self.resource.reference()
    }

    /// Add a statement to the role's default policy, creating the policy on first use.
    pub fn add_to_policy(&mut self, stack: &mut Stack, statement: PolicyStatement) -> Result<()> {
        let policy = match &self.default_policy {
            Some(policy) => policy.clone(),
            None => {
                let scope = stack.add_construct(self.node, "DefaultPolicy", "aws-cdk-lib.aws_iam.Policy")?;
                let logical_id_hint = stack.allocate_child_logical_id(scope, "Resource")?;
                let resource = CfnResource::new("AWS::IAM::Policy")
                    .with_property("PolicyDocument", PolicyDocument::default().to_json())
                    .with_property("PolicyName", json!(logical_id_hint))
                    .with_property("Roles", json!([self.role_name()]));
                let policy = stack.add_resource(scope, "Resource", resource)?;
                debug!(role = %self.resource.logical_id, policy = %policy.logical_id, "Created default policy");
                self.default_policy = Some(policy.clone());
                policy
            }
        };

        let resource = stack.resource_mut(&policy)?;
        if let Some(Value::Array(statements)) = resource
            .properties
            .get_mut("PolicyDocument")
            .and_then(|doc| doc.get_mut("Statement"))
        {
            statements.push(statement.to_json());
        }
        Ok(())
    }
}

impl Construct for Role {
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
    fn test_statement_collapses_single_values() {
        let statement = PolicyStatement::allow()
            .with_actions(["logs:PutRetentionPolicy"])
            .with_resources([json!("*")]);
        assert_eq!(
            statement.to_json(),
            json!({"Action": "logs:PutRetentionPolicy", "Effect": "Allow", "Resource": "*"})
        );
    }

    #[test]
    fn test_role_properties() {
        let mut app = App::new();
        let stack = app.add_stack("S", StackProps::default()).unwrap();
        let role = Role::new(
            stack,
            NodeId::ROOT,
            "role",
            RoleProps::new(ServicePrincipal::new("ec2.amazonaws.com"))
                .with_inline_policy(
                    "RetentionPolicy",
                    PolicyDocument::new(vec![PolicyStatement::allow()
                        .with_actions(["logs:PutRetentionPolicy"])
                        .with_resources([json!("*")])]),
                )
                .with_managed_policy(ManagedPolicy::from_aws_managed_policy_name(
                    "CloudWatchAgentServerPolicy",
                )),
        )
        .unwrap();

        let resource = stack.resource(role.resource()).unwrap();
        assert_eq!(
            resource.property("AssumeRolePolicyDocument").unwrap()["Statement"][0]["Principal"],
            json!({"Service": "ec2.amazonaws.com"})
        );
        assert_eq!(
            resource.property("Policies").unwrap()[0]["PolicyName"],
            json!("RetentionPolicy")
        );
        assert_eq!(
            resource.property("ManagedPolicyArns").unwrap()[0]["Fn::Join"][1][2],
            json!(":iam::aws:policy/CloudWatchAgentServerPolicy")
        );
    }

    #[test]
    fn test_default_policy_created_once() {
        let mut app = App::new();
        let stack = app.add_stack("S", StackProps::default()).unwrap();
        let mut role = Role::new(
            stack,
            NodeId::ROOT,
            "role",
            RoleProps::new(ServicePrincipal::new("vpc-flow-logs.amazonaws.com")),
        )
        .unwrap();
        let arn = role.role_arn();
        role.add_to_policy(stack, PolicyStatement::allow().with_actions(["logs:PutLogEvents"]).with_resources([json!("*")]))
            .unwrap();
        role.add_to_policy(stack, PolicyStatement::allow().with_actions(["iam:PassRole"]).with_resources([arn]))
            .unwrap();

        let policy = role.default_policy().unwrap();
        let resource = stack.resource(policy).unwrap();
        assert_eq!(resource.property("PolicyName"), Some(&json!(policy.logical_id)));
        assert_eq!(
            resource.property("PolicyDocument").unwrap()["Statement"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            stack.node(policy.node).unwrap().path,
            "S/role/DefaultPolicy/Resource"
        );
    }
}
