//! AwsSolutions rules
//!
//! Each rule inspects one template resource at a time. Rules that report several
//! independent problems on a single resource (IAM4, IAM5) return granular findings
//! so that suppressions can acknowledge them one by one.

use serde_json::Value;

use super::{NagMessageLevel, NagRuleCompliance};
use crate::construct::Stack;
use crate::template::intrinsics::stringify;
use crate::template::CfnResource;

/// What a rule sees of the resource under evaluation
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub stack: &'a Stack,
    pub logical_id: &'a str,
    pub resource: &'a CfnResource,
}

/// Trait for implementing rules
pub trait NagRule: Send + Sync {
    /// Rule id without the pack prefix (e.g. "EC23")
    fn id(&self) -> &str;

    /// One-line summary of the problem
    fn info(&self) -> &str;

    /// Why the problem matters
    fn explanation(&self) -> &str;

    fn level(&self) -> NagMessageLevel;

    /// Evaluate the rule on one resource
    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance;
}

/// All rules of the AwsSolutions pack covered by this crate.
pub fn aws_solutions_rules() -> Vec<Box<dyn NagRule>> {
    vec![
        Box::new(Ec23),
        Box::new(Ec26),
        Box::new(Ec27),
        Box::new(Ec28),
        Box::new(Ec29),
        Box::new(Iam4),
        Box::new(Iam5),
        Box::new(Vpc7),
    ]
}

fn is_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

/// Security groups must not allow inbound access from anywhere.
pub struct Ec23;

impl NagRule for Ec23 {
    fn id(&self) -> &str {
        "EC23"
    }

    fn info(&self) -> &str {
        "The Security Group allows for 0.0.0.0/0 or ::/0 inbound access."
    }

    fn explanation(&self) -> &str {
        "Large port ranges, when open, expose instances to unwanted attacks. More than that, they make traceability of vulnerabilities very difficult. For instance, your web servers may only require 80 and 443 ports to be open, but not all. One of the most common mistakes observed is when all ports for 0.0.0.0/0 range are open in a rush to access the instance. EC2 instances must expose only to those ports enabled on the corresponding security group level."
    }

    fn level(&self) -> NagMessageLevel {
        NagMessageLevel::Error
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance {
        let open = |cidr: Option<&Value>, cidr_v6: Option<&Value>| {
            cidr.and_then(Value::as_str) == Some("0.0.0.0/0")
                || cidr_v6.and_then(Value::as_str) == Some("::/0")
        };

        let resource = context.resource;
        let violates = if resource.is_type("AWS::EC2::SecurityGroup") {
            as_list(resource.property("SecurityGroupIngress"))
                .into_iter()
                .any(|rule| open(rule.get("CidrIp"), rule.get("CidrIpv6")))
        } else if resource.is_type("AWS::EC2::SecurityGroupIngress") {
            open(resource.property("CidrIp"), resource.property("CidrIpv6"))
        } else {
            return NagRuleCompliance::NotApplicable;
        };

        if violates {
            NagRuleCompliance::NonCompliant
        } else {
            NagRuleCompliance::Compliant
        }
    }
}

/// EBS volumes must be encrypted.
pub struct Ec26;

impl NagRule for Ec26 {
    fn id(&self) -> &str {
        "EC26"
    }

    fn info(&self) -> &str {
        "The resource creates one or more EBS volumes that have encryption disabled."
    }

    fn explanation(&self) -> &str {
        "With EBS encryption, you aren't required to build, maintain, and secure your own key management infrastructure. EBS encryption uses KMS keys when creating encrypted volumes and snapshots. This helps protect data at rest."
    }

    fn level(&self) -> NagMessageLevel {
        NagMessageLevel::Error
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance {
        let resource = context.resource;
        if resource.is_type("AWS::EC2::Volume") {
            return if is_true(resource.property("Encrypted")) {
                NagRuleCompliance::Compliant
            } else {
                NagRuleCompliance::NonCompliant
            };
        }
        if !resource.is_type("AWS::EC2::Instance") {
            return NagRuleCompliance::NotApplicable;
        }

        let unencrypted = as_list(resource.property("BlockDeviceMappings"))
            .into_iter()
            .filter_map(|mapping| mapping.get("Ebs"))
            .any(|ebs| !is_true(ebs.get("Encrypted")));
        if unencrypted {
            NagRuleCompliance::NonCompliant
        } else {
            NagRuleCompliance::Compliant
        }
    }
}

/// Security groups need a description.
pub struct Ec27;

impl NagRule for Ec27 {
    fn id(&self) -> &str {
        "EC27"
    }

    fn info(&self) -> &str {
        "The Security Group does not have a description."
    }

    fn explanation(&self) -> &str {
        "Descriptions help simplify operations and remove any opportunities for operator errors."
    }

    fn level(&self) -> NagMessageLevel {
        NagMessageLevel::Error
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance {
        if !context.resource.is_type("AWS::EC2::SecurityGroup") {
            return NagRuleCompliance::NotApplicable;
        }
        let description = context
            .resource
            .property("GroupDescription")
            .map(stringify)
            .unwrap_or_default();
        if description.chars().count() < 2 {
            NagRuleCompliance::NonCompliant
        } else {
            NagRuleCompliance::Compliant
        }
    }
}

/// Instances need detailed monitoring.
pub struct Ec28;

impl NagRule for Ec28 {
    fn id(&self) -> &str {
        "EC28"
    }

    fn info(&self) -> &str {
        "The EC2 instance/AutoScaling launch configuration does not have detailed monitoring enabled."
    }

    fn explanation(&self) -> &str {
        "Monitoring data helps make better decisions on architecting and managing compute resources."
    }

    fn level(&self) -> NagMessageLevel {
        NagMessageLevel::Error
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance {
        if !context.resource.is_type("AWS::EC2::Instance") {
            return NagRuleCompliance::NotApplicable;
        }
        if is_true(context.resource.property("Monitoring")) {
            NagRuleCompliance::Compliant
        } else {
            NagRuleCompliance::NonCompliant
        }
    }
}

/// Standalone instances need termination protection.
pub struct Ec29;

impl NagRule for Ec29 {
    fn id(&self) -> &str {
        "EC29"
    }

    fn info(&self) -> &str {
        "The EC2 instance is not part of an ASG and has Termination Protection disabled."
    }

    fn explanation(&self) -> &str {
        "Termination Protection safety feature enabled in order to protect the instances from being accidentally terminated."
    }

    fn level(&self) -> NagMessageLevel {
        NagMessageLevel::Error
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance {
        if !context.resource.is_type("AWS::EC2::Instance") {
            return NagRuleCompliance::NotApplicable;
        }
        if is_true(context.resource.property("DisableApiTermination")) {
            NagRuleCompliance::Compliant
        } else {
            NagRuleCompliance::NonCompliant
        }
    }
}

/// IAM identities must not attach AWS managed policies.
pub struct Iam4;

impl NagRule for Iam4 {
    fn id(&self) -> &str {
        "IAM4"
    }

    fn info(&self) -> &str {
        "The IAM user, role, or group uses AWS managed policies."
    }

    fn explanation(&self) -> &str {
        "An AWS managed policy is a standalone policy that is created and administered by AWS. Currently, many AWS managed policies do not restrict resource scope. Replace AWS managed policies with system specific (customer) managed policies. This is a granular rule that returns individual findings that can be suppressed with 'appliesTo'. The findings are in the format 'Policy::<policy>' for AWS managed policies. Example: appliesTo: ['Policy::arn:<AWS::Partition>:iam::aws:policy/foo']"
    }

    fn level(&self) -> NagMessageLevel {
        NagMessageLevel::Error
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance {
        let resource = context.resource;
        if !["AWS::IAM::Role", "AWS::IAM::User", "AWS::IAM::Group"]
            .iter()
            .any(|t| resource.is_type(t))
        {
            return NagRuleCompliance::NotApplicable;
        }

        let mut findings = Vec::new();
        for arn in as_list(resource.property("ManagedPolicyArns")) {
            let arn = stringify(arn);
            if arn.contains(":iam::aws:policy/") {
                let finding = format!("Policy::{arn}");
                if !findings.contains(&finding) {
                    findings.push(finding);
                }
            }
        }
        if findings.is_empty() {
            NagRuleCompliance::Compliant
        } else {
            NagRuleCompliance::NonCompliantFindings(findings)
        }
    }
}

/// IAM policies must not grant wildcard permissions.
pub struct Iam5;

impl Iam5 {
    fn documents<'a>(resource: &'a CfnResource) -> Vec<&'a Value> {
        if resource.is_type("AWS::IAM::Policy") || resource.is_type("AWS::IAM::ManagedPolicy") {
            return resource.property("PolicyDocument").into_iter().collect();
        }
        as_list(resource.property("Policies"))
            .into_iter()
            .filter_map(|policy| policy.get("PolicyDocument"))
            .collect()
    }
}

impl NagRule for Iam5 {
    fn id(&self) -> &str {
        "IAM5"
    }

    fn info(&self) -> &str {
        "The IAM entity contains wildcard permissions and does not have a cdk-nag rule suppression with evidence for those permission."
    }

    fn explanation(&self) -> &str {
        "Metadata explaining the evidence (e.g. via supporting links) for wildcard permissions allows for transparency to operators. This is a granular rule that returns individual findings that can be suppressed with 'appliesTo'. The findings are in the format 'Action::<action>' for policy actions and 'Resource::<resource>' for resources. Example: appliesTo: ['Action::s3:*']."
    }

    fn level(&self) -> NagMessageLevel {
        NagMessageLevel::Error
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance {
        let resource = context.resource;
        if ![
            "AWS::IAM::Role",
            "AWS::IAM::User",
            "AWS::IAM::Group",
            "AWS::IAM::Policy",
            "AWS::IAM::ManagedPolicy",
        ]
        .iter()
        .any(|t| resource.is_type(t))
        {
            return NagRuleCompliance::NotApplicable;
        }

        let mut findings: Vec<String> = Vec::new();
        let mut push = |finding: String| {
            if !findings.contains(&finding) {
                findings.push(finding);
            }
        };
        for document in Self::documents(resource) {
            for statement in as_list(document.get("Statement")) {
                if statement.get("Effect").and_then(Value::as_str) != Some("Allow") {
                    continue;
                }
                for action in as_list(statement.get("Action")) {
                    let action = stringify(action);
                    if action.contains('*') {
                        push(format!("Action::{action}"));
                    }
                }
                for target in as_list(statement.get("Resource")) {
                    let target = stringify(target);
                    if target.contains('*') {
                        push(format!("Resource::{target}"));
                    }
                }
            }
        }
        if findings.is_empty() {
            NagRuleCompliance::Compliant
        } else {
            NagRuleCompliance::NonCompliantFindings(findings)
        }
    }
}

/// VPCs need a flow log.
pub struct Vpc7;

impl NagRule for Vpc7 {
    fn id(&self) -> &str {
        "VPC7"
    }

    fn info(&self) -> &str {
        "The VPC does not have an associated Flow Log."
    }

    fn explanation(&self) -> &str {
        "VPC Flow Logs capture network flow information for a VPC, subnet, or network interface and stores it in Amazon CloudWatch Logs. Flow log data can help customers troubleshoot network issues; for example, to diagnose why specific traffic is not reaching an instance, which might be a result of overly restrictive security group rules."
    }

    fn level(&self) -> NagMessageLevel {
        NagMessageLevel::Error
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> NagRuleCompliance {
        if !context.resource.is_type("AWS::EC2::VPC") {
            return NagRuleCompliance::NotApplicable;
        }
        let logged = context
            .stack
            .resources()
            .values()
            .filter(|r| r.is_type("AWS::EC2::FlowLog"))
            .filter_map(|r| r.property("ResourceId"))
            .any(|id| id.get("Ref").and_then(Value::as_str) == Some(context.logical_id));
        if logged {
            NagRuleCompliance::Compliant
        } else {
            NagRuleCompliance::NonCompliant
        }
    }
}
