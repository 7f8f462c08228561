//! Rule suppressions.
//!
//! Suppressions live in template metadata under `cdk_nag.rules_to_suppress`, either
//! on a resource or on the template itself (stack-wide). A suppression without
//! `applies_to` silences every finding of its rule; with `applies_to` it only
//! silences the listed granular findings.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::construct::{Construct, NodeKind, Stack};
use crate::error::{Error, Result};
use crate::template::CfnResource;

/// Metadata key holding suppressions.
pub const METADATA_KEY: &str = "cdk_nag";
/// Field inside [`METADATA_KEY`] listing the suppressions.
pub const RULES_KEY: &str = "rules_to_suppress";
/// Minimum length of a suppression reason.
pub const MIN_REASON_LEN: usize = 10;

/// A granular finding selector: an exact string or a `/pattern/flags` regex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuppressionTarget {
    Literal(String),
    Regex { regex: String },
}

impl SuppressionTarget {
    pub fn literal(value: impl Into<String>) -> Self {
        SuppressionTarget::Literal(value.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        SuppressionTarget::Regex {
            regex: pattern.into(),
        }
    }

    /// True if the finding is selected.
    pub fn matches(&self, finding: &str) -> Result<bool> {
        match self {
            SuppressionTarget::Literal(value) => Ok(value == finding),
            SuppressionTarget::Regex { regex } => {
                let (pattern, flags) = split_regex(regex)?;
                let compiled = RegexBuilder::new(pattern)
                    .case_insensitive(flags.contains('i'))
                    .multi_line(flags.contains('m'))
                    .dot_matches_new_line(flags.contains('s'))
                    .build()?;
                Ok(compiled.is_match(finding))
            }
        }
    }
}

fn split_regex(raw: &str) -> Result<(&str, &str)> {
    let body = raw.strip_prefix('/');
    let end = raw.rfind('/');
    match (body, end) {
        (Some(_), Some(end)) if end > 0 => Ok((&raw[1..end], &raw[end + 1..])),
        _ => Err(Error::invalid_suppression(
            raw,
            "regex must be written as /pattern/flags",
        )),
    }
}

/// A suppression record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NagPackSuppression {
    /// Full rule id, e.g. `AwsSolutions-EC23`
    pub id: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<Vec<SuppressionTarget>>,
}

impl NagPackSuppression {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
            applies_to: None,
        }
    }

    pub fn applies_to(mut self, targets: Vec<SuppressionTarget>) -> Self {
        self.applies_to = Some(targets);
        self
    }

    fn validate(&self, path: &str) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_suppression(path, "suppression id is empty"));
        }
        if self.reason.trim().chars().count() < MIN_REASON_LEN {
            return Err(Error::invalid_suppression(
                path,
                format!(
                    "{}: the reason must be at least {MIN_REASON_LEN} characters long",
                    self.id
                ),
            ));
        }
        if let Some(targets) = &self.applies_to {
            for target in targets {
                if let SuppressionTarget::Regex { regex } = target {
                    split_regex(regex)?;
                }
            }
        }
        Ok(())
    }

    /// True if this suppression silences `finding` of `rule_id`.
    ///
    /// `finding` is empty for rules that do not report granular findings; such
    /// rules are only silenced by suppressions without `applies_to`.
    pub fn applies(&self, rule_id: &str, finding: &str) -> Result<bool> {
        if self.id != rule_id {
            return Ok(false);
        }
        let Some(targets) = &self.applies_to else {
            return Ok(true);
        };
        if finding.is_empty() {
            return Ok(false);
        }
        for target in targets {
            if target.matches(finding)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Merge `new` into `existing`; same-id records combine their targets.
fn merge(existing: &mut Vec<NagPackSuppression>, new: &[NagPackSuppression]) {
    for suppression in new {
        match existing.iter_mut().find(|s| s.id == suppression.id) {
            Some(current) => {
                current.reason = suppression.reason.clone();
                current.applies_to = match (current.applies_to.take(), &suppression.applies_to) {
                    (Some(mut targets), Some(more)) => {
                        for target in more {
                            if !targets.contains(target) {
                                targets.push(target.clone());
                            }
                        }
                        Some(targets)
                    }
                    _ => None,
                };
            }
            None => existing.push(suppression.clone()),
        }
    }
}

fn read(metadata_value: Option<&Value>) -> Result<Vec<NagPackSuppression>> {
    match metadata_value.and_then(|m| m.get(RULES_KEY)) {
        Some(rules) => Ok(serde_json::from_value(rules.clone())?),
        None => Ok(Vec::new()),
    }
}

fn write(suppressions: &[NagPackSuppression]) -> Result<Value> {
    Ok(json!({ RULES_KEY: serde_json::to_value(suppressions)? }))
}

/// Suppressions recorded on a resource.
pub fn resource_suppressions(resource: &CfnResource) -> Result<Vec<NagPackSuppression>> {
    read(resource.metadata.get(METADATA_KEY))
}

/// Stack-wide suppressions.
pub fn stack_suppressions(stack: &Stack) -> Result<Vec<NagPackSuppression>> {
    read(stack.metadata().get(METADATA_KEY))
}

/// Suppress findings on a construct's resource.
///
/// Without `apply_to_children` the suppressions go to the construct's default child
/// (or the construct itself when it is a resource). With it, every resource below
/// the construct receives them. At least one resource must be reached.
pub fn add_resource_suppressions(
    stack: &mut Stack,
    construct: &impl Construct,
    suppressions: &[NagPackSuppression],
    apply_to_children: bool,
) -> Result<()> {
    let node = construct.node_id();
    let path = stack.node(node)?.path.clone();
    for suppression in suppressions {
        suppression.validate(&path)?;
    }

    let targets = if apply_to_children {
        stack.descendant_resources(node)
    } else {
        match stack.node(node)?.kind {
            NodeKind::Resource { .. } => vec![node],
            _ => stack.default_child(node).into_iter().collect(),
        }
    };
    if targets.is_empty() {
        return Err(Error::DanglingSuppression(path));
    }

    for target in targets {
        let Some(resource) = stack.resource_at_mut(target) else {
            continue;
        };
        let mut current = resource_suppressions(resource)?;
        merge(&mut current, suppressions);
        resource
            .metadata
            .insert(METADATA_KEY.to_string(), write(&current)?);
        debug!(
            path = resource.path().unwrap_or_default(),
            rules = ?suppressions.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            "Added suppressions"
        );
    }
    Ok(())
}

/// Suppress findings on the construct at `path` (with or without the leading `/`).
pub fn add_resource_suppressions_by_path(
    stack: &mut Stack,
    path: &str,
    suppressions: &[NagPackSuppression],
    apply_to_children: bool,
) -> Result<()> {
    let node = stack
        .find_by_path(path)
        .ok_or_else(|| Error::DanglingSuppression(path.to_string()))?;
    add_resource_suppressions(stack, &node, suppressions, apply_to_children)
}

/// Suppress findings on every resource of the stack.
pub fn add_stack_suppressions(stack: &mut Stack, suppressions: &[NagPackSuppression]) -> Result<()> {
    let path = stack.id().to_string();
    for suppression in suppressions {
        suppression.validate(&path)?;
    }
    let mut current = stack_suppressions(stack)?;
    merge(&mut current, suppressions);
    let value = write(&current)?;
    stack.metadata_mut().insert(METADATA_KEY.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{App, NodeId, StackProps};
    use pretty_assertions::assert_eq;

    fn stack_with_role() -> (App, NodeId) {
        let mut app = App::new();
        let stack = app.add_stack("S", StackProps::default()).unwrap();
        let role = stack.add_construct(NodeId::ROOT, "role", "Role").unwrap();
        stack
            .add_resource(role, "Resource", CfnResource::new("AWS::IAM::Role"))
            .unwrap();
        (app, role)
    }

    #[test]
    fn test_suppression_lands_on_default_child() {
        let (mut app, role) = stack_with_role();
        let stack = app.stack_mut("S").unwrap();
        add_resource_suppressions(
            stack,
            &role,
            &[NagPackSuppression::new("AwsSolutions-IAM5", "It is ok for our workshop")
                .applies_to(vec![SuppressionTarget::literal("Resource::*")])],
            false,
        )
        .unwrap();

        let child = stack.default_child(role).unwrap();
        let resource = stack.resource_at(child).unwrap();
        assert_eq!(
            resource.metadata[METADATA_KEY],
            json!({"rules_to_suppress": [{
                "id": "AwsSolutions-IAM5",
                "reason": "It is ok for our workshop",
                "applies_to": ["Resource::*"]
            }]})
        );
    }

    #[test]
    fn test_short_reason_rejected() {
        let (mut app, role) = stack_with_role();
        let stack = app.stack_mut("S").unwrap();
        let err = add_resource_suppressions(
            stack,
            &role,
            &[NagPackSuppression::new("AwsSolutions-IAM4", "ok")],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSuppression { .. }));
    }

    #[test]
    fn test_dangling_suppressions() {
        let (mut app, _) = stack_with_role();
        let stack = app.stack_mut("S").unwrap();
        let empty = stack.add_construct(NodeId::ROOT, "empty", "X").unwrap();
        let suppression = [NagPackSuppression::new("AwsSolutions-EC23", "long enough reason")];

        assert!(matches!(
            add_resource_suppressions(stack, &empty, &suppression, false),
            Err(Error::DanglingSuppression(_))
        ));
        assert!(matches!(
            add_resource_suppressions_by_path(stack, "/S/missing", &suppression, false),
            Err(Error::DanglingSuppression(_))
        ));
        assert!(add_resource_suppressions_by_path(stack, "/S/role", &suppression, false).is_ok());
    }

    #[test]
    fn test_applies_to_granular_findings() {
        let suppression = NagPackSuppression::new("AwsSolutions-IAM5", "It is ok for our workshop")
            .applies_to(vec![SuppressionTarget::literal("Resource::*")]);
        assert!(suppression.applies("AwsSolutions-IAM5", "Resource::*").unwrap());
        assert!(!suppression.applies("AwsSolutions-IAM5", "Action::s3:*").unwrap());
        assert!(!suppression.applies("AwsSolutions-IAM5", "").unwrap());
        assert!(!suppression.applies("AwsSolutions-IAM4", "Resource::*").unwrap());

        let blanket = NagPackSuppression::new("AwsSolutions-EC23", "Open for the workshop");
        assert!(blanket.applies("AwsSolutions-EC23", "").unwrap());
    }

    #[test]
    fn test_regex_targets() {
        let target = SuppressionTarget::regex("/^Action::s3:.*$/i");
        assert!(target.matches("Action::S3:GetObject").unwrap());
        assert!(!target.matches("Action::ec2:*").unwrap());
        assert!(SuppressionTarget::regex("no-slashes").matches("x").is_err());

        let parsed: SuppressionTarget = serde_json::from_value(json!({"regex": "/x/"})).unwrap();
        assert_eq!(parsed, SuppressionTarget::regex("/x/"));
    }

    #[test]
    fn test_same_id_merges_targets() {
        let mut current = vec![NagPackSuppression::new("AwsSolutions-IAM5", "first reason here")
            .applies_to(vec![SuppressionTarget::literal("Resource::*")])];
        merge(
            &mut current,
            &[NagPackSuppression::new("AwsSolutions-IAM5", "second reason here")
                .applies_to(vec![SuppressionTarget::literal("Action::s3:*")])],
        );
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].applies_to.as_ref().unwrap().len(), 2);
        assert_eq!(current[0].reason, "second reason here");
    }

    #[test]
    fn test_stack_suppressions() {
        let (mut app, _) = stack_with_role();
        let stack = app.stack_mut("S").unwrap();
        add_stack_suppressions(
            stack,
            &[NagPackSuppression::new("AwsSolutions-VPC7", "No VPC in this stack")],
        )
        .unwrap();
        assert_eq!(stack_suppressions(stack).unwrap().len(), 1);
        assert!(stack.to_template().metadata.contains_key(METADATA_KEY));
    }
}
