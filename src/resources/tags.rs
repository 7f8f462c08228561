//! Resource tags.

use serde_json::{json, Value};

use crate::construct::{Construct, Stack};

/// Tag key used for display names.
pub const NAME_TAG: &str = "Name";

/// Resource types that carry a `Tags` property.
const TAGGABLE_TYPES: &[&str] = &[
    "AWS::EC2::VPC",
    "AWS::EC2::Subnet",
    "AWS::EC2::RouteTable",
    "AWS::EC2::InternetGateway",
    "AWS::EC2::SecurityGroup",
    "AWS::EC2::FlowLog",
    "AWS::EC2::Instance",
    "AWS::IAM::Role",
    "AWS::Logs::LogGroup",
];

/// A key/value tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "Key": self.key, "Value": self.value })
    }
}

/// True if resources of this type accept tags.
pub fn is_taggable(resource_type: &str) -> bool {
    TAGGABLE_TYPES.contains(&resource_type)
}

/// Tag every taggable resource below `construct`.
///
/// A resource that already carries the key keeps its value, so a tag applied on
/// a nested construct first wins over one applied on an enclosing construct later.
pub fn apply_tag(stack: &mut Stack, construct: impl Construct, key: &str, value: &str) {
    for node in stack.descendant_resources(construct) {
        let Some(resource) = stack.resource_at_mut(node) else {
            continue;
        };
        if !is_taggable(&resource.resource_type) {
            continue;
        }
        let tags = resource
            .properties
            .entry("Tags")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = tags {
            if !items.iter().any(|t| t["Key"] == key) {
                items.push(Tag::new(key, value).to_json());
            }
        }
    }
}
