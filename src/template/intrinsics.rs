//! CloudFormation intrinsic functions and pseudo parameters.
//!
//! Property values are plain [`serde_json::Value`]s; the helpers here build the
//! intrinsic forms (`Ref`, `Fn::GetAtt`, `Fn::Join`, ...) and inspect them again
//! when the dependency graph is built or a rule needs a readable rendering.

use serde_json::{json, Value};

/// CloudFormation pseudo parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pseudo {
    AccountId,
    Region,
    Partition,
    StackName,
    StackId,
    UrlSuffix,
}

impl Pseudo {
    /// The pseudo parameter name as used inside `Ref`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pseudo::AccountId => "AWS::AccountId",
            Pseudo::Region => "AWS::Region",
            Pseudo::Partition => "AWS::Partition",
            Pseudo::StackName => "AWS::StackName",
            Pseudo::StackId => "AWS::StackId",
            Pseudo::UrlSuffix => "AWS::URLSuffix",
        }
    }
}

/// `{"Ref": logical_id}`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{"Ref": "AWS::..."}`
pub fn pseudo(parameter: Pseudo) -> Value {
    json!({ "Ref": parameter.as_str() })
}

/// `{"Fn::GetAtt": [logical_id, attribute]}`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{"Fn::Join": [delimiter, parts]}`
pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// `{"Fn::Base64": value}`
pub fn base64(value: impl Into<Value>) -> Value {
    json!({ "Fn::Base64": value.into() })
}

/// `{"Fn::Select": [index, list]}`
pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{"Fn::GetAZs": region}`; an empty region means the stack's own region.
pub fn get_azs(region: &str) -> Value {
    json!({ "Fn::GetAZs": region })
}

/// `{"Fn::FindInMap": [map, top_level_key, second_level_key]}`
pub fn find_in_map(map: &str, top_level_key: Value, second_level_key: &str) -> Value {
    json!({ "Fn::FindInMap": [map, top_level_key, second_level_key] })
}

/// How one template element points at another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Ref,
    GetAtt,
    FindInMap,
}

/// A reference to another logical id found inside a property value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Referenced logical id
    pub target: String,
    /// Form of the reference
    pub kind: ReferenceKind,
}

/// Collect every logical id referenced by `value`, in first-seen order.
///
/// Pseudo parameters (`AWS::*`) are not references to template elements and are
/// skipped.
pub fn collect_references(value: &Value) -> Vec<Reference> {
    let mut found = Vec::new();
    walk(value, &mut found);
    found
}

fn push_unique(found: &mut Vec<Reference>, target: &str, kind: ReferenceKind) {
    if !found.iter().any(|r| r.target == target && r.kind == kind) {
        found.push(Reference {
            target: target.to_string(),
            kind,
        });
    }
}

fn walk(value: &Value, found: &mut Vec<Reference>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    if !target.starts_with("AWS::") {
                        push_unique(found, target, ReferenceKind::Ref);
                    }
                    return;
                }
                if let Some(args) = map.get("Fn::GetAtt") {
                    let target = match args {
                        Value::Array(items) => items.first().and_then(Value::as_str),
                        Value::String(dotted) => dotted.split('.').next(),
                        _ => None,
                    };
                    if let Some(target) = target {
                        push_unique(found, target, ReferenceKind::GetAtt);
                    }
                    return;
                }
                if let Some(Value::Array(args)) = map.get("Fn::FindInMap") {
                    if let Some(Value::String(target)) = args.first() {
                        push_unique(found, target, ReferenceKind::FindInMap);
                    }
                    for arg in args.iter().skip(1) {
                        walk(arg, found);
                    }
                    return;
                }
            }
            for nested in map.values() {
                walk(nested, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, found);
            }
        }
        _ => {}
    }
}

/// Render a value as a flat string with references shown as `<Target>` or
/// `<Target.Attribute>`.
///
/// `Fn::Join` is flattened so that e.g. a managed policy ARN reads
/// `arn:<AWS::Partition>:iam::aws:policy/Name`.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Object(map) if map.len() == 1 => {
            if let Some(Value::String(target)) = map.get("Ref") {
                return format!("<{target}>");
            }
            if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                let parts: Vec<String> = args.iter().map(stringify).collect();
                return format!("<{}>", parts.join("."));
            }
            if let Some(Value::Array(args)) = map.get("Fn::Join") {
                if let (Some(Value::String(delimiter)), Some(Value::Array(parts))) =
                    (args.first(), args.get(1))
                {
                    return parts
                        .iter()
                        .map(stringify)
                        .collect::<Vec<_>>()
                        .join(delimiter.as_str());
                }
            }
            value.to_string()
        }
        other => other.to_string(),
    }
}
