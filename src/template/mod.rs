//! CloudFormation template model.
//!
//! [`CfnResource`] and [`CfnOutput`] are the raw template elements every construct
//! eventually lowers to. [`Template`] is the serializable document written to the
//! cloud assembly; its sections keep declaration order.

pub mod intrinsics;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use intrinsics::{collect_references, stringify, Pseudo, Reference, ReferenceKind};

/// Metadata key holding a resource's construct path.
pub const PATH_METADATA_KEY: &str = "aws:cdk:path";

/// Default bootstrap qualifier used by the stack synthesizer.
pub const DEFAULT_QUALIFIER: &str = "hnb659fds";

/// Minimum bootstrap stack version the generated template asserts.
pub const MIN_BOOTSTRAP_VERSION: u32 = 6;

/// What CloudFormation does with a resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
    Snapshot,
}

/// A single resource of the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResource {
    /// Resource type, e.g. `AWS::EC2::Instance`
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Resource properties
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    /// Logical ids this resource must be created after
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Policy applied when an update replaces the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
    /// Policy applied when the resource is deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
    /// Resource metadata (construct path, suppressions)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

impl CfnResource {
    /// Create a resource of the given type with no properties.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            update_replace_policy: None,
            deletion_policy: None,
            metadata: IndexMap::new(),
        }
    }

    /// Set a property (builder style).
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Add an explicit dependency (builder style).
    pub fn with_dependency(mut self, logical_id: impl Into<String>) -> Self {
        self.add_dependency(logical_id);
        self
    }

    /// Apply the same removal policy to updates and deletes.
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self.deletion_policy = Some(policy);
        self
    }

    /// Set or replace a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Get a property value.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Add an explicit dependency, ignoring duplicates.
    pub fn add_dependency(&mut self, logical_id: impl Into<String>) {
        let logical_id = logical_id.into();
        if !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
        }
    }

    /// True if the resource has the given type.
    pub fn is_type(&self, resource_type: &str) -> bool {
        self.resource_type == resource_type
    }

    /// Construct path recorded in the metadata, if the resource was added to a stack.
    pub fn path(&self) -> Option<&str> {
        self.metadata.get(PATH_METADATA_KEY).and_then(Value::as_str)
    }

    /// All logical ids this resource depends on, through properties or `DependsOn`.
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = collect_references(&Value::Object(self.properties.clone()));
        for dep in &self.depends_on {
            if !refs.iter().any(|r| &r.target == dep) {
                refs.push(Reference {
                    target: dep.clone(),
                    kind: ReferenceKind::Ref,
                });
            }
        }
        refs
    }
}

/// A template output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnOutput {
    /// Output value
    pub value: Value,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CfnOutput {
    /// Create an output with the given value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            description: None,
        }
    }

    /// Add a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A complete CloudFormation template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mappings: IndexMap<String, Value>,
    #[serde(default)]
    pub resources: IndexMap<String, CfnResource>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, CfnOutput>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub rules: IndexMap<String, Value>,
}

impl Template {
    /// Add the `BootstrapVersion` parameter and the `CheckBootstrapVersion` rule.
    pub fn add_bootstrap_version_check(&mut self, qualifier: &str) {
        self.parameters.insert(
            "BootstrapVersion".to_string(),
            json!({
                "Type": "AWS::SSM::Parameter::Value<String>",
                "Default": format!("/cdk-bootstrap/{qualifier}/version"),
                "Description": "Version of the CDK Bootstrap resources in this environment, automatically retrieved from SSM Parameter Store. [cdk:skip]"
            }),
        );

        let old_versions: Vec<String> = (1..MIN_BOOTSTRAP_VERSION).map(|v| v.to_string()).collect();
        self.rules.insert(
            "CheckBootstrapVersion".to_string(),
            json!({
                "Assertions": [{
                    "Assert": {
                        "Fn::Not": [{
                            "Fn::Contains": [old_versions, { "Ref": "BootstrapVersion" }]
                        }]
                    },
                    "AssertDescription": format!(
                        "CDK bootstrap stack version {MIN_BOOTSTRAP_VERSION} required. Please run 'cdk bootstrap' with a recent version of the CDK CLI."
                    )
                }]
            }),
        );
    }

    /// Resources of the given type, with their logical ids.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a CfnResource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
