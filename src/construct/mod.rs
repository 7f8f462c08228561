//! Construct tree.
//!
//! An [`App`] owns one or more [`Stack`]s. Each stack owns a tree of construct nodes
//! addressed by [`NodeId`]; leaves of the tree are raw template elements (resources,
//! outputs, mappings) whose logical ids are derived from their path. Typed handles in
//! [`crate::resources`] sit on top of this tree.

pub mod graph;
pub mod logical_id;

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::Environment;
use crate::error::{Error, Result};
use crate::template::intrinsics::{get_att, reference};
use crate::template::{CfnOutput, CfnResource, Template, DEFAULT_QUALIFIER, PATH_METADATA_KEY};

pub use graph::{DependencyGraph, DependencyType, ResourceDependency, ResourceNode};
pub use logical_id::make_unique_id;

/// Separator between path components.
pub const PATH_SEP: char = '/';

/// Child id treated as the default child of a construct.
const DEFAULT_CHILD_IDS: [&str; 2] = ["Resource", "Default"];

/// Index of a node inside a stack's construct tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The stack itself.
    pub const ROOT: NodeId = NodeId(0);
}

/// Anything that occupies a node in a stack's construct tree.
pub trait Construct {
    /// The construct's node.
    fn node_id(&self) -> NodeId;
}

impl Construct for NodeId {
    fn node_id(&self) -> NodeId {
        *self
    }
}

/// What a construct node holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The stack root.
    Stack,
    /// A grouping construct (an L2 handle such as a VPC or a role).
    Construct {
        /// Fully qualified type name, recorded in `tree.json`
        fqn: String,
    },
    /// A template resource.
    Resource { logical_id: String },
    /// A template output.
    Output { logical_id: String },
    /// A template mapping.
    Mapping { logical_id: String },
}

/// A node of the construct tree.
#[derive(Debug, Clone)]
pub struct ConstructNode {
    /// Id, unique among siblings
    pub id: String,
    /// Full path including the stack id
    pub path: String,
    /// Parent node, `None` for the stack
    pub parent: Option<NodeId>,
    /// Children in declaration order
    pub children: Vec<NodeId>,
    /// Node contents
    pub kind: NodeKind,
}

impl ConstructNode {
    /// Logical id for template elements.
    pub fn logical_id(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Resource { logical_id }
            | NodeKind::Output { logical_id }
            | NodeKind::Mapping { logical_id } => Some(logical_id),
            _ => None,
        }
    }
}

/// Severity of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnnotationLevel {
    Info,
    Warning,
    Error,
}

impl AnnotationLevel {
    /// Metadata key used in the assembly manifest.
    pub fn metadata_key(&self) -> &'static str {
        match self {
            AnnotationLevel::Info => "aws:cdk:info",
            AnnotationLevel::Warning => "aws:cdk:warning",
            AnnotationLevel::Error => "aws:cdk:error",
        }
    }
}

impl fmt::Display for AnnotationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationLevel::Info => write!(f, "Info"),
            AnnotationLevel::Warning => write!(f, "Warning"),
            AnnotationLevel::Error => write!(f, "Error"),
        }
    }
}

/// A message attached to a construct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    pub level: AnnotationLevel,
    /// Construct path without the leading separator
    pub path: String,
    pub message: String,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} at /{}] {}", self.level, self.path, self.message)
    }
}

/// Handle to a resource declared in a stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub node: NodeId,
    pub logical_id: String,
}

impl ResourceRef {
    /// `{"Ref": <logical id>}`
    pub fn reference(&self) -> Value {
        reference(&self.logical_id)
    }

    /// `{"Fn::GetAtt": [<logical id>, attribute]}`
    pub fn get_att(&self, attribute: &str) -> Value {
        get_att(&self.logical_id, attribute)
    }
}

impl Construct for ResourceRef {
    fn node_id(&self) -> NodeId {
        self.node
    }
}

/// Handle to a declared output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub node: NodeId,
    pub logical_id: String,
}

impl Construct for OutputRef {
    fn node_id(&self) -> NodeId {
        self.node
    }
}

/// Properties of a stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackProps {
    /// Target environment; `None` means environment-agnostic
    pub env: Option<Environment>,
    /// Template description
    pub description: Option<String>,
    /// Physical stack name, defaults to the stack id
    pub stack_name: Option<String>,
    /// Bootstrap qualifier, defaults to [`DEFAULT_QUALIFIER`]
    pub bootstrap_qualifier: Option<String>,
}

/// A deployable unit that synthesizes to one template.
#[derive(Debug, Clone)]
pub struct Stack {
    id: String,
    stack_name: String,
    environment: Environment,
    description: Option<String>,
    qualifier: String,
    nodes: Vec<ConstructNode>,
    resources: IndexMap<String, CfnResource>,
    outputs: IndexMap<String, CfnOutput>,
    mappings: IndexMap<String, Value>,
    metadata: IndexMap<String, Value>,
    annotations: Vec<Annotation>,
}

impl Stack {
    fn new(id: &str, props: StackProps) -> Result<Self> {
        validate_id(id)?;
        let root = ConstructNode {
            id: id.to_string(),
            path: id.to_string(),
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Stack,
        };
        Ok(Self {
            id: id.to_string(),
            stack_name: props.stack_name.unwrap_or_else(|| id.to_string()),
            environment: props.env.unwrap_or_default(),
            description: props.description,
            qualifier: props
                .bootstrap_qualifier
                .unwrap_or_else(|| DEFAULT_QUALIFIER.to_string()),
            nodes: vec![root],
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
            mappings: IndexMap::new(),
            metadata: IndexMap::new(),
            annotations: Vec::new(),
        })
    }

    /// Construct id of the stack.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Physical stack name.
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    /// Target environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Concrete region, if the stack is not region-agnostic.
    pub fn region(&self) -> Option<&str> {
        self.environment.region.as_deref()
    }

    /// Bootstrap qualifier.
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    fn add_child(&mut self, scope: NodeId, id: &str, kind: NodeKind) -> Result<NodeId> {
        validate_id(id)?;
        let parent = self.node(scope)?;
        if parent.children.iter().any(|c| self.nodes[c.0].id == id) {
            return Err(Error::DuplicateConstruct {
                scope: parent.path.clone(),
                id: id.to_string(),
            });
        }
        let path = format!("{}{}{}", parent.path, PATH_SEP, id);
        let node_id = NodeId(self.nodes.len());
        self.nodes.push(ConstructNode {
            id: id.to_string(),
            path,
            parent: Some(scope),
            children: Vec::new(),
            kind,
        });
        self.nodes[scope.0].children.push(node_id);
        Ok(node_id)
    }

    /// Logical id a new child `id` of `scope` would receive.
    pub fn allocate_child_logical_id(&self, scope: NodeId, id: &str) -> Result<String> {
        let scope_path = &self.node(scope)?.path;
        let mut components: Vec<&str> = scope_path.split(PATH_SEP).skip(1).collect();
        components.push(id);
        make_unique_id(&components)
    }

    fn ensure_unique_logical_id(&self, logical_id: &str, path: String) -> Result<()> {
        if self.resources.contains_key(logical_id)
            || self.outputs.contains_key(logical_id)
            || self.mappings.contains_key(logical_id)
        {
            return Err(Error::DuplicateLogicalId {
                logical_id: logical_id.to_string(),
                path,
            });
        }
        Ok(())
    }

    /// Add a grouping construct under `scope`.
    pub fn add_construct(&mut self, scope: impl Construct, id: &str, fqn: &str) -> Result<NodeId> {
        self.add_child(
            scope.node_id(),
            id,
            NodeKind::Construct {
                fqn: fqn.to_string(),
            },
        )
    }

    /// Declare a template resource under `scope`.
    ///
    /// Every logical id the resource references must already be declared in this stack.
    pub fn add_resource(
        &mut self,
        scope: impl Construct,
        id: &str,
        mut resource: CfnResource,
    ) -> Result<ResourceRef> {
        let scope = scope.node_id();
        validate_id(id)?;
        let logical_id = self.allocate_child_logical_id(scope, id)?;
        let path = format!("{}{}{}", self.node(scope)?.path, PATH_SEP, id);
        self.ensure_unique_logical_id(&logical_id, path.clone())?;

        for r in resource.references() {
            if !self.resources.contains_key(&r.target) && !self.mappings.contains_key(&r.target) {
                return Err(Error::unresolved(path, r.target));
            }
        }

        let node = self.add_child(
            scope,
            id,
            NodeKind::Resource {
                logical_id: logical_id.clone(),
            },
        )?;
        resource
            .metadata
            .insert(PATH_METADATA_KEY.to_string(), Value::String(path.clone()));

        debug!(
            stack = %self.id,
            path = %path,
            logical_id = %logical_id,
            resource_type = %resource.resource_type,
            "Declared resource"
        );
        self.resources.insert(logical_id.clone(), resource);
        Ok(ResourceRef { node, logical_id })
    }

    /// Declare a template output under `scope`.
    pub fn add_output(
        &mut self,
        scope: impl Construct,
        id: &str,
        output: CfnOutput,
    ) -> Result<OutputRef> {
        let scope = scope.node_id();
        validate_id(id)?;
        let logical_id = self.allocate_child_logical_id(scope, id)?;
        let path = format!("{}{}{}", self.node(scope)?.path, PATH_SEP, id);
        self.ensure_unique_logical_id(&logical_id, path.clone())?;

        for r in crate::template::collect_references(&output.value) {
            if !self.resources.contains_key(&r.target) && !self.mappings.contains_key(&r.target) {
                return Err(Error::unresolved(path, r.target));
            }
        }

        let node = self.add_child(
            scope,
            id,
            NodeKind::Output {
                logical_id: logical_id.clone(),
            },
        )?;
        debug!(stack = %self.id, path = %path, logical_id = %logical_id, "Declared output");
        self.outputs.insert(logical_id.clone(), output);
        Ok(OutputRef { node, logical_id })
    }

    /// Declare a template mapping under `scope`, returning its logical id.
    pub fn add_mapping(&mut self, scope: impl Construct, id: &str, mapping: Value) -> Result<String> {
        let scope = scope.node_id();
        validate_id(id)?;
        let logical_id = self.allocate_child_logical_id(scope, id)?;
        let path = format!("{}{}{}", self.node(scope)?.path, PATH_SEP, id);
        self.ensure_unique_logical_id(&logical_id, path)?;
        self.add_child(
            scope,
            id,
            NodeKind::Mapping {
                logical_id: logical_id.clone(),
            },
        )?;
        self.mappings.insert(logical_id.clone(), mapping);
        Ok(logical_id)
    }

    /// Get a node.
    pub fn node(&self, id: NodeId) -> Result<&ConstructNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::ConstructNotFound(format!("{}#{}", self.id, id.0)))
    }

    /// Find a node by path, with or without the leading separator.
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        let path = path.trim_start_matches(PATH_SEP);
        self.nodes
            .iter()
            .position(|n| n.path == path)
            .map(NodeId)
    }

    /// The child named `Resource` (or `Default`) of a construct, if it is a resource.
    pub fn default_child(&self, construct: impl Construct) -> Option<NodeId> {
        let node = self.nodes.get(construct.node_id().0)?;
        DEFAULT_CHILD_IDS.iter().find_map(|wanted| {
            node.children.iter().copied().find(|c| {
                let child = &self.nodes[c.0];
                child.id == *wanted && matches!(child.kind, NodeKind::Resource { .. })
            })
        })
    }

    /// All nodes below (and including) `construct`, depth-first in declaration order.
    pub fn descendants(&self, construct: impl Construct) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![construct.node_id()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current.0) {
                found.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        found
    }

    /// All resource nodes below (and including) `construct`.
    pub fn descendant_resources(&self, construct: impl Construct) -> Vec<NodeId> {
        self.descendants(construct)
            .into_iter()
            .filter(|id| matches!(self.nodes[id.0].kind, NodeKind::Resource { .. }))
            .collect()
    }

    /// Logical id of a resource, output or mapping node.
    pub fn logical_id(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).and_then(ConstructNode::logical_id)
    }

    /// Resource held by a node.
    pub fn resource_at(&self, node: NodeId) -> Option<&CfnResource> {
        self.logical_id(node).and_then(|id| self.resources.get(id))
    }

    /// Mutable resource held by a node.
    pub fn resource_at_mut(&mut self, node: NodeId) -> Option<&mut CfnResource> {
        let logical_id = self.logical_id(node)?.to_string();
        self.resources.get_mut(&logical_id)
    }

    /// Resource behind a handle.
    pub fn resource(&self, handle: &ResourceRef) -> Result<&CfnResource> {
        self.resources
            .get(&handle.logical_id)
            .ok_or_else(|| Error::ConstructNotFound(handle.logical_id.clone()))
    }

    /// Mutable resource behind a handle.
    pub fn resource_mut(&mut self, handle: &ResourceRef) -> Result<&mut CfnResource> {
        self.resources
            .get_mut(&handle.logical_id)
            .ok_or_else(|| Error::ConstructNotFound(handle.logical_id.clone()))
    }

    /// Resource by logical id.
    pub fn resource_by_logical_id(&self, logical_id: &str) -> Option<&CfnResource> {
        self.resources.get(logical_id)
    }

    /// All resources, in declaration order.
    pub fn resources(&self) -> &IndexMap<String, CfnResource> {
        &self.resources
    }

    /// All outputs, in declaration order.
    pub fn outputs(&self) -> &IndexMap<String, CfnOutput> {
        &self.outputs
    }

    /// All mappings, in declaration order.
    pub fn mappings(&self) -> &IndexMap<String, Value> {
        &self.mappings
    }

    /// Template-level metadata.
    pub fn metadata(&self) -> &IndexMap<String, Value> {
        &self.metadata
    }

    /// Mutable template-level metadata.
    pub fn metadata_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.metadata
    }

    /// Number of nodes in the tree, stack included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Attach an annotation to a node; identical annotations are recorded once.
    pub fn annotate(&mut self, node: NodeId, level: AnnotationLevel, message: impl Into<String>) {
        let Some(target) = self.nodes.get(node.0) else {
            return;
        };
        let annotation = Annotation {
            level,
            path: target.path.clone(),
            message: message.into(),
        };
        if !self.annotations.contains(&annotation) {
            self.annotations.push(annotation);
        }
    }

    /// All annotations, in the order they were recorded.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations at the given level.
    pub fn annotations_at(&self, level: AnnotationLevel) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |a| a.level == level)
    }

    /// Build the resource dependency graph.
    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        let known: HashSet<String> = self
            .mappings
            .keys()
            .cloned()
            .chain(std::iter::once("BootstrapVersion".to_string()))
            .collect();
        DependencyGraph::from_resources(&self.resources, &known)
    }

    /// Render the stack as a CloudFormation template.
    ///
    /// Template sections follow the construct tree, so a resource created late inside
    /// an earlier construct (a role's default policy) is listed with its siblings.
    pub fn to_template(&self) -> Template {
        let mut template = Template {
            description: self.description.clone(),
            metadata: self.metadata.clone(),
            ..Template::default()
        };

        for id in self.descendants(NodeId::ROOT) {
            let node = &self.nodes[id.0];
            match &node.kind {
                NodeKind::Resource { logical_id } => {
                    if let Some(resource) = self.resources.get(logical_id) {
                        template.resources.insert(logical_id.clone(), resource.clone());
                    }
                }
                NodeKind::Output { logical_id } => {
                    if let Some(output) = self.outputs.get(logical_id) {
                        template.outputs.insert(logical_id.clone(), output.clone());
                    }
                }
                NodeKind::Mapping { logical_id } => {
                    if let Some(mapping) = self.mappings.get(logical_id) {
                        template.mappings.insert(logical_id.clone(), mapping.clone());
                    }
                }
                NodeKind::Stack | NodeKind::Construct { .. } => {}
            }
        }

        template.add_bootstrap_version_check(&self.qualifier);
        template
    }

    /// Render the construct tree below `node` in the `tree.json` layout.
    pub fn tree_json(&self, node: NodeId) -> Value {
        let Some(current) = self.nodes.get(node.0) else {
            return Value::Null;
        };

        let mut entry = json!({ "id": current.id, "path": current.path });
        if !current.children.is_empty() {
            let children: serde_json::Map<String, Value> = current
                .children
                .iter()
                .map(|c| (self.nodes[c.0].id.clone(), self.tree_json(*c)))
                .collect();
            entry["children"] = Value::Object(children);
        }

        match &current.kind {
            NodeKind::Resource { logical_id } => {
                if let Some(resource) = self.resources.get(logical_id) {
                    entry["attributes"] = json!({
                        "aws:cdk:cloudformation:type": resource.resource_type,
                        "aws:cdk:cloudformation:props": resource.properties,
                    });
                }
            }
            NodeKind::Construct { fqn } => {
                entry["constructInfo"] = json!({ "fqn": fqn });
            }
            NodeKind::Stack => {
                entry["constructInfo"] = json!({ "fqn": "aws-cdk-lib.Stack" });
            }
            NodeKind::Output { .. } => {
                entry["constructInfo"] = json!({ "fqn": "aws-cdk-lib.CfnOutput" });
            }
            NodeKind::Mapping { .. } => {
                entry["constructInfo"] = json!({ "fqn": "aws-cdk-lib.CfnMapping" });
            }
        }
        entry
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() || id.contains(PATH_SEP) {
        return Err(Error::InvalidConstructId(id.to_string()));
    }
    Ok(())
}

/// A file an aspect contributes to the cloud assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyFile {
    /// File name relative to the assembly directory
    pub name: String,
    pub contents: String,
}

/// A visitor applied to every node of every stack before synthesis.
pub trait Aspect {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Visit one node. Nodes are visited depth-first in declaration order.
    fn visit(&mut self, stack: &mut Stack, node: NodeId) -> Result<()>;

    /// Extra assembly files for a stack, collected after every node was visited.
    fn artifacts(&self, _stack: &Stack) -> Result<Vec<AssemblyFile>> {
        Ok(Vec::new())
    }
}

/// The root of the construct tree.
#[derive(Default)]
pub struct App {
    stacks: Vec<Stack>,
    aspects: Vec<Box<dyn Aspect>>,
    aspects_invoked: bool,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("stacks", &self.stacks)
            .field(
                "aspects",
                &self.aspects.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl App {
    /// Create an empty app.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stack and return a mutable borrow of it.
    pub fn add_stack(&mut self, id: &str, props: StackProps) -> Result<&mut Stack> {
        if self.stacks.iter().any(|s| s.id == id) {
            return Err(Error::DuplicateConstruct {
                scope: String::new(),
                id: id.to_string(),
            });
        }
        let stack = Stack::new(id, props)?;
        info!(stack = %id, environment = %stack.environment, "Added stack");
        self.stacks.push(stack);
        let last = self.stacks.len() - 1;
        Ok(&mut self.stacks[last])
    }

    /// Remove a stack that failed to declare.
    pub(crate) fn remove_stack(&mut self, id: &str) {
        self.stacks.retain(|s| s.id != id);
    }

    /// Get a stack by id.
    pub fn stack(&self, id: &str) -> Result<&Stack> {
        self.stacks
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::StackNotFound(id.to_string()))
    }

    /// Get a mutable stack by id.
    pub fn stack_mut(&mut self, id: &str) -> Result<&mut Stack> {
        self.stacks
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::StackNotFound(id.to_string()))
    }

    /// All stacks, in declaration order.
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Register an aspect run at synthesis.
    pub fn add_aspect(&mut self, aspect: impl Aspect + 'static) {
        self.aspects.push(Box::new(aspect));
    }

    /// Registered aspects.
    pub fn aspects(&self) -> &[Box<dyn Aspect>] {
        &self.aspects
    }

    /// Apply an aspect owned by the caller to every node right away.
    pub fn apply_aspect(&mut self, aspect: &mut dyn Aspect) -> Result<()> {
        for stack in &mut self.stacks {
            debug!(aspect = aspect.name(), stack = %stack.id, "Applying aspect");
            for node in stack.descendants(NodeId::ROOT) {
                aspect.visit(stack, node)?;
            }
        }
        Ok(())
    }

    /// Run the registered aspects once; later calls are no-ops.
    pub fn run_aspects(&mut self) -> Result<()> {
        if self.aspects_invoked {
            return Ok(());
        }
        let mut aspects = std::mem::take(&mut self.aspects);
        let result = aspects
            .iter_mut()
            .try_for_each(|aspect| self.apply_aspect(aspect.as_mut()));
        self.aspects = aspects;
        result?;
        self.aspects_invoked = true;
        Ok(())
    }

    /// Synthesize every stack into a cloud assembly at `outdir`.
    pub fn synth(
        &mut self,
        outdir: impl Into<std::path::PathBuf>,
    ) -> Result<crate::synth::CloudAssembly> {
        crate::synth::Synthesizer::new(crate::synth::SynthOptions::new(outdir)).synth(self)
    }
}
