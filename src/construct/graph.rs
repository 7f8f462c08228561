//! Resource Dependency Tracking
//!
//! Builds a directed graph of the resources in a stack, with an edge from every
//! resource to each resource that references it. This enables:
//!
//! - Detection of references to undeclared resources
//! - Cycle detection
//! - Deployment ordering
//! - Dependency visualization (DOT)

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::template::{collect_references, CfnResource, ReferenceKind};

/// A node in the dependency graph representing a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Logical id
    pub logical_id: String,
    /// Resource type
    pub resource_type: String,
    /// Construct path
    pub path: String,
}

/// How one resource depends on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyType {
    /// `Ref` in a property
    Reference,
    /// `Fn::GetAtt` in a property
    Attribute,
    /// `DependsOn`
    Explicit,
}

/// An edge between two resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDependency {
    /// Logical id that must exist first
    pub from_id: String,
    /// Logical id of the dependent resource
    pub to_id: String,
    /// Type of dependency
    pub dependency_type: DependencyType,
}

/// The dependency graph for resource relationships
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ResourceNode, ResourceDependency>,
    node_indices: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a set of resources keyed by logical id.
    ///
    /// Every reference must resolve to one of the given resources or to one of
    /// `known_non_resources` (mappings, parameters).
    pub fn from_resources<'a, I>(resources: I, known_non_resources: &HashSet<String>) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a CfnResource)> + Clone,
    {
        let mut graph = Self::new();
        for (logical_id, resource) in resources.clone() {
            graph.add_node(ResourceNode {
                logical_id: logical_id.clone(),
                resource_type: resource.resource_type.clone(),
                path: resource.path().unwrap_or(logical_id).to_string(),
            });
        }

        for (logical_id, resource) in resources {
            let from = resource.path().unwrap_or(logical_id.as_str());
            let property_refs =
                collect_references(&serde_json::Value::Object(resource.properties.clone()));
            let explicit = resource
                .depends_on
                .iter()
                .filter(|dep| !property_refs.iter().any(|r| &r.target == *dep))
                .map(|dep| (dep.clone(), DependencyType::Explicit));
            let implicit = property_refs.iter().map(|r| {
                let kind = match r.kind {
                    ReferenceKind::GetAtt => DependencyType::Attribute,
                    _ => DependencyType::Reference,
                };
                (r.target.clone(), kind)
            });

            for (target, dependency_type) in implicit.collect::<Vec<_>>().into_iter().chain(explicit) {
                if known_non_resources.contains(&target) {
                    continue;
                }
                graph
                    .add_dependency(ResourceDependency {
                        from_id: target.clone(),
                        to_id: logical_id.clone(),
                        dependency_type,
                    })
                    .map_err(|_| Error::unresolved(from, target))?;
            }
        }

        Ok(graph)
    }

    /// Add a node to the graph, replacing any node with the same logical id
    pub fn add_node(&mut self, node: ResourceNode) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(&node.logical_id) {
            if let Some(existing) = self.graph.node_weight_mut(idx) {
                *existing = node;
            }
            return idx;
        }

        let logical_id = node.logical_id.clone();
        let idx = self.graph.add_node(node);
        self.node_indices.insert(logical_id, idx);
        idx
    }

    /// Add a dependency between two resources already in the graph
    pub fn add_dependency(&mut self, dependency: ResourceDependency) -> Result<()> {
        let from_idx = *self
            .node_indices
            .get(&dependency.from_id)
            .ok_or_else(|| Error::ConstructNotFound(dependency.from_id.clone()))?;
        let to_idx = *self
            .node_indices
            .get(&dependency.to_id)
            .ok_or_else(|| Error::ConstructNotFound(dependency.to_id.clone()))?;

        self.graph.add_edge(from_idx, to_idx, dependency);
        Ok(())
    }

    /// Check for dependency cycles
    pub fn has_cycles(&self) -> bool {
        tarjan_scc(&self.graph).iter().any(|scc| {
            scc.len() > 1 || scc.iter().any(|idx| self.graph.contains_edge(*idx, *idx))
        })
    }

    /// Get all cycles in the graph
    pub fn get_cycles(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|idx| self.graph.contains_edge(*idx, *idx))
            })
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.logical_id.clone()))
                    .collect()
            })
            .collect()
    }

    /// Get the order in which resources can be created
    pub fn get_deployment_order(&self) -> Result<Vec<String>> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.logical_id.clone()))
                .collect()),
            Err(_) => Err(Error::DependencyCycle(
                self.get_cycles().into_iter().next().unwrap_or_default(),
            )),
        }
    }

    /// Get all resources that depend on a given resource (direct and transitive)
    pub fn get_dependents(&self, logical_id: &str) -> Vec<String> {
        self.walk(logical_id, Direction::Outgoing)
    }

    /// Get all resources a given resource depends on (direct and transitive)
    pub fn get_dependencies(&self, logical_id: &str) -> Vec<String> {
        self.walk(logical_id, Direction::Incoming)
    }

    fn walk(&self, logical_id: &str, direction: Direction) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut queue = VecDeque::new();

        if let Some(&start_idx) = self.node_indices.get(logical_id) {
            queue.push_back(start_idx);

            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors_directed(current, direction) {
                    if let Some(node) = self.graph.node_weight(neighbor) {
                        if seen.insert(node.logical_id.clone()) {
                            found.push(node.logical_id.clone());
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }

        found.sort();
        found
    }

    /// Get direct dependencies of a resource
    pub fn get_direct_dependencies(&self, logical_id: &str) -> Vec<ResourceDependency> {
        self.node_indices
            .get(logical_id)
            .map(|idx| {
                self.graph
                    .edges_directed(*idx, Direction::Incoming)
                    .map(|edge| edge.weight().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get a node by logical id
    pub fn get_node(&self, logical_id: &str) -> Option<&ResourceNode> {
        self.node_indices
            .get(logical_id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Generate a DOT format representation for visualization
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph resources {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box];\n\n");

        for idx in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(idx) {
                let label = format!("{}\\n{}", node.logical_id, node.resource_type);
                output.push_str(&format!("  \"{}\" [label=\"{}\"];\n", node.logical_id, label));
            }
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let source = self
                .graph
                .node_weight(edge.source())
                .map_or("?", |n| n.logical_id.as_str());
            let target = self
                .graph
                .node_weight(edge.target())
                .map_or("?", |n| n.logical_id.as_str());

            let style = match edge.weight().dependency_type {
                DependencyType::Reference => "solid",
                DependencyType::Attribute => "bold",
                DependencyType::Explicit => "dashed",
            };

            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [style={}];\n",
                source, target, style
            ));
        }

        output.push_str("}\n");
        output
    }
}
