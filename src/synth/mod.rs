//! Cloud assembly synthesis.
//!
//! Synthesis runs the registered aspects, checks every stack's dependency graph,
//! and writes the assembly directory:
//!
//! - `<StackName>.template.json`
//! - `manifest.json` with one `aws:cloudformation:stack` artifact per stack
//! - `tree.json`
//! - `cdk.out`
//! - files contributed by aspects (nag reports)
//!
//! Error annotations block synthesis, but only after the assembly was written so
//! that reports can be inspected.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Environment;
use crate::construct::{AnnotationLevel, App, NodeId, NodeKind, Stack};
use crate::error::{Error, Result};
use crate::template::Template;

/// Version of the cloud assembly schema written to `manifest.json`.
pub const ASSEMBLY_SCHEMA_VERSION: &str = "36.0.0";

/// Options for a synthesis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthOptions {
    /// Assembly output directory
    pub outdir: PathBuf,
    /// Fail when error annotations exist
    pub fail_on_errors: bool,
}

impl SynthOptions {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
            fail_on_errors: true,
        }
    }

    pub fn with_fail_on_errors(mut self, enabled: bool) -> Self {
        self.fail_on_errors = enabled;
        self
    }
}

/// One synthesized stack
#[derive(Debug, Clone, PartialEq)]
pub struct StackArtifact {
    /// Construct id of the stack
    pub id: String,
    pub stack_name: String,
    pub environment: Environment,
    /// Template file name relative to the assembly directory
    pub template_file: String,
    pub template: Template,
}

/// The written assembly
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    pub directory: PathBuf,
    pub stacks: Vec<StackArtifact>,
    /// Every file written, relative to `directory`
    pub files: Vec<String>,
}

impl CloudAssembly {
    /// Look up a stack artifact by stack name or construct id.
    pub fn stack(&self, name: &str) -> Result<&StackArtifact> {
        self.stacks
            .iter()
            .find(|s| s.stack_name == name || s.id == name)
            .ok_or_else(|| Error::StackNotFound(name.to_string()))
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.directory.join(file)
    }
}

#[derive(Serialize)]
struct MetadataEntry {
    #[serde(rename = "type")]
    kind: &'static str,
    data: String,
}

/// Writes a cloud assembly for an app
#[derive(Debug, Clone)]
pub struct Synthesizer {
    options: SynthOptions,
}

impl Synthesizer {
    pub fn new(options: SynthOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SynthOptions {
        &self.options
    }

    /// Synthesize every stack of `app`.
    pub fn synth(&self, app: &mut App) -> Result<CloudAssembly> {
        app.run_aspects()?;

        for stack in app.stacks() {
            let order = stack.dependency_graph()?.get_deployment_order()?;
            debug!(stack = %stack.id(), resources = order.len(), "Validated dependency graph");
        }

        let outdir = &self.options.outdir;
        fs::create_dir_all(outdir).map_err(|source| Error::AssemblyWrite {
            path: outdir.clone(),
            source,
        })?;

        let mut assembly = CloudAssembly {
            directory: outdir.clone(),
            stacks: Vec::new(),
            files: Vec::new(),
        };
        let mut artifacts = serde_json::Map::new();

        for stack in app.stacks() {
            let template = stack.to_template();
            let template_file = format!("{}.template.json", stack.stack_name());
            self.write(&mut assembly, &template_file, &template.to_json()?)?;

            for aspect in app.aspects() {
                for file in aspect.artifacts(stack)? {
                    debug!(aspect = aspect.name(), file = %file.name, "Writing aspect artifact");
                    self.write(&mut assembly, &file.name, &file.contents)?;
                }
            }

            artifacts.insert(
                stack.id().to_string(),
                json!({
                    "type": "aws:cloudformation:stack",
                    "environment": stack.environment().to_string(),
                    "properties": {
                        "templateFile": template_file,
                        "validateOnSynth": false,
                    },
                    "metadata": stack_metadata(stack)?,
                    "displayName": stack.id(),
                }),
            );

            info!(
                stack = %stack.id(),
                template = %template_file,
                resources = template.resources.len(),
                "Synthesized stack"
            );
            assembly.stacks.push(StackArtifact {
                id: stack.id().to_string(),
                stack_name: stack.stack_name().to_string(),
                environment: stack.environment().clone(),
                template_file,
                template,
            });
        }

        artifacts.insert(
            "Tree".to_string(),
            json!({ "type": "cdk:tree", "properties": { "file": "tree.json" } }),
        );
        let manifest = json!({
            "version": ASSEMBLY_SCHEMA_VERSION,
            "artifacts": artifacts,
        });
        self.write(&mut assembly, "manifest.json", &serde_json::to_string_pretty(&manifest)?)?;
        self.write(&mut assembly, "tree.json", &serde_json::to_string_pretty(&tree(app))?)?;
        self.write(
            &mut assembly,
            "cdk.out",
            &serde_json::to_string(&json!({ "version": ASSEMBLY_SCHEMA_VERSION }))?,
        )?;

        let errors: Vec<String> = app
            .stacks()
            .iter()
            .flat_map(|s| s.annotations_at(AnnotationLevel::Error))
            .map(|a| a.to_string())
            .collect();
        for stack in app.stacks() {
            for warning in stack.annotations_at(AnnotationLevel::Warning) {
                warn!(path = %warning.path, "{}", warning.message);
            }
        }
        if self.options.fail_on_errors && !errors.is_empty() {
            return Err(Error::SynthesisBlocked(errors));
        }

        info!(directory = %outdir.display(), files = assembly.files.len(), "Wrote cloud assembly");
        Ok(assembly)
    }

    fn write(&self, assembly: &mut CloudAssembly, name: &str, contents: &str) -> Result<()> {
        let path = self.options.outdir.join(name);
        write_file(&path, contents)?;
        assembly.files.push(name.to_string());
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|source| Error::AssemblyWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Per-path manifest metadata: logical ids and annotations.
fn stack_metadata(stack: &Stack) -> Result<IndexMap<String, Vec<MetadataEntry>>> {
    let mut metadata: IndexMap<String, Vec<MetadataEntry>> = IndexMap::new();
    for id in stack.descendants(NodeId::ROOT) {
        let node = stack.node(id)?;
        if let NodeKind::Resource { logical_id } | NodeKind::Output { logical_id } = &node.kind {
            metadata
                .entry(format!("/{}", node.path))
                .or_default()
                .push(MetadataEntry {
                    kind: "aws:cdk:logicalId",
                    data: logical_id.clone(),
                });
        }
    }
    for element in ["BootstrapVersion", "CheckBootstrapVersion"] {
        metadata
            .entry(format!("/{}/{element}", stack.id()))
            .or_default()
            .push(MetadataEntry {
                kind: "aws:cdk:logicalId",
                data: element.to_string(),
            });
    }
    for annotation in stack.annotations() {
        metadata
            .entry(format!("/{}", annotation.path))
            .or_default()
            .push(MetadataEntry {
                kind: annotation.level.metadata_key(),
                data: annotation.message.clone(),
            });
    }
    Ok(metadata)
}

fn tree(app: &App) -> Value {
    let children: serde_json::Map<String, Value> = app
        .stacks()
        .iter()
        .map(|s| (s.id().to_string(), s.tree_json(NodeId::ROOT)))
        .collect();
    json!({
        "version": "tree-0.1",
        "tree": {
            "id": "App",
            "path": "",
            "children": children,
            "constructInfo": { "fqn": "aws-cdk-lib.App" },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::StackProps;
    use crate::template::CfnResource;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn app() -> App {
        let mut app = App::new();
        let stack = app
            .add_stack(
                "Demo",
                StackProps {
                    stack_name: Some("DemoStack".into()),
                    ..StackProps::default()
                },
            )
            .unwrap();
        stack
            .add_resource(NodeId::ROOT, "Vpc", CfnResource::new("AWS::EC2::VPC"))
            .unwrap();
        app
    }

    #[test]
    fn test_writes_assembly_files() {
        let dir = TempDir::new().unwrap();
        let mut app = app();
        let assembly = app.synth(dir.path()).unwrap();

        assert_eq!(
            assembly.files,
            ["DemoStack.template.json", "manifest.json", "tree.json", "cdk.out"]
        );
        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("manifest.json")).unwrap())
                .unwrap();
        let artifact = &manifest["artifacts"]["Demo"];
        assert_eq!(artifact["type"], "aws:cloudformation:stack");
        assert_eq!(artifact["environment"], "aws://unknown-account/unknown-region");
        assert_eq!(artifact["properties"]["templateFile"], "DemoStack.template.json");
        assert_eq!(
            artifact["metadata"]["/Demo/Vpc"][0],
            json!({"type": "aws:cdk:logicalId", "data": "Vpc"})
        );

        let template: Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("DemoStack.template.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(template["Resources"]["Vpc"]["Type"], "AWS::EC2::VPC");
        assert!(template["Parameters"]["BootstrapVersion"].is_object());

        assert_eq!(assembly.stack("DemoStack").unwrap().id, "Demo");
    }

    #[test]
    fn test_error_annotations_block_after_writing() {
        let dir = TempDir::new().unwrap();
        let mut app = app();
        app.stack_mut("Demo")
            .unwrap()
            .annotate(NodeId::ROOT, AnnotationLevel::Error, "broken");

        let err = app.synth(dir.path()).unwrap_err();
        match err {
            Error::SynthesisBlocked(errors) => {
                assert_eq!(errors, ["[Error at /Demo] broken"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(dir.path().join("manifest.json").exists());

        let assembly = Synthesizer::new(SynthOptions::new(dir.path()).with_fail_on_errors(false))
            .synth(&mut app)
            .unwrap();
        assert_eq!(assembly.stacks.len(), 1);
    }

    #[test]
    fn test_unwritable_outdir() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let mut app = app();
        let err = app.synth(&blocker).unwrap_err();
        assert!(matches!(err, Error::AssemblyWrite { .. }));
    }
}
