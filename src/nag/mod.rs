//! Policy checks for synthesized resources
//!
//! This module provides a rule pack aspect in the manner of cdk-nag:
//!
//! - `NagPack`: an [`Aspect`] that evaluates every rule against every resource,
//!   honours suppressions, annotates findings and collects report lines
//! - `NagRule`: trait implemented by each rule (see [`rules`])
//! - suppression records attached to resource or template metadata
//!   (see [`suppressions`])
//! - per-stack compliance reports written into the cloud assembly (see [`report`])
//!
//! Error-level findings that are not suppressed become error annotations, which
//! stop synthesis.

pub mod report;
pub mod rules;
pub mod suppressions;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

use crate::config::NagConfig;
use crate::construct::{AnnotationLevel, Aspect, AssemblyFile, NodeId, NodeKind, Stack};
use crate::error::Result;

pub use report::{NagCompliance, NagReport, NagReportLine, NagStats, ReportFormat};
pub use rules::{aws_solutions_rules, NagRule, RuleContext};
pub use suppressions::{
    add_resource_suppressions, add_resource_suppressions_by_path, add_stack_suppressions,
    NagPackSuppression, SuppressionTarget,
};

/// Name of the AwsSolutions pack; prefixes its rule ids.
pub const AWS_SOLUTIONS: &str = "AwsSolutions";

/// Annotation level of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NagMessageLevel {
    Warning,
    Error,
}

impl fmt::Display for NagMessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NagMessageLevel::Warning => write!(f, "Warning"),
            NagMessageLevel::Error => write!(f, "Error"),
        }
    }
}

impl From<NagMessageLevel> for AnnotationLevel {
    fn from(level: NagMessageLevel) -> Self {
        match level {
            NagMessageLevel::Warning => AnnotationLevel::Warning,
            NagMessageLevel::Error => AnnotationLevel::Error,
        }
    }
}

/// Result of evaluating a rule on one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NagRuleCompliance {
    Compliant,
    NonCompliant,
    /// The rule does not look at this kind of resource
    NotApplicable,
    /// Non-compliant, with one entry per granular finding
    NonCompliantFindings(Vec<String>),
}

/// Options of a rule pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NagPackOptions {
    /// Append the rule explanation to annotations
    pub verbose: bool,
    /// Record suppressed findings as info annotations
    pub log_ignores: bool,
    /// Produce report artifacts
    pub reports: bool,
    pub report_formats: Vec<ReportFormat>,
}

impl Default for NagPackOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            log_ignores: false,
            reports: true,
            report_formats: vec![ReportFormat::Csv],
        }
    }
}

impl From<&NagConfig> for NagPackOptions {
    fn from(config: &NagConfig) -> Self {
        Self {
            verbose: config.verbose,
            log_ignores: config.log_ignores,
            reports: config.reports,
            report_formats: config.report_formats.clone(),
        }
    }
}

/// A rule pack applied as an aspect
pub struct NagPack {
    name: String,
    rules: Vec<Box<dyn NagRule>>,
    options: NagPackOptions,
    lines: IndexMap<String, Vec<NagReportLine>>,
}

impl fmt::Debug for NagPack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NagPack")
            .field("name", &self.name)
            .field("rules", &self.rules.iter().map(|r| r.id()).collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl NagPack {
    pub fn new(name: impl Into<String>, rules: Vec<Box<dyn NagRule>>, options: NagPackOptions) -> Self {
        Self {
            name: name.into(),
            rules,
            options,
            lines: IndexMap::new(),
        }
    }

    /// The AwsSolutions pack.
    pub fn aws_solutions(options: NagPackOptions) -> Self {
        Self::new(AWS_SOLUTIONS, aws_solutions_rules(), options)
    }

    pub fn options(&self) -> &NagPackOptions {
        &self.options
    }

    pub fn rules(&self) -> &[Box<dyn NagRule>] {
        &self.rules
    }

    /// Report for a stack; empty when the stack was never visited.
    pub fn report(&self, stack: &Stack) -> NagReport {
        NagReport::new(
            self.name.clone(),
            stack.stack_name(),
            self.lines.get(stack.id()).cloned().unwrap_or_default(),
        )
    }

    fn full_rule_id(&self, rule: &dyn NagRule) -> String {
        format!("{}-{}", self.name, rule.id())
    }

    fn record(&mut self, stack: &Stack, line: NagReportLine) {
        let lines = self.lines.entry(stack.id().to_string()).or_default();
        if !lines.contains(&line) {
            lines.push(line);
        }
    }

    fn check_resource(&mut self, stack: &mut Stack, node: NodeId, logical_id: &str) -> Result<()> {
        let Some(resource) = stack.resource_at(node).cloned() else {
            return Ok(());
        };
        let path = stack.node(node)?.path.clone();
        let mut ignores = suppressions::resource_suppressions(&resource)?;
        ignores.extend(suppressions::stack_suppressions(stack)?);

        let rules = std::mem::take(&mut self.rules);
        let mut result = Ok(());
        for rule in &rules {
            let compliance = rule.evaluate(&RuleContext {
                stack,
                logical_id,
                resource: &resource,
            });
            let findings = match compliance {
                NagRuleCompliance::NotApplicable => continue,
                NagRuleCompliance::Compliant => {
                    let line = self.line(rule.as_ref(), &path, "", NagCompliance::Compliant, "N/A");
                    self.record(stack, line);
                    continue;
                }
                NagRuleCompliance::NonCompliant => vec![String::new()],
                NagRuleCompliance::NonCompliantFindings(findings) => findings,
            };
            result = findings.iter().try_for_each(|finding| {
                self.report_finding(stack, node, &path, rule.as_ref(), finding, &ignores)
            });
            if result.is_err() {
                break;
            }
        }
        self.rules = rules;
        result
    }

    fn report_finding(
        &mut self,
        stack: &mut Stack,
        node: NodeId,
        path: &str,
        rule: &dyn NagRule,
        finding: &str,
        ignores: &[NagPackSuppression],
    ) -> Result<()> {
        let rule_id = self.full_rule_id(rule);
        let mut reason = None;
        for suppression in ignores {
            if suppression.applies(&rule_id, finding)? {
                reason = Some(suppression.reason.clone());
                break;
            }
        }
        let finding_id = if finding.is_empty() {
            rule_id.clone()
        } else {
            format!("{rule_id}[{finding}]")
        };

        match reason {
            Some(reason) => {
                debug!(rule = %finding_id, path, "Finding suppressed");
                if self.options.log_ignores {
                    stack.annotate(
                        node,
                        AnnotationLevel::Info,
                        format!(
                            "{finding_id} was triggered but suppressed. Provided reason: \"{reason}\""
                        ),
                    );
                }
                let line = self.line(rule, path, finding, NagCompliance::Suppressed, &reason);
                self.record(stack, line);
            }
            None => {
                debug!(rule = %finding_id, path, level = %rule.level(), "Rule triggered");
                let mut message = format!("{finding_id}: {}", rule.info());
                if self.options.verbose {
                    message.push('\n');
                    message.push_str(rule.explanation());
                }
                stack.annotate(node, rule.level().into(), message);
                let line = self.line(rule, path, finding, NagCompliance::NonCompliant, "N/A");
                self.record(stack, line);
            }
        }
        Ok(())
    }

    fn line(
        &self,
        rule: &dyn NagRule,
        path: &str,
        finding: &str,
        compliance: NagCompliance,
        reason: &str,
    ) -> NagReportLine {
        let rule_id = self.full_rule_id(rule);
        NagReportLine {
            rule_id: if finding.is_empty() {
                rule_id
            } else {
                format!("{rule_id}[{finding}]")
            },
            resource_id: path.to_string(),
            compliance,
            exception_reason: reason.to_string(),
            rule_level: rule.level(),
            rule_info: rule.info().to_string(),
        }
    }
}

impl Aspect for NagPack {
    fn name(&self) -> &str {
        &self.name
    }

    fn visit(&mut self, stack: &mut Stack, node: NodeId) -> Result<()> {
        let logical_id = match &stack.node(node)?.kind {
            NodeKind::Resource { logical_id } => logical_id.clone(),
            _ => return Ok(()),
        };
        trace!(pack = %self.name, logical_id = %logical_id, "Checking resource");
        self.check_resource(stack, node, &logical_id)
    }

    fn artifacts(&self, stack: &Stack) -> Result<Vec<AssemblyFile>> {
        if !self.options.reports {
            return Ok(Vec::new());
        }
        let report = self.report(stack);
        self.options
            .report_formats
            .iter()
            .map(|format| {
                Ok(AssemblyFile {
                    name: report.file_name(*format),
                    contents: report.render(*format)?,
                })
            })
            .collect()
    }
}

/// Entry point of the AwsSolutions rule pack.
pub struct AwsSolutionsChecks;

impl AwsSolutionsChecks {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(options: NagPackOptions) -> NagPack {
        NagPack::aws_solutions(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{App, StackProps};
    use crate::template::CfnResource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn open_sg_app() -> (App, NodeId) {
        let mut app = App::new();
        let stack = app.add_stack("S", StackProps::default()).unwrap();
        let sg = stack.add_construct(NodeId::ROOT, "sg", "SecurityGroup").unwrap();
        stack
            .add_resource(
                sg,
                "Resource",
                CfnResource::new("AWS::EC2::SecurityGroup")
                    .with_property("GroupDescription", json!("Workshop ssh security group"))
                    .with_property(
                        "SecurityGroupIngress",
                        json!([{"CidrIp": "0.0.0.0/0", "FromPort": 22, "IpProtocol": "tcp", "ToPort": 22}]),
                    ),
            )
            .unwrap();
        (app, sg)
    }

    #[test]
    fn test_unsuppressed_finding_is_error_annotation() {
        let (mut app, _) = open_sg_app();
        let mut pack = NagPack::aws_solutions(NagPackOptions::default());
        app.apply_aspect(&mut pack).unwrap();

        let stack = app.stack("S").unwrap();
        let errors: Vec<_> = stack.annotations_at(AnnotationLevel::Error).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "AwsSolutions-EC23: The Security Group allows for 0.0.0.0/0 or ::/0 inbound access."
        );
        assert_eq!(errors[0].path, "S/sg/Resource");

        let report = pack.report(stack);
        assert_eq!(report.stats().non_compliant, 1);
        assert_eq!(report.stats().compliant, 1);
    }

    #[test]
    fn test_suppressed_finding_is_reported() {
        let (mut app, sg) = open_sg_app();
        add_resource_suppressions(
            app.stack_mut("S").unwrap(),
            &sg,
            &[NagPackSuppression::new("AwsSolutions-EC23", "Open for the workshop")],
            false,
        )
        .unwrap();
        let mut pack = NagPack::aws_solutions(NagPackOptions {
            log_ignores: true,
            ..NagPackOptions::default()
        });
        app.apply_aspect(&mut pack).unwrap();

        let stack = app.stack("S").unwrap();
        assert_eq!(stack.annotations_at(AnnotationLevel::Error).count(), 0);
        let infos: Vec<_> = stack.annotations_at(AnnotationLevel::Info).collect();
        assert_eq!(
            infos[0].message,
            "AwsSolutions-EC23 was triggered but suppressed. Provided reason: \"Open for the workshop\""
        );

        let report = pack.report(stack);
        let line = report
            .lines
            .iter()
            .find(|l| l.compliance == NagCompliance::Suppressed)
            .unwrap();
        assert_eq!(line.rule_id, "AwsSolutions-EC23");
        assert_eq!(line.exception_reason, "Open for the workshop");
    }

    #[test]
    fn test_verbose_appends_explanation() {
        let (mut app, _) = open_sg_app();
        let mut pack = NagPack::aws_solutions(NagPackOptions {
            verbose: true,
            ..NagPackOptions::default()
        });
        app.apply_aspect(&mut pack).unwrap();
        let stack = app.stack("S").unwrap();
        let error = stack.annotations_at(AnnotationLevel::Error).next().unwrap();
        assert!(error.message.contains("\nLarge port ranges"));
    }

    #[test]
    fn test_revisiting_does_not_duplicate_lines() {
        let (mut app, _) = open_sg_app();
        let mut pack = NagPack::aws_solutions(NagPackOptions::default());
        app.apply_aspect(&mut pack).unwrap();
        app.apply_aspect(&mut pack).unwrap();
        let stack = app.stack("S").unwrap();
        assert_eq!(pack.report(stack).lines.len(), 2);
        assert_eq!(stack.annotations_at(AnnotationLevel::Error).count(), 1);
    }

    #[test]
    fn test_artifacts_follow_formats() {
        let (mut app, _) = open_sg_app();
        let mut pack = NagPack::aws_solutions(NagPackOptions {
            report_formats: vec![ReportFormat::Csv, ReportFormat::Json],
            ..NagPackOptions::default()
        });
        app.apply_aspect(&mut pack).unwrap();
        let names: Vec<String> = pack
            .artifacts(app.stack("S").unwrap())
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, ["AwsSolutions-S-NagReport.csv", "AwsSolutions-S-NagReport.json"]);

        let quiet = NagPack::aws_solutions(NagPackOptions {
            reports: false,
            ..NagPackOptions::default()
        });
        assert!(quiet.artifacts(app.stack("S").unwrap()).unwrap().is_empty());
    }
}
