//! Tests for running the AwsSolutions pack over the workshop stack

use nagstack::config::Environment;
use nagstack::nag::suppressions::{add_resource_suppressions, METADATA_KEY};
use nagstack::nag::{NagCompliance, NagReport};
use nagstack::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

const KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQ workshop";

fn workshop_app() -> (App, WorkshopStack) {
    let mut app = App::new();
    let workshop = WorkshopStack::new(
        &mut app,
        "NaggingCanBeGoodStack",
        WorkshopStackProps {
            stack: StackProps {
                env: Some(Environment::new(None, Some("eu-central-1".into()))),
                ..StackProps::default()
            },
            ssh_pub_key: KEY.to_string(),
        },
    )
    .unwrap();
    (app, workshop)
}

fn check(app: &mut App, options: NagPackOptions) -> NagReport {
    let mut pack = AwsSolutionsChecks::new(options);
    app.apply_aspect(&mut pack).unwrap();
    pack.report(app.stack("NaggingCanBeGoodStack").unwrap())
}

fn rule_ids(report: &NagReport, compliance: NagCompliance) -> Vec<String> {
    report
        .lines
        .iter()
        .filter(|l| l.compliance == compliance)
        .map(|l| l.rule_id.clone())
        .collect()
}

#[test]
fn test_workshop_stack_is_compliant_after_suppressions() {
    let (mut app, _) = workshop_app();
    let report = check(&mut app, NagPackOptions::default());

    assert_eq!(rule_ids(&report, NagCompliance::NonCompliant), Vec::<String>::new());
    assert_eq!(report.blocking_lines().count(), 0);

    let suppressed = rule_ids(&report, NagCompliance::Suppressed);
    assert_eq!(suppressed.len(), 6);
    assert_eq!(suppressed.iter().filter(|id| *id == "AwsSolutions-EC23").count(), 2);
    assert!(suppressed.contains(&"AwsSolutions-IAM5[Resource::*]".to_string()));
    assert!(suppressed.contains(&"AwsSolutions-EC28".to_string()));
    assert!(suppressed.contains(&"AwsSolutions-EC29".to_string()));
    assert!(suppressed
        .iter()
        .any(|id| id.starts_with("AwsSolutions-IAM4[Policy::") && id.contains("CloudWatchAgentServerPolicy")));

    let stack = app.stack("NaggingCanBeGoodStack").unwrap();
    assert_eq!(stack.annotations_at(AnnotationLevel::Error).count(), 0);
}

#[test]
fn test_suppressed_lines_carry_reasons() {
    let (mut app, workshop) = workshop_app();
    let report = check(&mut app, NagPackOptions::default());
    let path = "NaggingCanBeGoodStack/workshop-ec2-instance/Resource";

    let ec29 = report
        .lines
        .iter()
        .find(|l| l.rule_id == "AwsSolutions-EC29")
        .unwrap();
    assert_eq!(ec29.resource_id, path);
    assert_eq!(
        ec29.exception_reason,
        "No termination protection needed for this workshop"
    );

    let stack = workshop.stack(&app).unwrap();
    assert_eq!(
        stack.resource(workshop.instance().resource()).unwrap().path(),
        Some(path)
    );
}

#[test]
fn test_vpc_flow_log_satisfies_vpc7() {
    let (mut app, _) = workshop_app();
    let report = check(&mut app, NagPackOptions::default());
    let vpc7: Vec<_> = report
        .lines
        .iter()
        .filter(|l| l.rule_id == "AwsSolutions-VPC7")
        .collect();
    assert_eq!(vpc7.len(), 1);
    assert_eq!(vpc7[0].compliance, NagCompliance::Compliant);
    assert_eq!(vpc7[0].exception_reason, "N/A");
}

#[test]
fn test_log_ignores_records_info_annotations() {
    let (mut app, _) = workshop_app();
    check(
        &mut app,
        NagPackOptions {
            log_ignores: true,
            ..NagPackOptions::default()
        },
    );
    let stack = app.stack("NaggingCanBeGoodStack").unwrap();
    let infos: Vec<String> = stack
        .annotations_at(AnnotationLevel::Info)
        .map(|a| a.message.clone())
        .collect();
    assert_eq!(infos.len(), 6);
    assert!(infos.contains(
        &"AwsSolutions-EC28 was triggered but suppressed. Provided reason: \"Basic monitoring is enough for this workshop\""
            .to_string()
    ));
}

#[test]
fn test_removing_a_suppression_blocks_synthesis() {
    let (mut app, workshop) = workshop_app();
    app.stack_mut("NaggingCanBeGoodStack")
        .unwrap()
        .resource_mut(workshop.instance().resource())
        .unwrap()
        .metadata
        .shift_remove(METADATA_KEY);
    app.add_aspect(AwsSolutionsChecks::new(NagPackOptions::default()));

    let dir = TempDir::new().unwrap();
    let err = app.synth(dir.path()).unwrap_err();
    let Error::SynthesisBlocked(errors) = &err else {
        panic!("expected blocked synthesis, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with(
        "[Error at /NaggingCanBeGoodStack/workshop-ec2-instance/Resource] AwsSolutions-EC28: "
    ));
    assert!(errors[1].contains("AwsSolutions-EC29: "));
    assert_eq!(err.exit_code(), 2);

    // The report is still written for inspection.
    let csv = std::fs::read_to_string(
        dir.path().join("AwsSolutions-NaggingCanBeGoodStack-NagReport.csv"),
    )
    .unwrap();
    assert!(csv.contains("\"AwsSolutions-EC28\",\"NaggingCanBeGoodStack/workshop-ec2-instance/Resource\",\"Non-Compliant\",\"N/A\""));
}

#[test]
fn test_resource_wildcard_suppression_does_not_hide_action_wildcards() {
    let (mut app, workshop) = workshop_app();
    {
        let stack = app.stack_mut("NaggingCanBeGoodStack").unwrap();
        let role = stack.resource_mut(workshop.role().resource()).unwrap();
        role.set_property(
            "Policies",
            json!([{
                "PolicyDocument": {
                    "Statement": [{"Action": "logs:*", "Effect": "Allow", "Resource": "*"}],
                    "Version": "2012-10-17"
                },
                "PolicyName": "RetentionPolicy"
            }]),
        );
    }
    let report = check(&mut app, NagPackOptions::default());

    assert_eq!(
        rule_ids(&report, NagCompliance::NonCompliant),
        vec!["AwsSolutions-IAM5[Action::logs:*]".to_string()]
    );
    assert!(rule_ids(&report, NagCompliance::Suppressed)
        .contains(&"AwsSolutions-IAM5[Resource::*]".to_string()));
}

#[test]
fn test_verbose_annotations_include_explanation() {
    let (mut app, workshop) = workshop_app();
    app.stack_mut("NaggingCanBeGoodStack")
        .unwrap()
        .resource_mut(workshop.ssh_security_group().resource())
        .unwrap()
        .metadata
        .shift_remove(METADATA_KEY);
    check(
        &mut app,
        NagPackOptions {
            verbose: true,
            ..NagPackOptions::default()
        },
    );

    let stack = app.stack("NaggingCanBeGoodStack").unwrap();
    let errors: Vec<_> = stack.annotations_at(AnnotationLevel::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "NaggingCanBeGoodStack/workshop-ssh-sg/Resource");
    let (summary, explanation) = errors[0].message.split_once('\n').unwrap();
    assert_eq!(
        summary,
        "AwsSolutions-EC23: The Security Group allows for 0.0.0.0/0 or ::/0 inbound access."
    );
    assert!(!explanation.is_empty());
}

#[test]
fn test_short_reason_is_rejected() {
    let (mut app, workshop) = workshop_app();
    let stack = app.stack_mut("NaggingCanBeGoodStack").unwrap();
    let err = add_resource_suppressions(
        stack,
        workshop.vpc(),
        &[NagPackSuppression::new("AwsSolutions-VPC7", "too short")],
        false,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidSuppression { .. }));
}

#[test]
fn test_regex_suppression_covers_every_managed_policy() {
    let (mut app, workshop) = workshop_app();
    {
        let stack = app.stack_mut("NaggingCanBeGoodStack").unwrap();
        stack
            .resource_mut(workshop.role().resource())
            .unwrap()
            .metadata
            .shift_remove(METADATA_KEY);
        add_resource_suppressions(
            stack,
            workshop.role(),
            &[
                NagPackSuppression::new("AwsSolutions-IAM4", "Managed policies are fine here")
                    .applies_to(vec![SuppressionTarget::regex("/^Policy::.*$/g")]),
                NagPackSuppression::new("AwsSolutions-IAM5", "Wildcards are fine here"),
            ],
            false,
        )
        .unwrap();
    }
    let report = check(&mut app, NagPackOptions::default());
    assert_eq!(report.blocking_lines().count(), 0);
}
