//! End-to-end synthesis of the workshop app

use nagstack::config::{Config, Environment, Settings};
use nagstack::nag::ReportFormat;
use nagstack::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn settings(formats: Vec<ReportFormat>) -> Settings {
    let mut config = Config::default();
    config.nag.report_formats = formats;
    Settings {
        config,
        ssh_pub_key: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 dev@laptop".to_string(),
        environment: Environment::new(Some("123456789012".into()), Some("eu-central-1".into())),
    }
}

fn read_json(path: std::path::PathBuf) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_synthesizes_workshop_assembly() {
    let dir = TempDir::new().unwrap();
    let (mut app, workshop) = build_app(&settings(vec![ReportFormat::Csv])).unwrap();
    let assembly = app.synth(dir.path()).unwrap();

    assert_eq!(
        assembly.files,
        [
            "NaggingCanBeGoodStack.template.json",
            "AwsSolutions-NaggingCanBeGoodStack-NagReport.csv",
            "manifest.json",
            "tree.json",
            "cdk.out",
        ]
    );

    let template = read_json(assembly.path("NaggingCanBeGoodStack.template.json"));
    let instance_id = &workshop.instance().resource().logical_id;
    assert_eq!(template["Resources"][instance_id]["Type"], "AWS::EC2::Instance");
    assert_eq!(
        template["Outputs"]["sshcommand"]["Value"]["Fn::Join"][1][0],
        "ssh -i live ubuntu@"
    );
    assert_eq!(
        template["Resources"][instance_id]["Metadata"]["cdk_nag"]["rules_to_suppress"][0]["id"],
        "AwsSolutions-EC28"
    );

    let manifest = read_json(assembly.path("manifest.json"));
    let artifact = &manifest["artifacts"]["NaggingCanBeGoodStack"];
    assert_eq!(artifact["environment"], "aws://123456789012/eu-central-1");
    assert_eq!(manifest["artifacts"]["Tree"]["type"], "cdk:tree");

    let tree = read_json(assembly.path("tree.json"));
    assert!(tree["tree"]["children"]["NaggingCanBeGoodStack"]["children"]["workshop-vpc"].is_object());
}

#[test]
fn test_report_formats_follow_config() {
    let dir = TempDir::new().unwrap();
    let (mut app, _) =
        build_app(&settings(vec![ReportFormat::Json, ReportFormat::Text])).unwrap();
    let assembly = app.synth(dir.path()).unwrap();

    assert!(assembly
        .files
        .contains(&"AwsSolutions-NaggingCanBeGoodStack-NagReport.json".to_string()));
    assert!(assembly
        .files
        .contains(&"AwsSolutions-NaggingCanBeGoodStack-NagReport.txt".to_string()));

    let report = read_json(assembly.path("AwsSolutions-NaggingCanBeGoodStack-NagReport.json"));
    let lines = report["lines"].as_array().unwrap();
    let suppressed = lines
        .iter()
        .filter(|l| l["compliance"] == "Suppressed")
        .count();
    assert_eq!(suppressed, 6);
    assert!(lines.iter().all(|l| l["compliance"] != "Non-Compliant"));
    assert!(lines[0]["ruleId"].is_string());
}

#[test]
fn test_disabled_nag_writes_no_reports() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings(vec![ReportFormat::Csv]);
    settings.config.nag.enabled = false;
    let (mut app, _) = build_app(&settings).unwrap();
    let assembly = app.synth(dir.path()).unwrap();

    assert!(assembly.files.iter().all(|f| !f.contains("NagReport")));
}

#[test]
fn test_stack_name_from_config() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings(vec![ReportFormat::Csv]);
    settings.config.app.stack_name = "WorkshopDev".to_string();
    let (mut app, _) = build_app(&settings).unwrap();
    let assembly = app.synth(dir.path()).unwrap();

    let artifact = assembly.stack("WorkshopDev").unwrap();
    assert_eq!(artifact.template_file, "WorkshopDev.template.json");
    assert!(dir.path().join("AwsSolutions-WorkshopDev-NagReport.csv").exists());
}

#[test]
fn test_repeated_synth_is_stable() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let (mut app, _) = build_app(&settings(vec![ReportFormat::Csv])).unwrap();
    app.synth(first.path()).unwrap();
    app.synth(second.path()).unwrap();

    let name = "NaggingCanBeGoodStack.template.json";
    assert_eq!(
        fs::read_to_string(first.path().join(name)).unwrap(),
        fs::read_to_string(second.path().join(name)).unwrap()
    );
}
