//! Integration tests for the full pipeline

use novella_infra::config::{Config, IngressPlacement};
use novella_infra::generator::plan::generate_waves;
use novella_infra::pipeline::Pipeline;
use novella_infra::validation::ValidationWarning;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// Create a build context with a Dockerfile and a couple of sources
fn create_context(root: &Path) -> PathBuf {
    let context = root.join("app");
    fs::create_dir_all(context.join("src")).unwrap();
    fs::write(
        context.join("Dockerfile"),
        "FROM node:20\nCOPY . .\nCMD [\"node\", \"src/index.js\"]\n",
    )
    .unwrap();
    fs::write(
        context.join("src/index.js"),
        "require('http').createServer().listen(80);\n",
    )
    .unwrap();
    context
}

/// Create a test config that reads and writes inside the temp directory
fn create_test_config(temp: &TempDir) -> Config {
    let mut config = Config::default_config();
    config.app.image.context = create_context(temp.path());
    config.output.template_file = temp.path().join("out/novella.template.json");
    config.output.plan_file = temp.path().join("out/novella.plan.txt");
    config
}

fn read_template(config: &Config) -> Value {
    let content = fs::read_to_string(&config.output.template_file).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_synth_writes_template_and_plan() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);

    let report = Pipeline::new(false).run(&config).unwrap();
    assert!(report.written);
    assert_eq!(report.image_tag.len(), 12);
    assert!(config.output.template_file.exists());
    assert!(config.output.plan_file.exists());

    let template = read_template(&config);
    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    assert_eq!(template["Resources"]["Vpc"]["Properties"]["CidrBlock"], "10.0.0.0/16");
    assert_eq!(
        template["Resources"]["PrivateNamespace"]["Properties"]["Name"],
        "novella.local"
    );
    assert_eq!(
        report.diff.added.len(),
        report.resources - 1,
        "image build is not a resource"
    );

    let plan = fs::read_to_string(&config.output.plan_file).unwrap();
    assert!(plan.contains(&format!(":{}", report.image_tag)));
}

#[test]
fn test_second_run_reports_no_changes() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);
    let pipeline = Pipeline::new(false);

    pipeline.run(&config).unwrap();
    let first = fs::read(&config.output.template_file).unwrap();

    let report = pipeline.run(&config).unwrap();
    assert!(!report.written);
    assert!(report.diff.is_empty());
    assert!(report.diff.modified.is_empty());
    assert_eq!(fs::read(&config.output.template_file).unwrap(), first);
}

#[test]
fn test_force_rewrites_identical_template() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);

    Pipeline::new(false).run(&config).unwrap();
    fs::remove_file(&config.output.plan_file).unwrap();

    let report = Pipeline::new(false).with_force(true).run(&config).unwrap();
    assert!(report.written);
    assert!(report.diff.is_empty());
    assert!(config.output.plan_file.exists());
}

#[test]
fn test_context_change_updates_image_tag() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);
    let pipeline = Pipeline::new(false);

    let first = pipeline.run(&config).unwrap();
    fs::write(
        config.app.image.context.join("src/index.js"),
        "require('http').createServer().listen(8080);\n",
    )
    .unwrap();
    let second = pipeline.run(&config).unwrap();

    assert_ne!(first.image_tag, second.image_tag);
    assert!(second.written);
    assert_eq!(second.diff.modified, vec!["AppServiceTask".to_string()]);
    assert!(second.diff.added.is_empty());
    assert!(second.diff.removed.is_empty());
    // metadata carries the new tag
    assert!(second.diff.header_changed);
}

#[test]
fn test_outputs_inside_context_are_stable() {
    let temp = tempdir().unwrap();
    let mut config = create_test_config(&temp);
    let out = config.app.image.context.join("deploy/out");
    config.output.template_file = out.join("novella.template.json");
    config.output.plan_file = out.join("novella.plan.txt");
    let pipeline = Pipeline::new(false);

    let first = pipeline.run(&config).unwrap();
    assert!(first.written);
    let rendered = fs::read(&config.output.template_file).unwrap();

    for _ in 0..2 {
        let report = pipeline.run(&config).unwrap();
        assert_eq!(report.image_tag, first.image_tag);
        assert!(!report.written);
        assert!(!report.plan_written);
        assert!(report.diff.is_empty());
    }
    assert_eq!(fs::read(&config.output.template_file).unwrap(), rendered);
}

#[test]
fn test_missing_plan_is_rewritten() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);
    let pipeline = Pipeline::new(false);

    pipeline.run(&config).unwrap();
    let plan = fs::read_to_string(&config.output.plan_file).unwrap();
    fs::remove_file(&config.output.plan_file).unwrap();

    let report = pipeline.run(&config).unwrap();
    assert!(!report.written);
    assert!(report.plan_written);
    assert_eq!(fs::read_to_string(&config.output.plan_file).unwrap(), plan);

    let report = pipeline.run(&config).unwrap();
    assert!(!report.plan_written);
}

#[test]
fn test_moved_plan_is_written() {
    let temp = tempdir().unwrap();
    let mut config = create_test_config(&temp);
    let pipeline = Pipeline::new(false);
    pipeline.run(&config).unwrap();

    config.output.plan_file = temp.path().join("plans/novella.plan.txt");
    let report = pipeline.run(&config).unwrap();
    assert!(!report.written);
    assert!(report.plan_written);
    assert!(config.output.plan_file.exists());
}

#[test]
fn test_stale_plan_is_replaced() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);
    let pipeline = Pipeline::new(false);
    pipeline.run(&config).unwrap();

    fs::write(&config.output.plan_file, "hand edited\n").unwrap();
    let report = pipeline.run(&config).unwrap();
    assert!(report.plan_written);
    let plan = fs::read_to_string(&config.output.plan_file).unwrap();
    assert!(plan.starts_with("Stack: novella\n"));
}

#[test]
fn test_excluded_directories_do_not_change_tag() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);
    let pipeline = Pipeline::new(false);

    let before = pipeline.resolve_image_tag(&config).unwrap();
    let modules = config.app.image.context.join("node_modules/left-pad");
    fs::create_dir_all(&modules).unwrap();
    fs::write(modules.join("index.js"), "module.exports = 1;\n").unwrap();

    assert_eq!(pipeline.resolve_image_tag(&config).unwrap(), before);
}

#[test]
fn test_pinned_tag_skips_context() {
    let temp = tempdir().unwrap();
    let mut config = create_test_config(&temp);
    config.app.image.context = temp.path().join("does-not-exist");
    config.app.image.tag = Some("v1.2.3".to_string());

    let report = Pipeline::new(false).run(&config).unwrap();
    assert_eq!(report.image_tag, "v1.2.3");
}

#[test]
fn test_output_is_load_balancer_url() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);
    Pipeline::new(false).run(&config).unwrap();

    let template = read_template(&config);
    let url = &template["Outputs"]["Url"]["Value"]["Fn::Join"];
    assert_eq!(url[1][0], "http://");
    assert_eq!(url[1][1]["Fn::GetAtt"][0], "Alb");
    assert_eq!(url[1][1]["Fn::GetAtt"][1], "DNSName");
}

#[test]
fn test_workloads_are_private() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);
    Pipeline::new(false).run(&config).unwrap();
    let template = read_template(&config);

    for service in ["AppService", "PostgresService"] {
        let network = &template["Resources"][service]["Properties"]["NetworkConfiguration"]
            ["AwsvpcConfiguration"];
        assert_eq!(network["AssignPublicIp"], "DISABLED");
        for subnet in network["Subnets"].as_array().unwrap() {
            let id = subnet["Ref"].as_str().unwrap();
            assert!(id.starts_with("VpcPrivate"), "{} runs in {}", service, id);
        }
    }

    let mount_targets: Vec<&str> = template["Resources"]
        .as_object()
        .unwrap()
        .iter()
        .filter(|(_, r)| r["Type"] == "AWS::EFS::MountTarget")
        .map(|(id, _)| id.as_str())
        .collect();
    assert_eq!(mount_targets, vec!["EfsMountTarget", "EfsMountTarget2"]);
}

#[test]
fn test_legacy_ingress_layout_warns() {
    let temp = tempdir().unwrap();
    let mut config = create_test_config(&temp);
    config.security.public_ingress_group = IngressPlacement::Internal;

    let report = Pipeline::new(false).run(&config).unwrap();
    assert!(report
        .validation
        .warnings
        .iter()
        .any(|w| matches!(w, ValidationWarning::PublicIngressOnWorkloadGroup { .. })));

    let template = read_template(&config);
    assert_eq!(
        template["Resources"]["AllTrafficIn"]["Properties"]["GroupId"]["Ref"],
        "SecurityGroup"
    );
}

#[test]
fn test_validation_errors_write_nothing() {
    let temp = tempdir().unwrap();
    let mut config = create_test_config(&temp);
    config.load_balancer.health_check.unhealthy_threshold = 20;

    let err = Pipeline::new(false).run(&config).unwrap_err();
    assert!(err.to_string().contains("[E004]"), "{}", err);
    assert!(!config.output.template_file.exists());
    assert!(!config.output.plan_file.exists());
}

#[test]
fn test_config_save_and_load() {
    let temp = tempdir().unwrap();
    let mut config = create_test_config(&temp);
    config.network.zone_count = 3;
    config.stack.logical_id_prefix = "Novella".to_string();

    let path = temp.path().join("infra/novella-infra.toml");
    config.save(&path).unwrap();
    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.network.zone_count, 3);

    let report = Pipeline::new(false).run(&loaded).unwrap();
    let template = read_template(&loaded);
    assert!(template["Resources"]["NovellaEfsMountTarget3"].is_object());
    assert!(template["Resources"]["NovellaVpcPrivate3"].is_object());
    assert!(report.resources > 0);
}

#[test]
fn test_validate_reports_errors() {
    let temp = tempdir().unwrap();
    let mut config = create_test_config(&temp);
    config.load_balancer.health_check.unhealthy_threshold = 20;

    let synthesis = Pipeline::new(false).synthesize(&config).unwrap();
    assert!(synthesis.validation.has_errors());
    let err = synthesis.ensure_valid().unwrap_err();
    assert!(err.to_string().starts_with("Validation failed with 1 error(s):"));
    assert!(err.to_string().contains("[E004]"), "{}", err);
}

#[test]
fn test_validate_accepts_default_stack() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);

    let synthesis = Pipeline::new(false).synthesize(&config).unwrap();
    synthesis.ensure_valid().unwrap();
    assert_eq!(synthesis.image_tag().len(), 12);
    assert!(!config.output.template_file.exists());
}

#[test]
fn test_graph_lists_every_resource_once() {
    let temp = tempdir().unwrap();
    let config = create_test_config(&temp);

    let synthesis = Pipeline::new(false).synthesize(&config).unwrap();
    let waves = generate_waves(&synthesis.graph);
    assert!(waves.starts_with("Wave 1:\n"));

    let listed: Vec<&str> = waves
        .lines()
        .filter(|l| l.starts_with("  "))
        .map(|l| l.trim_start().split(' ').next().unwrap())
        .collect();
    assert_eq!(listed, synthesis.graph.order());
    assert!(waves.contains("  postgres-service <- "));
    assert!(waves.contains("efs-mount-target (explicit)"));
}

#[test]
fn test_init_refuses_existing_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("novella-infra.toml");
    fs::write(&path, "[stack]\nname = \"mine\"\n").unwrap();

    let err = Config::init(&path, false).unwrap_err();
    assert!(err.to_string().contains("Use --force to overwrite"), "{}", err);
    assert!(fs::read_to_string(&path).unwrap().contains("mine"));

    let config = Config::init(&path, true).unwrap();
    assert_eq!(config.stack.name, "novella");
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("name = \"novella\""));
}
