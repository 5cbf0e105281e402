//! End-to-end orchestration tests with a mock generator

use std::fs;
use std::path::Path;

use xbuild::mock::MockGenerator;
use xbuild::orchestrate::{OrchestrateError, Orchestrator, OrchestratorConfig};
use xbuild::spec::{Arch, OsName, PlatformFamily, SPEC_FILE_NAME};
use xbuild::summary::{FailureKind, Status};

fn write_spec(dir: &Path, doc: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(SPEC_FILE_NAME), doc).unwrap();
}

fn orchestrator_for(dir: &Path, families: &[PlatformFamily], mock: &MockGenerator) -> Orchestrator {
    let mut config = OrchestratorConfig::new(dir);
    config.families = families.to_vec();
    Orchestrator::new(config).with_generator(Box::new(mock.clone()))
}

const PARENT: &str = r#"
project = "libpng"

[common]
archs = ["x64"]
build_dir = "build"
build_out_dir = "../libs"
subdirectories = ["zlib"]

[common.libraries.zlib]
name = "zlib"

[common.copy]
"*.a" = "static"

[platforms.linux.linux]
"#;

const CHILD: &str = r#"
project = "zlib"

[common]
archs = ["x64"]
build_dir = "build"
build_out_dir = "../libs"

[common.copy]
"*.a" = "static"

[platforms.linux.linux]
"#;

#[test]
fn test_dependency_built_before_consumer() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("libpng");
    write_spec(&root, PARENT);
    write_spec(&root.join("zlib"), CHILD);

    let mock = MockGenerator::new();
    let report = orchestrator_for(&root, &[PlatformFamily::Linux], &mock)
        .run()
        .unwrap();

    assert_eq!(report.summary.status, Status::Success);
    assert_eq!(report.summary.exit_code, 0);
    assert_eq!(mock.invoked_projects(), vec!["zlib", "libpng"]);

    // The consumer's configure saw the dependency's artifact.
    let invocations = mock.invocations();
    assert_eq!(invocations[1].project, "libpng");
    assert_eq!(invocations[1].link_inputs.len(), 1);
    assert!(invocations[1].link_inputs[0]
        .path
        .to_string_lossy()
        .contains("libzlib.a"));

    // Both levels collected into their own output layout.
    assert!(root.join("libs/linux/x64/static/libzlib.a").exists());
    assert!(tmp
        .path()
        .join("libs/linux/x64/static/liblibpng.a")
        .exists());
}

#[test]
fn test_empty_arch_override_rejects_only_that_os_target() {
    let tmp = tempfile::tempdir().unwrap();
    write_spec(
        tmp.path(),
        r#"
project = "libpng"

[common]
archs = ["x64"]

[platforms.win32.windows]

[platforms.win32.android]
archs = []
"#,
    );

    let mock = MockGenerator::new();
    let report = orchestrator_for(tmp.path(), &[PlatformFamily::Win32], &mock)
        .run()
        .unwrap();

    assert_eq!(report.summary.status, Status::Failed);
    assert_eq!(report.summary.exit_code, 12);
    assert_eq!(report.summary.plans_succeeded, 1);
    assert_eq!(report.summary.plans_failed, 1);

    // The windows target still built.
    assert_eq!(mock.invoked_projects(), vec!["libpng"]);
    let rejected: Vec<_> = report
        .plan_summaries
        .iter()
        .filter(|s| s.failure_kind == Some(FailureKind::EmptyArchitectureList))
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].os, OsName::Android);
    assert!(rejected[0].arch.is_none());
}

#[test]
fn test_cycle_detected_before_any_invocation() {
    let tmp = tempfile::tempdir().unwrap();
    write_spec(
        &tmp.path().join("a"),
        r#"
project = "a"
[common]
archs = ["x64"]
subdirectories = ["../b"]
[platforms.linux.linux]
"#,
    );
    write_spec(
        &tmp.path().join("b"),
        r#"
project = "b"
[common]
archs = ["x64"]
subdirectories = ["../a"]
[platforms.linux.linux]
"#,
    );

    let mock = MockGenerator::new();
    let err = orchestrator_for(&tmp.path().join("a"), &[PlatformFamily::Linux], &mock)
        .run()
        .unwrap_err();

    assert!(matches!(err, OrchestrateError::Compose(_)));
    assert_eq!(err.exit_code().as_i32(), 13);
    assert!(mock.invocations().is_empty(), "nothing may run on a cyclic graph");
}

#[test]
fn test_subdirectory_override_drops_common_dependency() {
    let tmp = tempfile::tempdir().unwrap();
    write_spec(
        tmp.path(),
        r#"
project = "libpng"

[common]
archs = ["x64"]
subdirectories = ["zlib"]

[platforms.linux.linux]
subdirectories = []
"#,
    );
    write_spec(&tmp.path().join("zlib"), CHILD);

    let mock = MockGenerator::new();
    let report = orchestrator_for(tmp.path(), &[PlatformFamily::Linux], &mock)
        .run()
        .unwrap();

    // The override's empty list replaces the common list, so only the
    // root project builds for this target.
    assert_eq!(report.summary.exit_code, 0);
    assert_eq!(mock.invoked_projects(), vec!["libpng"]);
}

#[test]
fn test_subdirectory_added_by_override_is_built() {
    let tmp = tempfile::tempdir().unwrap();
    write_spec(
        tmp.path(),
        r#"
project = "libpng"

[common]
archs = ["x64"]

[platforms.linux.linux]
subdirectories = ["zlib"]
"#,
    );
    write_spec(&tmp.path().join("zlib"), CHILD);

    let mock = MockGenerator::new();
    let report = orchestrator_for(tmp.path(), &[PlatformFamily::Linux], &mock)
        .run()
        .unwrap();

    assert_eq!(report.summary.exit_code, 0);
    assert_eq!(mock.invoked_projects(), vec!["zlib", "libpng"]);
}

#[test]
fn test_second_run_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("libpng");
    write_spec(&root, PARENT);
    write_spec(&root.join("zlib"), CHILD);

    let mock = MockGenerator::new();
    let first = orchestrator_for(&root, &[PlatformFamily::Linux], &mock)
        .run()
        .unwrap();
    let second = orchestrator_for(&root, &[PlatformFamily::Linux], &mock)
        .run()
        .unwrap();

    assert_eq!(first.summary.exit_code, 0);
    assert_eq!(second.summary.exit_code, 0);
    assert_ne!(first.records_dir, second.records_dir, "each run keeps its own records");
    assert!(tmp.path().join("libs/linux/x64/static/liblibpng.a").exists());
}

#[test]
fn test_matrix_covers_every_arch() {
    let tmp = tempfile::tempdir().unwrap();
    write_spec(
        tmp.path(),
        r#"
project = "libpng"

[common]
archs = ["x64"]

[platforms.win32.windows]
archs = ["x86", "x64"]

[platforms.win32.android]
archs = ["x86", "x86_64", "armeabi-v7a", "arm64-v8a"]
"#,
    );

    let mock = MockGenerator::new();
    let report = orchestrator_for(tmp.path(), &[PlatformFamily::Win32], &mock)
        .run()
        .unwrap();

    assert_eq!(report.summary.status, Status::Success);
    assert_eq!(report.summary.plan_count, 6);
    assert_eq!(report.summary.plans_succeeded, 6);

    let mut archs: Vec<Arch> = mock.invocations().iter().map(|inv| inv.arch).collect();
    archs.sort();
    archs.dedup();
    assert_eq!(archs.len(), 5, "x64 appears for both windows and android");
}

#[test]
fn test_run_plan_written_with_rejections() {
    let tmp = tempfile::tempdir().unwrap();
    write_spec(
        tmp.path(),
        r#"
project = "libpng"

[common]
archs = ["x64"]

[platforms.linux.linux]
archs = []
"#,
    );

    let mock = MockGenerator::new();
    let report = orchestrator_for(tmp.path(), &[PlatformFamily::Linux], &mock)
        .run()
        .unwrap();

    let plan_json = fs::read_to_string(report.records_dir.join("run_plan.json")).unwrap();
    assert!(plan_json.contains(r#""schema_id": "xbuild/run_plan@1""#));
    assert!(plan_json.contains(r#""rejected": true"#));

    let summary_json = fs::read_to_string(report.records_dir.join("run_summary.json")).unwrap();
    assert!(summary_json.contains(r#""exit_code": 12"#));
}

#[test]
fn test_generator_failure_reported_with_chain() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("libpng");
    write_spec(&root, PARENT);
    write_spec(&root.join("zlib"), CHILD);

    let mock = MockGenerator::new();
    mock.fail_project("zlib");
    let report = orchestrator_for(&root, &[PlatformFamily::Linux], &mock)
        .run()
        .unwrap();

    assert_eq!(report.summary.exit_code, 30);
    assert_eq!(report.plan_summaries.len(), 1);
    let failed = &report.plan_summaries[0];
    assert_eq!(failed.failure_kind, Some(FailureKind::GeneratorFailed));
    assert_eq!(failed.subdirectory_chain, vec!["libpng", "zlib"]);

    // The consumer never ran after its dependency failed.
    assert_eq!(mock.invoked_projects(), vec!["zlib"]);
}
