//! End-to-end tests for the `validate` command.

mod common;
use common::prelude::*;

#[test]
fn test_validate_valid_metafile() {
    let fixture = TestFixture::new().with_file("meta.yaml", metafiles::MINIMAL);

    fixture
        .command()
        .args(["validate", "meta.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] meta.yaml is valid"))
        .stdout(predicate::str::contains("chart app 1.0.0, 2 file(s), 4 declared value(s)"));
}

#[test]
fn test_validate_missing_chart_fields() {
    let fixture = TestFixture::new().with_file("meta.yaml", metafiles::MISSING_VERSION);

    fixture
        .command()
        .args(["validate", "meta.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("the fields are missing: chart.version"));
}

#[test]
fn test_validate_undeclared_key_with_suggestion() {
    let fixture = TestFixture::new().with_file("meta.yaml", metafiles::UNDECLARED_KEY);

    fixture
        .command()
        .args(["validate", "meta.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "found values that aren't described in valuesSchema section: replica",
        ))
        .stdout(predicate::str::contains("did you mean 'replicas'?"));
}

#[test]
fn test_validate_unknown_data_type() {
    let fixture = TestFixture::new().with_file("meta.yaml", metafiles::BAD_TYPE);

    fixture
        .command()
        .args(["validate", "meta.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("replicas (unknown data type: number)"));
}

#[test]
fn test_validate_missing_metafile() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .args(["validate", "absent.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Metafile not found"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_validate_values_against_schema() {
    let fixture = TestFixture::new()
        .with_file("meta.yaml", metafiles::MINIMAL)
        .with_file("values.yaml", "environment: prod\nimage:\n  tag: '1.25'\n");

    fixture
        .command()
        .args(["validate", "meta.yaml", "--values", "values.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("values match valuesSchema"));
}

#[test]
fn test_validate_values_type_mismatch() {
    let fixture = TestFixture::new()
        .with_file("meta.yaml", metafiles::MINIMAL)
        .with_file("values.yaml", "image:\n  tag: '1.25'\nreplicas: many\n");

    fixture
        .command()
        .args(["validate", "meta.yaml", "--values", "values.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("replicas: expected integer, found string"));
}

#[test]
fn test_validate_missing_required_value() {
    let fixture = TestFixture::new().with_file("meta.yaml", metafiles::MINIMAL);

    fixture
        .command()
        .args(["validate", "meta.yaml", "--set", "environment=dev"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("image.tag: required value is missing"));
}

#[test]
fn test_validate_strict_fails_on_missing_values() {
    let fixture = TestFixture::new().with_file("meta.yaml", metafiles::MINIMAL);

    fixture
        .command()
        .args(["validate", "meta.yaml", "--set", "image.tag=v1", "--strict"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[WARN] environment is declared but has no value"))
        .stderr(predicate::str::contains("--strict"));
}

#[test]
fn test_validate_json_schema_violation() {
    let fixture = TestFixture::new()
        .with_file("meta.yaml", metafiles::MINIMAL)
        .with_file(
            "schema.json",
            r#"{"type": "object", "required": ["environment"], "properties": {"environment": {"enum": ["dev", "prod"]}}}"#,
        );

    fixture
        .command()
        .args([
            "validate",
            "meta.yaml",
            "--set",
            "environment=qa",
            "--set",
            "image.tag=v1",
            "--values-schema",
            "schema.json",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Values schema validation failed"))
        .stdout(predicate::str::contains("/environment"));
}
