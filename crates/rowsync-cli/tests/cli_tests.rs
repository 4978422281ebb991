use assert_cmd::Command;
use predicates::prelude::*;

const VALID_CONFIG: &str = r#"
source:
  host: db1.internal
  user: sync
  password: s3cr3t
dest:
  dialect: postgres
  host: db2.internal
  database: mirror
  user: sync
  password: s3cr3t
tables:
  - schema: shop
    table: orders
  - schema: shop
    table: customers
    dest_schema: shop_mirror
"#;

fn write_config(dir: &tempfile::TempDir, yaml: &str) -> String {
    let path = dir.path().join("sync.yaml");
    std::fs::write(&path, yaml).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn validate_prints_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, VALID_CONFIG);

    Command::cargo_bin("rowsync")
        .unwrap()
        .args(["--config", &path, "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("shop.orders -> shop.orders"))
        .stdout(predicate::str::contains(
            "shop.customers -> shop_mirror.customers",
        ));
}

#[test]
fn missing_config_file_fails_with_config_exit_code() {
    Command::cargo_bin("rowsync")
        .unwrap()
        .args(["--config", "/nonexistent/sync.yaml", "validate"])
        .assert()
        .failure();
}

#[test]
fn mssql_without_sql_output_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = VALID_CONFIG.replace("dialect: postgres", "dialect: mssql");
    let path = write_config(&dir, &yaml);

    Command::cargo_bin("rowsync")
        .unwrap()
        .args(["--config", &path, "validate"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("sql_output"));
}
