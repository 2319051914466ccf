#![forbid(unsafe_code)]

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn write_template_creates_loadable_file() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("nmos.toml");
	let mut cmd = Command::cargo_bin("nmos-cli").unwrap();
	cmd.arg("config").arg("write-template").arg("--path").arg(&path);
	cmd.assert().success();
	let contents = std::fs::read_to_string(&path).unwrap();
	assert!(contents.contains("paging_timestamp_delay_ms = 100"));

	// the template round-trips through --config
	let mut cmd = Command::cargo_bin("nmos-cli").unwrap();
	cmd.arg("--config").arg(&path).arg("config").arg("show");
	cmd.assert().success().stdout(predicate::str::contains("\"controller_testing_timeout_secs\": 600"));
}

#[test]
fn write_template_refuses_overwrite() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("nmos.toml");
	std::fs::write(&path, "port_base = 7000\n").unwrap();
	let mut cmd = Command::cargo_bin("nmos-cli").unwrap();
	cmd.arg("config").arg("write-template").arg("--path").arg(&path);
	cmd.assert().code(2).stderr(predicate::str::contains("use --force"));
	assert_eq!(std::fs::read_to_string(&path).unwrap(), "port_base = 7000\n");

	let mut cmd = Command::cargo_bin("nmos-cli").unwrap();
	cmd.arg("config").arg("write-template").arg("--path").arg(&path).arg("--force");
	cmd.assert().success();
	assert!(std::fs::read_to_string(&path).unwrap().contains("port_base = 5000"));
}
