//! Command line behaviour that needs no HSM: argument parsing, configuration
//! loading and library loading errors.
#![allow(clippy::unwrap_used)]

use std::{io::Write, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const PROG_NAME: &str = "p11-samples";
const MISSING_LIB: &str = "/nonexistent/libCryptoki2_64.so";

/// The binary with no ambient configuration
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin(PROG_NAME).unwrap();
    cmd.env_remove("P11_CLI_CONF")
        .env_remove("P11_LIB")
        .env_remove("P11_PASSWORD")
        .env_remove("P11_CLI_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_the_samples() {
    cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("encrypt")
            .and(predicate::str::contains("sign"))
            .and(predicate::str::contains("derive"))
            .and(predicate::str::contains("wrap"))
            .and(predicate::str::contains("usage-limit"))
            .and(predicate::str::contains("multi-thread-sign"))
            .and(predicate::str::contains("luna")),
    );

    cmd()
        .args(["encrypt", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aes-gcm").and(predicate::str::contains("rsa-oaep")));
}

#[test]
fn unknown_subcommand() {
    cmd()
        .args(["--lib", MISSING_LIB, "decipher"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn invalid_arguments_are_rejected_before_loading() {
    cmd()
        .args(["--lib", MISSING_LIB, "random", "generate", "0"])
        .assert()
        .failure()
        .code(2);

    cmd()
        .args(["--lib", MISSING_LIB, "--format", "xml", "info"])
        .assert()
        .failure()
        .code(2);

    cmd()
        .args(["--lib", MISSING_LIB, "--user", "admin", "info"])
        .assert()
        .failure()
        .code(2);

    cmd()
        .args(["--lib", MISSING_LIB, "objects", "generate-ec", "--curve", "p999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown curve"));
}

#[test]
fn missing_library() {
    cmd()
        .args(["--lib", MISSING_LIB, "info"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "ERROR: failed loading the PKCS#11 library",
        ));

    cmd()
        .env("P11_LIB", MISSING_LIB)
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains(MISSING_LIB));
}

#[test]
fn configuration_file() {
    let mut malformed = NamedTempFile::new().unwrap();
    malformed.write_all(b"slot = [1, 2]\n").unwrap();
    cmd()
        .args(["--conf", malformed.path().to_str().unwrap(), "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config TOML malformed"));

    cmd()
        .args(["--conf", "not_exist.toml", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Can't read the configuration file not_exist.toml",
        ));

    // the library path of the file is used when --lib is absent
    let mut conf = NamedTempFile::new().unwrap();
    writeln!(conf, "library_path = \"{MISSING_LIB}\"").unwrap();
    cmd()
        .env("P11_CLI_CONF", conf.path())
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains(MISSING_LIB));
}
