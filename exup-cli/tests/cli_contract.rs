//! Integration tests for core CLI contract behavior.
//!
//! None of these need a device: every path either stops before the port is
//! opened or fails to open a port that does not exist.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

/// Largest image the device accepts.
const MAX_PAYLOAD: usize = 2_093_056;

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("exup");
    cmd.env_remove("EXUP_PORT")
        .env_remove("EXUP_BAUD")
        .env("NO_COLOR", "1");
    cmd
}

fn hex_payload(len: usize) -> Vec<u8> {
    let mut data = vec![b'0'; len];
    data[0] = b':';
    data
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("exup"))
        .stdout(predicate::str::contains("Exit status"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("exup"))
        .stderr(predicate::str::is_empty());
}

/// Exit code 2: clap usage error
#[test]
fn exit_code_two_for_missing_image_argument() {
    let mut cmd = cli_cmd();
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn exit_code_one_for_empty_file() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("empty.hex");
    fs::write(&image, b"").expect("write empty image");

    let mut cmd = cli_cmd();
    cmd.arg("-p")
        .arg("INVALID_PORT_NAME_XYZ")
        .arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Empty file"))
        .stderr(predicate::str::contains("Opening").not());
}

#[test]
fn exit_code_one_for_oversized_image() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("big.hex");
    fs::write(&image, hex_payload(MAX_PAYLOAD + 1)).expect("write oversized image");

    let mut cmd = cli_cmd();
    cmd.arg("-p")
        .arg("INVALID_PORT_NAME_XYZ")
        .arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("2093057"))
        .stderr(predicate::str::contains("Opening").not());
}

#[test]
fn exit_code_one_for_binary_image() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("firmware.bin");
    fs::write(&image, [0x0C, 0x94, 0x5C, 0x00]).expect("write binary image");

    let mut cmd = cli_cmd();
    cmd.arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Intel HEX"));
}

#[test]
fn exit_code_one_for_missing_file() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("not_there.hex");

    let mut cmd = cli_cmd();
    cmd.arg(&image)
        .assert()
        .failure()
        .code(1);
}

/// Exit code 5: port cannot be opened
#[cfg(unix)]
#[test]
fn exit_code_five_when_port_cannot_be_opened() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("ok.hex");
    fs::write(&image, b":00000001FF\n").expect("write image");
    let port = dir.path().join("no-such-tty");

    let mut cmd = cli_cmd();
    cmd.arg("--port")
        .arg(&port)
        .arg(&image)
        .assert()
        .failure()
        .code(5)
        .stderr(predicate::str::contains("Failed to open"));
}

#[test]
fn invalid_config_file_is_a_warning() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("exup.toml"), "invalid toml [[[").expect("write invalid config");
    fs::write(dir.path().join("empty.hex"), b"").expect("write empty image");

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("empty.hex")
        .output()
        .expect("command should execute");

    // Config problems never change the outcome
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("exup.toml"), "should warn about the config file");
}

#[test]
fn colors_disabled_when_not_tty() {
    let output = cli_cmd()
        .env_remove("NO_COLOR")
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(
        !stdout.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}
