//! Integration Tests

use std::fs;
use std::path::Path;

use assert_cli::Assert;
use tempdir::TempDir;

/// Runs `jcsh -c <command>` in `dir`, logging into `dir`.
fn jcsh_command(dir: &Path, command: &str) -> Assert {
    let log_arg = log_arg(dir);
    Assert::command(&[env!("CARGO_BIN_EXE_jcsh")])
        .current_dir(dir)
        .with_args(&[log_arg.as_str(), "-c", command])
}

fn log_arg(dir: &Path) -> String {
    format!("--log={}", dir.join("jcsh.log").display())
}

fn generate_temp_directory() -> TempDir {
    TempDir::new("jcsh").expect("unable to generate temp dir")
}

#[test]
fn test_version() {
    Assert::command(&[env!("CARGO_BIN_EXE_jcsh")])
        .with_args(&["--version"])
        .stdout()
        .contains(env!("CARGO_PKG_VERSION"))
        .unwrap();
}

#[test]
fn test_pipeline() {
    let dir = generate_temp_directory();
    jcsh_command(dir.path(), "echo hello | tr a-z A-Z")
        .succeeds()
        .stdout()
        .contains("HELLO")
        .unwrap();
}

#[test]
fn test_redirects() {
    let dir = generate_temp_directory();
    jcsh_command(
        dir.path(),
        "echo test output, please ignore > out.txt; tr a-z A-Z < out.txt > upper.txt",
    )
    .succeeds()
    .unwrap();

    let upper = fs::read_to_string(dir.path().join("upper.txt")).unwrap();
    assert_eq!(upper, "TEST OUTPUT, PLEASE IGNORE\n");
}

#[test]
fn test_failed_job_is_reported_and_forgotten() {
    let dir = generate_temp_directory();
    jcsh_command(dir.path(), "false; jobs")
        .succeeds()
        .stdout()
        .doesnt_contain("[1]")
        .stderr()
        .contains("(Failed): false")
        .unwrap();
}

#[test]
fn test_command_not_found() {
    let dir = generate_temp_directory();
    jcsh_command(dir.path(), "jcsh-no-such-command; echo alive")
        .succeeds()
        .stdout()
        .contains("alive")
        .stderr()
        .contains("jcsh-no-such-command: command not found")
        .unwrap();
}

#[test]
fn test_cd() {
    let dir = generate_temp_directory();
    fs::create_dir(dir.path().join("subdir")).unwrap();
    jcsh_command(dir.path(), "cd subdir; pwd")
        .succeeds()
        .stdout()
        .contains("subdir")
        .unwrap();
}

#[test]
fn test_cd_failure_keeps_working_directory() {
    let dir = generate_temp_directory();
    fs::write(dir.path().join("marker.txt"), "").unwrap();
    jcsh_command(dir.path(), "cd /jcsh-nonexistent; ls")
        .succeeds()
        .stdout()
        .contains("marker.txt")
        .stderr()
        .contains("cd: /jcsh-nonexistent")
        .unwrap();
}

#[test]
fn test_job_control_commands_without_job_control() {
    let dir = generate_temp_directory();
    jcsh_command(dir.path(), "fg; bg 1; echo alive")
        .succeeds()
        .stdout()
        .contains("alive")
        .stderr()
        .contains("fg: no job control")
        .unwrap();
}

#[test]
fn test_background_job_is_listed() {
    let dir = generate_temp_directory();
    jcsh_command(dir.path(), "sleep 1 &; jobs; kill 1")
        .succeeds()
        .stdout()
        .contains("[1] Running (bg)\tsleep 1")
        .unwrap();
}

#[test]
fn test_syntax_error() {
    let dir = generate_temp_directory();
    jcsh_command(dir.path(), "echo hello |")
        .succeeds()
        .stderr()
        .contains("syntax error")
        .unwrap();
}

#[test]
fn test_quit() {
    let dir = generate_temp_directory();
    jcsh_command(dir.path(), "quit; echo unreachable")
        .succeeds()
        .stdout()
        .doesnt_contain("unreachable")
        .unwrap();
}

#[test]
fn test_script_file() {
    let dir = generate_temp_directory();
    let script = dir.path().join("script.jcsh");
    fs::write(&script, "echo one\n\necho two | tr a-z A-Z\n").unwrap();
    let log_arg = log_arg(dir.path());

    Assert::command(&[env!("CARGO_BIN_EXE_jcsh")])
        .current_dir(dir.path())
        .with_args(&[log_arg.as_str(), script.to_str().unwrap()])
        .succeeds()
        .stdout()
        .contains("one\nTWO")
        .unwrap();
}

#[test]
fn test_interactive_session_from_piped_stdin() {
    let dir = generate_temp_directory();
    let log_arg = log_arg(dir.path());

    Assert::command(&[env!("CARGO_BIN_EXE_jcsh")])
        .current_dir(dir.path())
        .with_args(&[log_arg.as_str()])
        .stdin("echo piped\n")
        .succeeds()
        .stdout()
        .contains("piped")
        .unwrap();
}
