//! End-to-end tests for the `rlm` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn rlm() -> Command {
    let mut cmd = Command::cargo_bin("rlm").unwrap();
    for key in [
        "RLM_MAX_EXECUTIONS",
        "RLM_MAX_RESETS",
        "RLM_TIMEOUT_SECS",
        "RLM_MAX_OUTPUT_CHARS",
        "RLM_RELOAD_POLICY",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn have_python() -> bool {
    let found = rlm_core::ipc::find_interpreter(None).is_ok();
    if !found {
        eprintln!("skipping: no python interpreter");
    }
    found
}

fn log_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "INFO start\nERROR disk full\nINFO retry\nERROR disk full").unwrap();
    file
}

#[test]
fn test_help_lists_commands() {
    rlm()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("repl"));
}

#[test]
fn test_oversized_timeout_is_an_error() {
    rlm()
        .args(["--timeout", "1e20", "repl"])
        .write_stdin(":quit\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--timeout"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn test_piped_repl_output_is_plain() {
    rlm()
        .arg("repl")
        .write_stdin(":info\n:get x\n:quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("No content loaded"))
        .stdout(predicate::str::contains("\x1b").not());
}

#[test]
fn test_missing_file_fails() {
    rlm()
        .args(["exec", "-f", "/definitely/not/here.log", "print(1)"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not/here.log"));
}

#[test]
fn test_malformed_environment_fails() {
    let file = log_file();
    rlm()
        .env("RLM_MAX_EXECUTIONS", "many")
        .arg("exec")
        .arg("-f")
        .arg(file.path())
        .arg("print(1)")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RLM_MAX_EXECUTIONS"));
}

#[test]
fn test_exec_runs_snippets_in_order() {
    if !have_python() {
        return;
    }
    let file = log_file();
    rlm()
        .arg("exec")
        .arg("-f")
        .arg(file.path())
        .arg("errors = [l for l in context.splitlines() if 'ERROR' in l]")
        .arg("print(len(errors), len(set(errors)))")
        .assert()
        .success()
        .stdout(predicate::str::contains("File loaded"))
        .stdout(predicate::str::contains("[1/10] OK"))
        .stdout(predicate::str::contains("(no output - use print())"))
        .stdout(predicate::str::contains("[2/10] OK"))
        .stdout(predicate::str::contains("2 1\n"));
}

#[test]
fn test_exec_reports_quota_refusal() {
    if !have_python() {
        return;
    }
    let file = log_file();
    rlm()
        .args(["--max-executions", "1", "exec", "-f"])
        .arg(file.path())
        .args(["print('first')", "print('second')"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[1/1] OK"))
        .stdout(predicate::str::contains("Session limit reached (1 executions)"))
        .stdout(predicate::str::contains("second").not());
}

#[test]
fn test_repl_reads_stdin() {
    if !have_python() {
        return;
    }
    let file = log_file();
    rlm()
        .arg("repl")
        .arg("-f")
        .arg(file.path())
        .write_stdin("total = len(context)\n\n:get total\n:info\n:reset\n:reset\n:reset\n:quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Executions: 1/10 used"))
        .stdout(predicate::str::contains("Variables: context_length, file_path, total"))
        .stdout(predicate::str::contains("(1/2 resets used)"))
        .stdout(predicate::str::contains("(2/2 resets used)"))
        .stdout(predicate::str::contains("Reset limit reached"));
}

#[test]
fn test_repl_get_defaults_to_ten_thousand_chars() {
    if !have_python() {
        return;
    }
    let file = log_file();
    rlm()
        .arg("repl")
        .arg("-f")
        .arg(file.path())
        .write_stdin("big = 'x' * 15000\n\n:get big\n:get big 20000\n:get nothing\n:info\n:quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{}\n... [truncated]", "x".repeat(10_000))))
        .stdout(predicate::str::contains("x".repeat(15_000)))
        .stdout(predicate::str::contains("Variable 'nothing' not found"))
        .stdout(predicate::str::contains("Session: default"))
        .stdout(predicate::str::contains("\x1b").not());
}
