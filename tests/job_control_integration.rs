use std::io::Write;
use std::process::{Command, Stdio};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_pgsh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn pgsh");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
    }

    child.wait_with_output().expect("wait output")
}

#[test]
fn background_job_is_reported_done_and_removed() {
    // Without a tty the launcher still waits, so by the time notifications
    // run the job is finished; being background, its removal is announced.
    let output = run_shell(&["sleep 0.1 &", "jobs", "echo marker"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("[1] + done sleep 0.1"),
        "stderr was: {stderr}"
    );
    // the table was emptied before the jobs builtin ran
    assert_eq!(stdout, "marker\n", "stdout was: {stdout}");
}

#[test]
fn signal_termination_is_reported() {
    let output = run_shell(&["sh -c 'kill -TERM $$'", "echo alive"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Terminated by signal 15."),
        "stderr was: {stderr}"
    );
    assert!(stdout.contains("alive"), "stdout was: {stdout}");
}

#[test]
fn pipeline_shares_one_process_group_observable_status() {
    // All stages get reaped and the shell keeps running afterwards.
    let output = run_shell(&["echo x | cat | cat", "echo done"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains('x'), "stdout was: {stdout}");
    assert!(stdout.contains("done"), "stdout was: {stdout}");
}

#[test]
fn fg_without_jobs_is_a_usage_error() {
    let output = run_shell(&["fg", "echo alive"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("fg: no current job"), "stderr was: {stderr}");
    assert!(stdout.contains("alive"), "stdout was: {stdout}");
}

#[test]
fn bg_with_bad_id_is_a_usage_error() {
    let output = run_shell(&["bg %42", "echo alive"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bg: 42: no such job"), "stderr was: {stderr}");
}

#[test]
fn jobs_with_invalid_option_is_rejected() {
    let output = run_shell(&["jobs -z", "echo alive"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("jobs: -z: invalid option"), "stderr was: {stderr}");
    assert!(stdout.contains("alive"), "stdout was: {stdout}");
}

#[test]
fn jobs_with_empty_table_prints_nothing() {
    let output = run_shell(&["jobs", "echo marker"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "marker\n", "stdout was: {stdout}");
}

#[test]
fn help_dumps_the_registry() {
    let output = run_shell(&["help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    for usage in ["cd [path]", "jobs [-l|-p] [id]", "fg [id]", "bg [id]", "exit [n]"] {
        assert!(stdout.contains(usage), "stdout was: {stdout}");
    }
}

#[test]
fn help_through_a_pipe_counts_builtins() {
    let output = run_shell(&["help | wc -l"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "6", "stdout was: {stdout}");
}

#[test]
fn cd_changes_the_working_directory() {
    let output = run_shell(&["cd /", "pwd"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "/\n", "stdout was: {stdout}");
}

#[test]
fn cd_failure_is_reported_and_shell_survives() {
    let output = run_shell(&["cd /definitely/not/a/dir", "echo alive"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cd: /definitely/not/a/dir"), "stderr was: {stderr}");
    assert!(stdout.contains("alive"), "stdout was: {stdout}");
}

#[test]
fn builtin_honors_stdout_redirection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out_path = dir.path().join("help.txt");

    let line = format!("help > {}", out_path.display());
    run_shell(&[line.as_str()]);

    let text = std::fs::read_to_string(&out_path).unwrap();
    assert!(text.contains("cd [path]"), "file was: {text}");
}
