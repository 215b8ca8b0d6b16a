use std::io::Write;
use std::process::{Command, Stdio};

fn run_shell(lines: &[&str]) -> std::process::Output {
    run_shell_in(None, lines)
}

fn run_shell_in(dir: Option<&std::path::Path>, lines: &[&str]) -> std::process::Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_pgsh"));
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    let mut child = command
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
fn simple_command_runs() {
    let output = run_shell(&["echo hello"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello"), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn three_stage_pipeline_counts_one_line() {
    let output = run_shell(&["echo hello | grep hello | wc -l"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "1", "stdout was: {stdout}");
}

#[test]
fn pipeline_stages_run_in_source_order() {
    // printf feeds unsorted lines; only sort's output may reach stdout.
    let output = run_shell(&["printf 'b\\na\\n' | sort"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "a\nb\n", "stdout was: {stdout}");
}

#[test]
fn redirections_wire_both_ends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let in_path = dir.path().join("in.txt");
    let out_path = dir.path().join("out.txt");
    std::fs::write(&in_path, "over the pipe\n").unwrap();

    let line = format!("cat < {} > {}", in_path.display(), out_path.display());
    let output = run_shell(&[line.as_str()]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.is_empty(), "stderr was: {stderr}");
    assert_eq!(std::fs::read_to_string(&out_path).unwrap(), "over the pipe\n");
}

#[test]
fn relative_redirections_resolve_against_cwd() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("rel_in.txt"), "relative\n").unwrap();

    let output = run_shell_in(Some(dir.path()), &["cat < rel_in.txt > rel_out.txt"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.is_empty(), "stderr was: {stderr}");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("rel_out.txt")).unwrap(),
        "relative\n"
    );
}

#[test]
fn missing_input_file_aborts_the_job() {
    let output = run_shell(&["cat < /definitely/not/here.txt", "echo alive"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/definitely/not/here.txt"), "stderr was: {stderr}");
    assert!(stdout.contains("alive"), "stdout was: {stdout}");
}

#[test]
fn semicolon_runs_pipelines_in_order() {
    let output = run_shell(&["echo first; echo second"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.find("first").expect("first ran");
    let second = stdout.find("second").expect("second ran");
    assert!(first < second, "stdout was: {stdout}");
}

#[test]
fn trailing_semicolon_is_not_an_error() {
    let output = run_shell(&["echo one;"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("one"), "stdout was: {stdout}");
    assert!(!stderr.contains("Parse error"), "stderr was: {stderr}");
}

#[test]
fn empty_line_produces_nothing() {
    let output = run_shell(&["", "echo after"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "after\n", "stdout was: {stdout}");
}

#[test]
fn parse_error_is_reported_and_shell_survives() {
    let output = run_shell(&["\"abc", "echo alive"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Line 0, Position 0, Parse error: Expected '\"'"),
        "stderr was: {stderr}"
    );
    assert!(stdout.contains("alive"), "stdout was: {stdout}");
}

#[test]
fn unknown_command_is_reported_and_shell_survives() {
    let output = run_shell(&["no-such-command-pgsh-test", "echo alive"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("command not found"), "stderr was: {stderr}");
    assert!(stdout.contains("alive"), "stdout was: {stdout}");
}

#[test]
fn exit_sets_the_shell_status() {
    let output = run_shell(&["exit 3"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn exit_with_garbage_argument_exits_zero() {
    let output = run_shell(&["exit notanumber"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn quoted_arguments_reach_the_command_intact() {
    let output = run_shell(&["echo \"a  b\" 'c  d'"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("a  b c  d"), "stdout was: {stdout}");
}
