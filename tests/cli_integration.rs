// CLI integration tests for greet/shell flows and error envelopes.
use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_hellodev");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn parse_json_lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .map(parse_json)
        .collect()
}

fn parse_error(stderr: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stderr);
    let line = text.lines().last().expect("error line");
    parse_json(line)
}

fn run_shell(script: &str) -> std::process::Output {
    let mut child = cmd()
        .arg("shell")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn shell");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(script.as_bytes())
        .expect("write script");
    child.wait_with_output().expect("shell output")
}

#[test]
fn greet_defaults_to_world() {
    let output = cmd().arg("greet").output().expect("greet");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Hello, World!\n");
}

#[test]
fn greet_with_name_reports_json_summary() {
    let output = cmd()
        .args(["greet", "Bari", "--chunk", "5", "--json"])
        .output()
        .expect("greet");
    assert!(output.status.success());
    let value = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(value["greeting"], "Hello, Bari!");
    assert_eq!(value["length"], 12);
    assert_eq!(value["consumed"], 4);
    assert_eq!(value["reads"], 4);
    assert_eq!(value["device"]["name"], "hello");
}

#[test]
fn greet_truncates_long_names() {
    let name = "x".repeat(150);
    let output = cmd()
        .args(["greet", name.as_str(), "--json"])
        .output()
        .expect("greet");
    assert!(output.status.success());
    let value = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(value["consumed"], 100);
    assert_eq!(value["length"], 108);
    let greeting = value["greeting"].as_str().expect("greeting");
    assert!(greeting.ends_with("x!"));
    assert_eq!(greeting.matches('!').count(), 1);
}

#[test]
fn greet_rejects_zero_chunk() {
    let output = cmd()
        .args(["greet", "--chunk", "0"])
        .output()
        .expect("greet");
    assert_eq!(output.status.code(), Some(2));
    let value = parse_error(&output.stderr);
    assert_eq!(value["error"]["kind"], "Usage");
    assert!(value["error"]["hint"].is_string());
}

#[test]
fn shell_streams_with_independent_cursors() {
    let output = run_shell(
        "open\nopen\nread 1 5\nwrite 2 Ana\nread 1 64\nread 1 64\nread 2 100\ninfo\n",
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let replies = parse_json_lines(&output.stdout);
    assert_eq!(replies.len(), 8);

    assert_eq!(replies[2]["bytes"], "Hello");
    assert_eq!(replies[3]["consumed"], 3);
    assert_eq!(replies[3]["length"], 11);
    assert_eq!(replies[4]["bytes"], ", Ana!");
    assert_eq!(replies[4]["cursor"], 11);
    assert_eq!(replies[5]["delivered"], 0);
    assert_eq!(replies[5]["state"], "done");
    assert_eq!(replies[6]["bytes"], "Hello, Ana!");
    assert_eq!(replies[7]["greeting"], "Hello, Ana!");
    assert_eq!(replies[7]["sessions"], 2);
}

#[test]
fn shell_stale_cursor_hits_end_of_stream_after_shrink() {
    let output = run_shell("open\nopen\ncat 1\nwrite 2 Ana\nread 1 64\n");
    assert!(output.status.success());
    let replies = parse_json_lines(&output.stdout);
    assert_eq!(replies[2]["bytes"], "Hello, World!");
    assert_eq!(replies[2]["cursor"], 13);
    assert_eq!(replies[4]["delivered"], 0);
    assert_eq!(replies[4]["cursor"], 13);
}

#[test]
fn shell_unknown_session_is_not_found() {
    let output = run_shell("open\nread 7 1\n");
    assert_eq!(output.status.code(), Some(3));
    let replies = parse_json_lines(&output.stdout);
    assert_eq!(replies.len(), 1);
    let value = parse_error(&output.stderr);
    assert_eq!(value["error"]["kind"], "NotFound");
    assert!(
        value["error"]["message"]
            .as_str()
            .expect("message")
            .starts_with("line 2:")
    );
}

#[test]
fn shell_reads_script_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let script = temp.path().join("greet.txt");
    std::fs::write(&script, "open\nwrite 1\ncat 1 3\n").expect("write script");

    let output = cmd()
        .args(["shell", "--script", script.to_str().unwrap()])
        .output()
        .expect("shell");
    assert!(output.status.success());
    let replies = parse_json_lines(&output.stdout);
    assert_eq!(replies[2]["bytes"], "Hello, !");
    assert_eq!(replies[2]["reads"], 4);
}

#[test]
fn missing_script_is_io_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = cmd()
        .args([
            "shell",
            "--script",
            temp.path().join("missing.txt").to_str().unwrap(),
        ])
        .output()
        .expect("shell");
    assert_eq!(output.status.code(), Some(8));
}

#[test]
fn version_is_json() {
    let output = cmd().arg("version").output().expect("version");
    assert!(output.status.success());
    let value = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(value["name"], "hellodev");
}

#[cfg(unix)]
#[test]
fn greet_accepts_non_utf8_name() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let output = cmd()
        .arg("greet")
        .arg(OsStr::from_bytes(b"\xffBari"))
        .arg("--json")
        .output()
        .expect("greet");
    assert!(output.status.success());
    let value = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(value["consumed"], 5);
    assert_eq!(value["length"], 13);
}

#[test]
fn shell_raw_bytes_rebuild_a_split_name() {
    let output = run_shell("open\nwrite 1 \u{e9}\nread 1 8\nread 1 64\n");
    assert!(output.status.success());
    let replies = parse_json_lines(&output.stdout);
    let rebuilt = replies[2..]
        .iter()
        .flat_map(|reply| reply["raw"].as_array().cloned().unwrap_or_default())
        .map(|byte| byte.as_u64().expect("byte") as u8)
        .collect::<Vec<_>>();
    assert_eq!(rebuilt, "Hello, \u{e9}!".as_bytes());
}
