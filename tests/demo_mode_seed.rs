use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schooldeskd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schooldeskd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        line.trim()
    );
    value["result"].clone()
}

#[test]
fn demo_mode_seeds_a_renderable_workspace() {
    let workspace = temp_dir("schooldesk-demo-seed");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "demoMode": true }),
    );
    assert_eq!(selected["demoMode"].as_bool(), Some(true));

    let health = request_ok(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(health["demoMode"].as_bool(), Some(true));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.list",
        json!({ "grade": "5", "section": "A" }),
    );
    let students = listed["students"].as_array().expect("students");
    assert_eq!(students.len(), 4);

    let subjects = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.list",
        json!({ "grade": "5" }),
    );
    assert_eq!(subjects["subjects"].as_array().map(|a| a.len()), Some(3));

    let ledger = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "ledger.build",
        json!({ "grade": "5", "section": "A", "term": "First Term" }),
    );
    let rows = ledger["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 4);
    for row in rows {
        assert!(row["rank"].as_i64().is_some());
        assert_eq!(row["subjects"].as_array().map(|a| a.len()), Some(3));
    }

    // Rolls 1 and 3 tie on total marks; competition ranking shares rank 1
    // and roll 2 drops to rank 3.
    assert_eq!(rows[0]["rank"].as_i64(), Some(1));
    assert_eq!(rows[1]["rank"].as_i64(), Some(3));
    assert_eq!(rows[2]["rank"].as_i64(), Some(1));
    assert_eq!(rows[3]["rank"].as_i64(), Some(4));

    // Roll 4 has a failing Mathematics paper; strict policy fails the term.
    assert_eq!(rows[3]["passed"].as_bool(), Some(false));
    assert_eq!(rows[0]["passed"].as_bool(), Some(true));

    // Selecting the same workspace again must not duplicate the seed.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "demoMode": true }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "grade": "5", "section": "A" }),
    );
    assert_eq!(listed["students"].as_array().map(|a| a.len()), Some(4));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn plain_workspace_select_stays_empty() {
    let workspace = temp_dir("schooldesk-no-demo");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["demoMode"].as_bool(), Some(false));

    let listed = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(listed["students"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
