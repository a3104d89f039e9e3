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

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("schooldesk-router-smoke");
    let csv_out = workspace.join("smoke-ledger.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "3", "config.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "config.update",
        json!({ "section": "fees", "patch": { "5": 1100.0 } }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "grade": "5",
            "section": "A",
            "rollNo": 1,
            "lastName": "Smoke",
            "firstName": "Student"
        }),
    );
    let student_id = created
        .get("result")
        .and_then(|v| v.get("studentId"))
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.list",
        json!({ "grade": "5", "section": "A" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.update",
        json!({
            "studentId": student_id,
            "patch": { "firstName": "Updated" }
        }),
    );

    let subject = request(
        &mut stdin,
        &mut reader,
        "8",
        "subjects.upsert",
        json!({
            "grade": "5",
            "name": "Mathematics",
            "creditHours": 4.0,
            "maxTheory": 100.0,
            "maxPractical": 0.0
        }),
    );
    let subject_id = subject
        .get("result")
        .and_then(|v| v.get("subjectId"))
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "subjects.list",
        json!({ "grade": "5" }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "marks.save",
        json!({
            "term": "First Term",
            "entries": [
                { "studentId": student_id, "subjectId": subject_id, "theory": 72.0 }
            ]
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "marks.get",
        json!({ "grade": "5", "section": "A", "term": "First Term" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "ledger.build",
        json!({ "grade": "5", "section": "A", "term": "First Term" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "ledger.student",
        json!({
            "grade": "5",
            "section": "A",
            "term": "First Term",
            "studentId": student_id
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "promotion.preview",
        json!({ "grade": "5" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "exchange.exportLedgerCsv",
        json!({
            "grade": "5",
            "section": "A",
            "term": "First Term",
            "outPath": csv_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "subjects.delete",
        json!({ "subjectId": subject_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "students.delete",
        json!({ "studentId": student_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
