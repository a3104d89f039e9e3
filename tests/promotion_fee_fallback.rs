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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params.clone());
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value["result"].clone()
}

#[test]
fn promotion_updates_grade_and_fee_with_fallback() {
    let workspace = temp_dir("schooldesk-promotion");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Configured fee for grade 6; grade 7 stays on the built-in fallback.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "config.update",
        json!({ "section": "fees", "patch": { "6": 2000.0 } }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "grade": "5", "section": "C", "rollNo": 7,
            "lastName": "Bhattarai", "firstName": "Test"
        }),
    );
    let student_id = created["studentId"].as_str().unwrap().to_string();

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "promotion.preview",
        json!({ "grade": "5" }),
    );
    assert_eq!(preview["targetGrade"].as_str(), Some("6"));
    assert_eq!(preview["students"][0]["newFee"].as_f64(), Some(2000.0));

    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "promotion.apply",
        json!({ "grade": "5" }),
    );
    assert_eq!(applied["toGrade"].as_str(), Some("6"));
    assert_eq!(applied["promotedCount"].as_i64(), Some(1));
    assert_eq!(applied["newFee"].as_f64(), Some(2000.0));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.list",
        json!({ "grade": "6" }),
    );
    let student = &listed["students"][0];
    assert_eq!(student["studentId"].as_str(), Some(student_id.as_str()));
    assert_eq!(student["grade"].as_str(), Some("6"));
    // Section carries over unchanged.
    assert_eq!(student["section"].as_str(), Some("C"));
    assert_eq!(student["monthlyFee"].as_f64(), Some(2000.0));

    // Promote again into grade 7: no configured fee, fallback applies.
    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "promotion.apply",
        json!({ "grade": "6" }),
    );
    assert_eq!(applied["toGrade"].as_str(), Some("7"));
    assert_eq!(applied["newFee"].as_f64(), Some(1200.0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn top_grade_cannot_be_promoted() {
    let workspace = temp_dir("schooldesk-promotion-top");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({
            "grade": "10", "section": "A", "rollNo": 1,
            "lastName": "Koirala", "firstName": "Test"
        }),
    );

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "promotion.preview",
        json!({ "grade": "10" }),
    );
    assert!(preview["targetGrade"].is_null());
    assert_eq!(
        preview["students"][0]["skipReason"].as_str(),
        Some("top_grade")
    );

    let applied = request(
        &mut stdin,
        &mut reader,
        "4",
        "promotion.apply",
        json!({ "grade": "10" }),
    );
    assert_eq!(applied["ok"].as_bool(), Some(false));
    assert_eq!(applied["error"]["code"].as_str(), Some("bad_params"));

    // Double promotion from the second-highest grade also runs off the
    // end of the order.
    let applied = request(
        &mut stdin,
        &mut reader,
        "5",
        "promotion.apply",
        json!({ "grade": "9", "doublePromotion": true }),
    );
    assert_eq!(applied["ok"].as_bool(), Some(false));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
