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
    let exe = env!("CARGO_BIN_EXE_reportd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportd");
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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/error/code").and_then(|v| v.as_str())
}

fn quiz_attempts(n: usize) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            json!({
                "_id": format!("q{}", i),
                "studentId": { "name": format!("Student {}", i) },
                "quizId": { "lessonName": "Fractions", "classId": { "subject": "Math" } },
                "marks": (i % 50) as f64,
                "totalMarks": 50,
                "attemptedAt": "2024-02-01T09:00:00Z"
            })
        })
        .collect();
    serde_json::Value::Array(rows)
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[test]
fn exports_xlsx_and_pdf_into_workspace() {
    let workspace = temp_dir("reportd-export");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let xlsx = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.export",
        json!({ "kind": "quizAttempts", "records": quiz_attempts(3), "format": "xlsx" }),
    );
    let path = xlsx.get("path").and_then(|v| v.as_str()).expect("path");
    assert!(path.ends_with(".xlsx"));
    assert!(path.contains("quiz-attempts-"));
    let bytes = std::fs::read(path).expect("read xlsx");
    assert!(bytes.starts_with(b"PK"));
    assert_eq!(xlsx.get("bytes").and_then(|v| v.as_u64()), Some(bytes.len() as u64));
    assert_eq!(xlsx.get("rowCount").and_then(|v| v.as_u64()), Some(3));
    assert!(is_hex_digest(xlsx.get("sha256").and_then(|v| v.as_str()).expect("sha256")));

    let pdf = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.export",
        json!({ "kind": "quizAttempts", "records": quiz_attempts(180), "format": "pdf" }),
    );
    let path = pdf.get("path").and_then(|v| v.as_str()).expect("path");
    assert!(path.starts_with(&*workspace.join("exports").to_string_lossy()));
    let bytes = std::fs::read(path).expect("read pdf");
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(pdf.get("rowCount").and_then(|v| v.as_u64()), Some(180));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn empty_result_still_exports_headers() {
    let dir = temp_dir("reportd-export-empty");
    let out = dir.join("nested").join("empty.pdf");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.export",
        json!({
            "kind": "subscriptions",
            "records": [{ "feePaid": 10, "status": "active" }],
            "filters": { "studentName": "nobody" },
            "format": "pdf",
            "outPath": out.to_string_lossy()
        }),
    );
    assert_eq!(res.get("rowCount").and_then(|v| v.as_u64()), Some(0));
    let bytes = std::fs::read(&out).expect("read pdf");
    assert!(bytes.starts_with(b"%PDF"));

    let model = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.exportModel",
        json!({
            "kind": "subscriptions",
            "records": []
        }),
    );
    assert_eq!(
        model.pointer("/workbook/headers/0").and_then(|v| v.as_str()),
        Some("Student Name")
    );
    assert_eq!(
        model.pointer("/document/headerFill"),
        Some(&json!({ "r": 41, "g": 128, "b": 185 }))
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn export_requires_a_destination_and_known_format() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let no_dest = request(
        &mut stdin,
        &mut reader,
        "1",
        "reports.export",
        json!({ "kind": "subscriptions", "records": [], "format": "xlsx" }),
    );
    assert_eq!(error_code(&no_dest), Some("no_workspace"));

    let bad_format = request(
        &mut stdin,
        &mut reader,
        "2",
        "reports.export",
        json!({ "kind": "subscriptions", "records": [], "format": "csv", "outPath": "/tmp/x.csv" }),
    );
    assert_eq!(error_code(&bad_format), Some("bad_params"));
}
