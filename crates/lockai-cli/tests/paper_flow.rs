//! Integration tests for `lockai paper` against a mock backend.


use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::{paper_error_sse, paper_generate_sse, sse_response};
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn temp_lockai_home() -> TempDir {
    TempDir::new().expect("create temp lockai home")
}

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn write_record(home: &Path, id: &str, status: &str, pdf_url: Option<&str>) {
    let dir = home.join("papers");
    fs::create_dir_all(&dir).unwrap();
    let pdf = match pdf_url {
        Some(url) => format!(r#""{url}""#),
        None => "null".to_string(),
    };
    fs::write(
        dir.join(format!("{id}.json")),
        format!(
            r#"{{
  "id": "{id}",
  "topic": "量子计算综述",
  "status": "{status}",
  "pdf_url": {pdf},
  "created_at": "2026-08-01T00:00:00Z"
}}"#
        ),
    )
    .unwrap();
}

#[tokio::test]
async fn test_paper_generate_streams_stages_and_saves_record() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_lockai_home();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/paper/generate"))
        .respond_with(sse_response(&paper_generate_sse(
            "p1",
            "https://example.com/p1.pdf",
        )))
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("lockai")
        .env("LOCKAI_HOME", home.path())
        .env("LOCKAI_BASE_URL", server.uri())
        .args(["paper", "generate", "量子计算综述"])
        .assert()
        .success()
        .stdout(predicate::str::contains("论文已完成: https://example.com/p1.pdf"));

    let record = fs::read_to_string(home.path().join("papers/p1.json")).unwrap();
    assert!(record.contains(r#""status": "completed""#));
    assert!(record.contains("https://example.com/p1.pdf"));
    assert!(record.contains("量子计算综述"));
}

#[tokio::test]
async fn test_paper_generate_error_exits_nonzero() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_lockai_home();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/paper/generate"))
        .respond_with(sse_response(&paper_error_sse("p1", "编译失败")))
        .mount(&server)
        .await;

    cargo_bin_cmd!("lockai")
        .env("LOCKAI_HOME", home.path())
        .env("LOCKAI_BASE_URL", server.uri())
        .args(["paper", "generate", "失败的题目"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("生成失败"))
        .stderr(predicate::str::contains("编译失败"));

    // The failure is written through to the local record.
    let record = fs::read_to_string(home.path().join("papers/p1.json")).unwrap();
    assert!(record.contains(r#""status": "failed""#));
    assert!(record.contains("编译失败"));
}

#[tokio::test]
async fn test_paper_status_prints_snapshot() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_lockai_home();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/paper/status/p3"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"status":"writing","progress_detail":"撰写正文"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    cargo_bin_cmd!("lockai")
        .env("LOCKAI_HOME", home.path())
        .env("LOCKAI_BASE_URL", server.uri())
        .args(["paper", "status", "p3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("状态: writing"))
        .stdout(predicate::str::contains("进度: 撰写正文"));
}

#[tokio::test]
async fn test_paper_watch_polls_until_completed() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_lockai_home();
    let server = MockServer::start().await;

    write_record(home.path(), "p4", "writing", None);
    Mock::given(method("GET"))
        .and(path("/api/paper/status/p4"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"status":"completed","pdf_url":"https://example.com/p4.pdf"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    cargo_bin_cmd!("lockai")
        .env("LOCKAI_HOME", home.path())
        .env("LOCKAI_BASE_URL", server.uri())
        .args(["paper", "watch", "p4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("论文已完成: https://example.com/p4.pdf"));

    let record = fs::read_to_string(home.path().join("papers/p4.json")).unwrap();
    assert!(record.contains(r#""status": "completed""#));
}

#[test]
fn test_paper_list_shows_records() {
    let home = temp_lockai_home();
    write_record(
        home.path(),
        "p5",
        "completed",
        Some("https://example.com/p5.pdf"),
    );

    cargo_bin_cmd!("lockai")
        .env("LOCKAI_HOME", home.path())
        .args(["paper", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("p5"))
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("量子计算综述"));
}

#[test]
fn test_paper_list_empty() {
    let home = temp_lockai_home();

    cargo_bin_cmd!("lockai")
        .env("LOCKAI_HOME", home.path())
        .args(["paper", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No paper records found."));
}
