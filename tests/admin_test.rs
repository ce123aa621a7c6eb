mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::{TestApp, pdf_bytes, spawn_app, spawn_app_with_sink};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use student_vault::services::audit::{AuditEntry, AuditSink};

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() { count_files(&path) } else { 1 }
                })
                .sum()
        })
        .unwrap_or(0)
}

async fn student_account_id(t: &TestApp, admin: &str, student_id: &str) -> String {
    let listed = t
        .get(&format!("/admin/students?search={}", student_id), Some(admin))
        .await
        .json();
    listed["students"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["studentId"] == student_id)
        .map(|s| s["id"].as_str().unwrap().to_string())
        .unwrap()
}

async fn wait_for_audit(t: &TestApp, admin: &str, action: &str) -> Value {
    for _ in 0..50 {
        let logs = t
            .get(&format!("/admin/audit-logs?action={}", action), Some(admin))
            .await
            .json();
        if logs["pagination"]["total"].as_u64().unwrap_or(0) > 0 {
            return logs;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no {} audit entry", action);
}

#[tokio::test]
async fn test_cascade_delete_student() {
    let t = spawn_app().await;
    let s1 = t.student_session("S1", "secret1").await;
    let s2 = t.student_session("S2", "secret2").await;
    for name in ["a.pdf", "b.pdf"] {
        t.upload(&s1, name, "application/pdf", &pdf_bytes(256), Some("Transcripts"))
            .await;
    }
    let kept = t
        .upload(&s2, "keep.pdf", "application/pdf", &pdf_bytes(256), Some("Transcripts"))
        .await
        .json();
    assert_eq!(count_files(t.upload_dir.path()), 3);

    let admin = t.admin_session().await;
    let id = student_account_id(&t, &admin, "S1").await;

    let preview = t
        .get(&format!("/admin/students/{}/delete-verification", id), Some(&admin))
        .await
        .json();
    assert_eq!(preview["studentId"], "S1");
    assert_eq!(preview["documentCount"], 2);

    let deleted = t.delete(&format!("/admin/students/{}", id), &admin).await;
    assert_eq!(deleted.status, StatusCode::OK, "{:?}", deleted.json());
    let body = deleted.json();
    assert_eq!(body["deletedStudent"], "S1");
    assert_eq!(body["documentCount"], 2);

    assert_eq!(
        t.state.documents.registry().count_by_owner("S1").await.unwrap(),
        0
    );
    assert_eq!(count_files(t.upload_dir.path()), 1);

    // Old session is dead and the account can no longer log in.
    let me = t.get("/auth/me", Some(&s1)).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    let relogin = t
        .post_json(
            "/auth/login",
            json!({"studentId": "S1", "password": "secret1"}),
            None,
        )
        .await;
    assert_eq!(relogin.status, StatusCode::UNAUTHORIZED);

    let again = t.delete(&format!("/admin/students/{}", id), &admin).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);

    let other = t
        .get(
            &format!("/documents/view/{}", kept["document"]["id"]),
            Some(&s2),
        )
        .await;
    assert_eq!(other.status, StatusCode::OK);

    let logs = wait_for_audit(&t, &admin, "delete_student").await;
    let entry = &logs["logs"][0];
    assert_eq!(entry["studentId"], "admin");
    assert_eq!(entry["details"]["deletedStudentId"], "S1");
    assert_eq!(entry["details"]["documentCount"], 2);
}

#[tokio::test]
async fn test_admin_accounts_cannot_be_cascaded() {
    let t = spawn_app().await;
    let admin = t.admin_session().await;
    let me = t.get("/auth/me", Some(&admin)).await.json();
    let admin_id = me["user"]["id"].as_str().unwrap();

    let response = t.delete(&format!("/admin/students/{}", admin_id), &admin).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let missing = t.delete("/admin/students/no-such-id", &admin).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manage_students_and_passwords() {
    let t = spawn_app().await;
    let admin = t.admin_session().await;

    let created = t
        .post_json(
            "/admin/students",
            json!({
                "studentId": "S7",
                "password": "initial1",
                "name": "Grace Hopper",
                "email": "grace@example.edu",
                "department": "CS"
            }),
            Some(&admin),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.json());

    let duplicate = t
        .post_json(
            "/admin/students",
            json!({"studentId": "S7", "password": "initial1", "name": "Again"}),
            Some(&admin),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);

    t.register("S8", "secret8", "Alan Turing").await;

    let by_name = t.get("/admin/students?search=grace", Some(&admin)).await.json();
    assert_eq!(by_name["students"].as_array().unwrap().len(), 1);
    assert_eq!(by_name["students"][0]["studentId"], "S7");

    let by_email = t
        .get("/admin/students?search=EXAMPLE.EDU", Some(&admin))
        .await
        .json();
    assert_eq!(by_email["students"].as_array().unwrap().len(), 1);

    let everyone = t.get("/admin/students", Some(&admin)).await.json();
    let ids: Vec<&str> = everyone["students"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["studentId"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&"admin"));

    let reset = t
        .post_json(
            "/admin/reset-password",
            json!({"studentId": "S7", "newPassword": "rotated7"}),
            Some(&admin),
        )
        .await;
    assert_eq!(reset.status, StatusCode::OK);

    let old = t
        .post_json(
            "/auth/login",
            json!({"studentId": "S7", "password": "initial1"}),
            None,
        )
        .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);
    let new = t
        .post_json(
            "/auth/login",
            json!({"studentId": "S7", "password": "rotated7"}),
            None,
        )
        .await;
    assert_eq!(new.status, StatusCode::OK);

    let unknown = t
        .post_json(
            "/admin/reset-password",
            json!({"studentId": "nobody", "newPassword": "whatever"}),
            Some(&admin),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let resets = wait_for_audit(&t, &admin, "password_reset").await;
    assert_eq!(resets["logs"][0]["details"]["targetStudentId"], "S7");
}

#[tokio::test]
async fn test_admin_document_listing_and_delete() {
    let t = spawn_app().await;
    let s1 = t.student_session("S1", "secret1").await;
    let s2 = t.student_session("S2", "secret2").await;
    t.upload(&s1, "a.pdf", "application/pdf", &pdf_bytes(64), Some("Transcripts"))
        .await;
    let b = t
        .upload(&s2, "b.png", "image/png", b"\x89PNG data", Some("Photos"))
        .await
        .json();

    let admin = t.admin_session().await;
    let all = t.get("/admin/documents", Some(&admin)).await.json();
    assert_eq!(all["pagination"]["total"], 2);
    assert_eq!(all["documents"][0]["studentId"], "S2");

    let only_s1 = t
        .get("/admin/documents?studentId=S1", Some(&admin))
        .await
        .json();
    assert_eq!(only_s1["pagination"]["total"], 1);
    assert_eq!(only_s1["documents"][0]["studentId"], "S1");

    let id = b["document"]["id"].as_i64().unwrap();
    let deleted = t.delete(&format!("/admin/documents/{}", id), &admin).await;
    assert_eq!(deleted.status, StatusCode::OK);

    let logs = wait_for_audit(&t, &admin, "delete").await;
    assert_eq!(logs["logs"][0]["details"]["deletedBy"], "admin");
    assert_eq!(logs["logs"][0]["details"]["studentId"], "S2");

    let s2_list = t.get("/documents/my-documents", Some(&s2)).await.json();
    assert_eq!(s2_list["pagination"]["total"], 0);
}

struct StalledSink;

#[async_trait]
impl AuditSink for StalledSink {
    async fn append(&self, _entry: AuditEntry) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Err(anyhow::anyhow!("audit store unreachable"))
    }
}

#[tokio::test]
async fn test_audit_failures_do_not_block_requests() {
    let t = spawn_app_with_sink(Arc::new(StalledSink)).await;

    let started = Instant::now();
    let cookie = t.student_session("S1", "secret1").await;
    let uploaded = t
        .upload(&cookie, "a.pdf", "application/pdf", &pdf_bytes(64), Some("T"))
        .await;
    assert_eq!(uploaded.status, StatusCode::CREATED);
    let id = uploaded.json()["document"]["id"].as_i64().unwrap();
    let deleted = t.delete(&format!("/documents/{}", id), &cookie).await;
    assert_eq!(deleted.status, StatusCode::OK);

    assert!(started.elapsed() < Duration::from_secs(2));
}
