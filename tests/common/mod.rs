#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use student_vault::config::SecurityConfig;
use student_vault::infrastructure::database;
use student_vault::services::audit::AuditSink;
use student_vault::services::storage::LocalStorageService;
use student_vault::{AppState, create_app};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "----student-vault-test-boundary";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub upload_dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn(None).await
}

pub async fn spawn_app_with_sink(sink: Arc<dyn AuditSink>) -> TestApp {
    spawn(Some(sink)).await
}

async fn spawn(sink: Option<Arc<dyn AuditSink>>) -> TestApp {
    let db = database::setup_database("sqlite::memory:").await.unwrap();
    let upload_dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorageService::new(upload_dir.path()));
    let config = SecurityConfig::development();

    let state = match sink {
        Some(sink) => AppState::with_audit_sink(db, storage, config, sink),
        None => AppState::new(db, storage, config),
    };

    TestApp {
        app: create_app(state.clone()),
        state,
        upload_dir,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }

    /// `token=...` pair from `Set-Cookie`, ready for a `Cookie` header.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("token="))
            .and_then(|v| v.split(';').next())
            .map(|v| v.to_string())
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        TestResponse {
            status,
            headers,
            bytes,
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str, cookie: &str) -> TestResponse {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn register(&self, student_id: &str, password: &str, name: &str) -> TestResponse {
        self.post_json(
            "/auth/register",
            json!({"studentId": student_id, "password": password, "name": name}),
            None,
        )
        .await
    }

    /// Registers (if needed) and logs in a student, returning the cookie.
    pub async fn student_session(&self, student_id: &str, password: &str) -> String {
        self.register(student_id, password, &format!("Student {}", student_id))
            .await;
        let response = self
            .post_json(
                "/auth/login",
                json!({"studentId": student_id, "password": password}),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.json());
        response.session_cookie().unwrap()
    }

    pub async fn admin_session(&self) -> String {
        if self
            .state
            .accounts
            .find_by_external_id("admin")
            .await
            .unwrap()
            .is_none()
        {
            self.state
                .accounts
                .provision_admin("admin", "admin123", "Administrator")
                .await
                .unwrap();
        }
        let response = self
            .post_json(
                "/auth/admin/login",
                json!({"studentId": "admin", "password": "admin123"}),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.json());
        response.session_cookie().unwrap()
    }

    pub async fn upload(
        &self,
        cookie: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        category: Option<&str>,
    ) -> TestResponse {
        let body = multipart_body("file", filename, content_type, data, category);
        self.send(
            Request::builder()
                .method("POST")
                .uri("/documents/upload")
                .header(header::COOKIE, cookie)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

pub fn multipart_body(
    field: &str,
    filename: &str,
    content_type: &str,
    data: &[u8],
    category: Option<&str>,
) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(category) = category {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"category\"\r\n\r\n{}\r\n",
                BOUNDARY, category
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            BOUNDARY, field, filename, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// A PDF-looking payload of exactly `len` bytes.
pub fn pdf_bytes(len: usize) -> Vec<u8> {
    let mut data = b"%PDF-1.4\n".to_vec();
    data.resize(len, b'A');
    data
}
