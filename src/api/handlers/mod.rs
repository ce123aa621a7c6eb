pub mod admin;
pub mod auth;
pub mod documents;
pub mod health;
pub mod profile;

use crate::api::error::AppError;
use crate::entities::{accounts, documents as document_entity};
use crate::models::{IncomingFile, Page, Role};
use axum::{
    body::Body,
    extract::multipart::{Multipart, MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::{DateTime, NaiveDate, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::io::ReaderStream;
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Minimal account view returned by auth and admin create calls.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub student_id: String,
    pub role: Role,
    pub name: String,
}

impl From<accounts::Model> for AccountSummary {
    fn from(account: accounts::Model) -> Self {
        Self {
            id: account.id,
            student_id: account.external_id,
            role: account.role,
            name: account.display_name,
        }
    }
}

/// Full profile fields. Never includes the password hash or photo key.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub student_id: String,
    pub role: Role,
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub year_of_joining: Option<i32>,
    pub date_of_birth: Option<NaiveDate>,
    pub has_profile_photo: bool,
    pub created_at: DateTime<Utc>,
}

impl From<accounts::Model> for ProfileResponse {
    fn from(account: accounts::Model) -> Self {
        Self {
            has_profile_photo: account.profile_photo_key.is_some(),
            id: account.id,
            student_id: account.external_id,
            role: account.role,
            name: account.display_name,
            email: account.email,
            department: account.department,
            year: account.year,
            year_of_joining: account.join_year,
            date_of_birth: account.date_of_birth,
            created_at: account.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AccountEnvelope {
    pub message: String,
    pub user: AccountSummary,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user: ProfileResponse,
}

/// Client-facing document metadata. The blob path stays server-side.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: i64,
    pub original_filename: String,
    pub category: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl DocumentSummary {
    pub fn owned(doc: document_entity::Model) -> Self {
        Self::build(doc, false)
    }

    pub fn with_owner(doc: document_entity::Model) -> Self {
        Self::build(doc, true)
    }

    fn build(doc: document_entity::Model, include_owner: bool) -> Self {
        Self {
            id: doc.id,
            original_filename: doc.original_name,
            category: doc.category,
            file_size: doc.byte_size,
            mime_type: doc.mime_type,
            uploaded_at: doc.uploaded_at,
            student_id: include_owner.then_some(doc.owner_external_id),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Serialize, ToSchema)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
    pub pagination: Pagination,
}

impl DocumentListResponse {
    pub fn from_page(page: Page<DocumentSummary>) -> Self {
        let pagination = Pagination {
            page: page.page,
            limit: page.page_size,
            total: page.total_count,
            pages: page.pages(),
        };
        Self {
            documents: page.items,
            pagination,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsQuery {
    /// 1-indexed page (default 1)
    pub page: Option<u64>,
    /// Page size (default 10, max 100)
    pub limit: Option<u64>,
    pub category: Option<String>,
    /// Case-insensitive substring of filename or category
    pub search: Option<String>,
    /// Admin listing only: exact owner filter
    pub student_id: Option<String>,
}

pub(crate) fn validation_error(errors: validator::ValidationErrors) -> AppError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}", field))
            })
        })
        .collect();
    messages.sort();
    AppError::Validation(messages.join("; "))
}

/// Multipart body split into one file part and the remaining text fields.
pub(crate) struct UploadForm {
    pub file: Option<IncomingFile>,
    pub fields: HashMap<String, String>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the request size limit".to_string())
    } else {
        AppError::Validation(format!("Malformed upload: {}", e.body_text()))
    }
}

pub(crate) async fn read_upload_form(
    mut multipart: Multipart,
    file_field: &str,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        file: None,
        fields: HashMap::new(),
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field && form.file.is_none() {
            let original_name = field.file_name().unwrap_or("upload").to_string();
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field.bytes().await.map_err(multipart_error)?;
            form.file = Some(IncomingFile {
                original_name,
                mime_type,
                data,
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// `Content-Disposition` with an ASCII fallback and an RFC 5987 UTF-8 name.
pub(crate) fn content_disposition(kind: &str, filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        kind,
        fallback,
        utf8_percent_encode(filename, NON_ALPHANUMERIC)
    )
}

pub(crate) fn stream_response(
    reader: crate::services::storage::BlobReader,
    content_type: &str,
    disposition: Option<String>,
) -> Result<Response, AppError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
        )
        .header(header::CACHE_CONTROL, "private, no-store");

    if let Some(disposition) = disposition {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("building stream response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_escapes_names() {
        assert_eq!(
            content_disposition("attachment", "Mark Sheet.pdf"),
            "attachment; filename=\"Mark Sheet.pdf\"; filename*=UTF-8''Mark%20Sheet%2Epdf"
        );
        let header = content_disposition("inline", "a\"b\r\n.pdf");
        assert!(header.starts_with("inline; filename=\"a_b__.pdf\""));
        assert!(!header.contains('\n'));
    }

    #[test]
    fn test_document_summary_hides_blob_path() {
        let doc = document_entity::Model {
            id: 7,
            owner_external_id: "S1".to_string(),
            stored_name: "t_1_abc.pdf".to_string(),
            original_name: "t.pdf".to_string(),
            blob_path: "uploads/S1/T/t_1_abc.pdf".to_string(),
            category: "T".to_string(),
            original_name_folded: "t.pdf".to_string(),
            category_folded: "t".to_string(),
            byte_size: 10240,
            mime_type: "application/pdf".to_string(),
            uploaded_at: Utc::now(),
        };
        let owned = serde_json::to_value(DocumentSummary::owned(doc.clone())).unwrap();
        assert_eq!(owned["fileSize"], 10240);
        assert!(owned.get("studentId").is_none());
        assert!(!owned.to_string().contains("uploads/"));

        let admin = serde_json::to_value(DocumentSummary::with_owner(doc)).unwrap();
        assert_eq!(admin["studentId"], "S1");
    }
}
