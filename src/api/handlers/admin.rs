use super::{
    AccountEnvelope, DocumentListResponse, DocumentSummary, ListDocumentsQuery, MessageResponse,
    validation_error,
};
use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::DocumentId;
use crate::entities::{accounts, audit_logs};
use crate::models::{AuditAction, AuditQuery, DocumentQuery, Identity, RequestContext, Role};
use crate::services::account_service::NewStudent;
use crate::services::authorization;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StudentSearchQuery {
    /// Case-insensitive substring of student ID, name or email
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentListItem {
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<accounts::Model> for StudentListItem {
    fn from(account: accounts::Model) -> Self {
        Self {
            id: account.id,
            student_id: account.external_id,
            name: account.display_name,
            email: account.email,
            department: account.department,
            year: account.year,
            created_at: account.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StudentListResponse {
    pub students: Vec<StudentListItem>,
}

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, message = "Student ID is required"))]
    pub student_id: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email"))]
    pub email: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
}

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Student ID is required"))]
    pub student_id: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVerificationResponse {
    pub student_id: String,
    pub name: String,
    pub document_count: u64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteStudentResponse {
    pub message: String,
    pub deleted_student: String,
    pub document_count: usize,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub action: Option<AuditAction>,
    pub actor_external_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogItem {
    pub id: String,
    pub student_id: String,
    pub action: AuditAction,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<audit_logs::Model> for AuditLogItem {
    fn from(entry: audit_logs::Model) -> Self {
        Self {
            id: entry.id,
            student_id: entry.actor_external_id,
            action: entry.action,
            details: entry.details,
            ip_address: entry.source_ip,
            user_agent: entry.user_agent,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuditLogListResponse {
    pub logs: Vec<AuditLogItem>,
    pub pagination: super::Pagination,
}

#[utoipa::path(
    get,
    path = "/admin/documents",
    params(ListDocumentsQuery),
    responses(
        (status = 200, description = "All documents, newest first", body = DocumentListResponse),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "admin"
)]
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let mut filter = DocumentQuery::new(query.page, query.limit)
        .with_category(query.category)
        .with_search(query.search);
    if let Some(owner) = query.student_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        filter = filter.owned_by(owner);
    }

    let page = state.documents.list_all(&identity, filter).await?;
    Ok(Json(DocumentListResponse::from_page(
        page.map(DocumentSummary::with_owner),
    )))
}

#[utoipa::path(
    delete,
    path = "/admin/documents/{id}",
    params(
        ("id" = i64, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document deleted", body = MessageResponse),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Document not found")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "admin"
)]
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    context: RequestContext,
    DocumentId(id): DocumentId,
) -> Result<Json<MessageResponse>, AppError> {
    authorization::require_role(&identity, Role::Admin)?;
    state.documents.delete(&identity, id, &context).await?;
    Ok(Json(MessageResponse::new("Document deleted successfully")))
}

#[utoipa::path(
    post,
    path = "/admin/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Student not found")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "admin"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    context: RequestContext,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.validate().map_err(validation_error)?;
    state
        .accounts
        .reset_password(&identity, &payload.student_id, &payload.new_password, &context)
        .await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

#[utoipa::path(
    get,
    path = "/admin/students",
    params(StudentSearchQuery),
    responses(
        (status = 200, description = "Students, newest first", body = StudentListResponse),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "admin"
)]
pub async fn list_students(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<StudentSearchQuery>,
) -> Result<Json<StudentListResponse>, AppError> {
    let students = state
        .accounts
        .list_students(&identity, query.search.as_deref())
        .await?;
    Ok(Json(StudentListResponse {
        students: students.into_iter().map(StudentListItem::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/students",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student created", body = AccountEnvelope),
        (status = 400, description = "Invalid input or Student ID already exists"),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "admin"
)]
pub async fn create_student(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    context: RequestContext,
    Json(mut payload): Json<CreateStudentRequest>,
) -> Result<(StatusCode, Json<AccountEnvelope>), AppError> {
    payload.email = payload
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    payload.validate().map_err(validation_error)?;

    let account = state
        .accounts
        .create_student(
            &identity,
            NewStudent {
                external_id: payload.student_id,
                password: payload.password,
                display_name: payload.name,
                email: payload.email,
                department: payload.department,
                year: payload.year,
                ..Default::default()
            },
            &context,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountEnvelope {
            message: "Student created successfully".to_string(),
            user: account.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/admin/students/{id}/delete-verification",
    params(
        ("id" = String, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "What a delete would remove", body = DeleteVerificationResponse),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Student not found")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "admin"
)]
pub async fn delete_verification(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<DeleteVerificationResponse>, AppError> {
    let preview = state.accounts.delete_verification(&identity, &id).await?;
    Ok(Json(DeleteVerificationResponse {
        student_id: preview.account.external_id,
        name: preview.account.display_name,
        document_count: preview.document_count,
    }))
}

#[utoipa::path(
    delete,
    path = "/admin/students/{id}",
    params(
        ("id" = String, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "Student and all their documents deleted", body = DeleteStudentResponse),
        (status = 403, description = "Admin access required, or target is not a student"),
        (status = 404, description = "Student not found")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "admin"
)]
pub async fn delete_student(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    context: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<DeleteStudentResponse>, AppError> {
    let deletion = state.accounts.delete_student(&identity, &id, &context).await?;
    Ok(Json(DeleteStudentResponse {
        message: "Student and all associated data deleted successfully".to_string(),
        deleted_student: deletion.external_id,
        document_count: deletion.document_count,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Audit trail, newest first", body = AuditLogListResponse),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "admin"
)]
pub async fn audit_logs(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogListResponse>, AppError> {
    let filter = AuditQuery::new(query.page, query.limit)
        .with_action(query.action)
        .by_actor(query.actor_external_id);
    let page = state.audit.list(&identity, &filter).await?;

    let pagination = super::Pagination {
        page: page.page,
        limit: page.page_size,
        total: page.total_count,
        pages: page.pages(),
    };
    Ok(Json(AuditLogListResponse {
        logs: page.items.into_iter().map(AuditLogItem::from).collect(),
        pagination,
    }))
}
