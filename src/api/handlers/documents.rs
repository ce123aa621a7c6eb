use super::{
    DocumentListResponse, DocumentSummary, ListDocumentsQuery, MessageResponse,
    content_disposition, read_upload_form, stream_response,
};
use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::DocumentId;
use crate::models::{Disposition, DocumentQuery, Identity, RequestContext};
use axum::{
    Extension, Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub document: DocumentSummary,
}

#[derive(Serialize, ToSchema)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_documents: u64,
    pub total_bytes: i64,
    pub recent_uploads: u64,
    /// Advisory quota, not enforced on upload
    pub storage_limit: u64,
}

#[utoipa::path(
    post,
    path = "/documents/upload",
    request_body(content = Vec<u8>, description = "`file` part plus a `category` text field", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document stored", body = UploadResponse),
        (status = 400, description = "Missing file/category or file rejected"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Students only")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "documents"
)]
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    context: RequestContext,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut form = read_upload_form(multipart, "file").await?;

    let file = form
        .file
        .take()
        .ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    let category = form
        .fields
        .remove("category")
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Category is required".to_string()))?;

    let document = state
        .documents
        .upload(&identity, &category, file, &context)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Document uploaded successfully".to_string(),
            document: DocumentSummary::owned(document),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/documents/my-documents",
    params(ListDocumentsQuery),
    responses(
        (status = 200, description = "Caller's documents, newest first", body = DocumentListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "documents"
)]
pub async fn my_documents(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let query = DocumentQuery::new(query.page, query.limit)
        .with_category(query.category)
        .with_search(query.search);

    let page = state.documents.list_own(&identity, query).await?;
    Ok(Json(DocumentListResponse::from_page(
        page.map(DocumentSummary::owned),
    )))
}

#[utoipa::path(
    get,
    path = "/documents/categories",
    responses(
        (status = 200, description = "Distinct categories of the caller's documents", body = CategoriesResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "documents"
)]
pub async fn categories(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<CategoriesResponse>, AppError> {
    let categories = state.documents.categories(&identity).await?;
    Ok(Json(CategoriesResponse { categories }))
}

#[utoipa::path(
    get,
    path = "/documents/stats",
    responses(
        (status = 200, description = "Usage summary", body = StatsResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "documents"
)]
pub async fn stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.documents.stats(&identity).await?;
    Ok(Json(StatsResponse {
        total_documents: stats.count,
        total_bytes: stats.total_bytes,
        recent_uploads: stats.recent_count,
        storage_limit: state.config.storage_limit_bytes,
    }))
}

async fn serve(
    state: &AppState,
    identity: &Identity,
    id: i64,
    disposition: Disposition,
    context: &RequestContext,
) -> Result<Response, AppError> {
    let opened = state
        .documents
        .open(identity, id, disposition, context)
        .await?;
    stream_response(
        opened.reader,
        &opened.document.mime_type,
        Some(content_disposition(
            disposition.as_str(),
            &opened.document.original_name,
        )),
    )
}

#[utoipa::path(
    get,
    path = "/documents/view/{id}",
    params(
        ("id" = i64, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document bytes, inline"),
        (status = 403, description = "Neither owner nor admin"),
        (status = 404, description = "Document or file not found")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "documents"
)]
pub async fn view_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    context: RequestContext,
    DocumentId(id): DocumentId,
) -> Result<Response, AppError> {
    serve(&state, &identity, id, Disposition::Inline, &context).await
}

#[utoipa::path(
    get,
    path = "/documents/download/{id}",
    params(
        ("id" = i64, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document bytes, as attachment"),
        (status = 403, description = "Neither owner nor admin"),
        (status = 404, description = "Document or file not found")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "documents"
)]
pub async fn download_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    context: RequestContext,
    DocumentId(id): DocumentId,
) -> Result<Response, AppError> {
    serve(&state, &identity, id, Disposition::Attachment, &context).await
}

#[utoipa::path(
    delete,
    path = "/documents/{id}",
    params(
        ("id" = i64, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document deleted", body = MessageResponse),
        (status = 403, description = "Neither owner nor admin"),
        (status = 404, description = "Document not found")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "documents"
)]
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    context: RequestContext,
    DocumentId(id): DocumentId,
) -> Result<Json<MessageResponse>, AppError> {
    state.documents.delete(&identity, id, &context).await?;
    Ok(Json(MessageResponse::new("Document deleted successfully")))
}
