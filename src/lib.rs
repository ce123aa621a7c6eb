pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::handlers::{admin, auth, documents, health, profile};
use crate::config::SecurityConfig;
use crate::services::account_service::AccountService;
use crate::services::audit::{AuditService, AuditSink};
use crate::services::document_service::DocumentService;
use crate::services::profile_service::ProfileService;
use crate::services::storage::StorageService;
use crate::utils::auth::SESSION_COOKIE;
use crate::utils::keyed_mutex::KeyedMutex;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Multipart framing allowance on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::admin_login,
        auth::logout,
        auth::me,
        documents::upload_document,
        documents::my_documents,
        documents::categories,
        documents::stats,
        documents::view_document,
        documents::download_document,
        documents::delete_document,
        profile::get_profile,
        profile::update_profile,
        profile::upload_photo,
        profile::get_photo,
        admin::list_documents,
        admin::delete_document,
        admin::reset_password,
        admin::list_students,
        admin::create_student,
        admin::delete_verification,
        admin::delete_student,
        admin::audit_logs,
    ),
    components(
        schemas(
            models::Role,
            models::AuditAction,
            api::handlers::MessageResponse,
            api::handlers::AccountSummary,
            api::handlers::AccountEnvelope,
            api::handlers::ProfileResponse,
            api::handlers::ProfileEnvelope,
            api::handlers::DocumentSummary,
            api::handlers::Pagination,
            api::handlers::DocumentListResponse,
            health::HealthResponse,
            auth::LoginRequest,
            auth::RegisterRequest,
            documents::UploadResponse,
            documents::CategoriesResponse,
            documents::StatsResponse,
            profile::UpdateProfileRequest,
            profile::PhotoUploadResponse,
            admin::StudentListItem,
            admin::StudentListResponse,
            admin::CreateStudentRequest,
            admin::ResetPasswordRequest,
            admin::DeleteVerificationResponse,
            admin::DeleteStudentResponse,
            admin::AuditLogItem,
            admin::AuditLogListResponse,
        )
    ),
    modifiers(&SessionCookieAddon),
    tags(
        (name = "system", description = "Liveness"),
        (name = "auth", description = "Registration and sessions"),
        (name = "documents", description = "Student document vault"),
        (name = "profile", description = "Self-service profile and photo"),
        (name = "admin", description = "Student, document and audit management")
    )
)]
pub struct ApiDoc;

struct SessionCookieAddon;

impl Modify for SessionCookieAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub audit: AuditService,
    pub documents: DocumentService,
    pub accounts: AccountService,
    pub profiles: ProfileService,
    pub config: SecurityConfig,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: SecurityConfig,
    ) -> Self {
        let audit = AuditService::new(db.clone());
        Self::assemble(db, storage, config, audit)
    }

    /// Same wiring, with audit entries sent to `sink` instead of the database.
    pub fn with_audit_sink(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: SecurityConfig,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let audit = AuditService::with_sink(db.clone(), sink);
        Self::assemble(db, storage, config, audit)
    }

    fn assemble(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: SecurityConfig,
        audit: AuditService,
    ) -> Self {
        // Uploads and the student cascade must serialize on the same owner key.
        let owner_locks = KeyedMutex::new();

        Self {
            documents: DocumentService::new(
                db.clone(),
                storage.clone(),
                audit.clone(),
                owner_locks.clone(),
                config.max_file_size,
            ),
            accounts: AccountService::new(db.clone(), storage.clone(), audit.clone(), owner_locks),
            profiles: ProfileService::new(db.clone(), storage.clone(), config.max_profile_photo_size),
            db,
            storage,
            audit,
            config,
        }
    }
}

fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("⚠️ Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    // Credentialed CORS forbids wildcards, so everything is listed.
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(api::middleware::request_id::REQUEST_ID_HEADER),
        ])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static(api::middleware::request_id::REQUEST_ID_HEADER),
        ])
}

pub fn create_app(state: AppState) -> Router {
    let upload_limit = state.config.max_file_size + MULTIPART_OVERHEAD;
    let photo_limit = state.config.max_profile_photo_size + MULTIPART_OVERHEAD;

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route(
            "/documents/upload",
            post(documents::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/documents/my-documents", get(documents::my_documents))
        .route("/documents/categories", get(documents::categories))
        .route("/documents/stats", get(documents::stats))
        .route("/documents/view/:id", get(documents::view_document))
        .route("/documents/download/:id", get(documents::download_document))
        .route("/documents/:id", delete(documents::delete_document))
        .route(
            "/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route(
            "/profile/photo",
            get(profile::get_photo)
                .post(profile::upload_photo)
                .layer(DefaultBodyLimit::max(photo_limit)),
        )
        .route("/admin/documents", get(admin::list_documents))
        .route("/admin/documents/:id", delete(admin::delete_document))
        .route("/admin/reset-password", post(admin::reset_password))
        .route(
            "/admin/students",
            get(admin::list_students).post(admin::create_student),
        )
        .route(
            "/admin/students/:id/delete-verification",
            get(admin::delete_verification),
        )
        .route("/admin/students/:id", delete(admin::delete_student))
        .route("/admin/audit-logs", get(admin::audit_logs))
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/admin/login", post(auth::admin_login))
        .route("/auth/logout", post(auth::logout))
        .merge(protected)
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
