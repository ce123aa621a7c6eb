use super::{AccountEnvelope, MessageResponse, ProfileEnvelope, validation_error};
use crate::AppState;
use crate::api::error::AppError;
use crate::entities::accounts;
use crate::models::{Identity, RequestContext, Role};
use crate::services::account_service::NewStudent;
use crate::utils::auth::{SESSION_COOKIE, create_jwt};
use axum::{Extension, Json, extract::State, http::StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Student ID is required"))]
    pub student_id: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
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
    pub year_of_joining: Option<i32>,
    pub date_of_birth: Option<NaiveDate>,
}

impl RegisterRequest {
    /// Trims inputs; a blank email counts as absent.
    fn normalized(mut self) -> Self {
        self.student_id = self.student_id.trim().to_string();
        self.name = self.name.trim().to_string();
        self.email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        self
    }
}

impl From<RegisterRequest> for NewStudent {
    fn from(req: RegisterRequest) -> Self {
        Self {
            external_id: req.student_id,
            password: req.password,
            display_name: req.name,
            email: req.email,
            department: req.department,
            year: req.year,
            join_year: req.year_of_joining,
            date_of_birth: req.date_of_birth,
        }
    }
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let same_site = if state.config.cookie_secure {
        SameSite::Strict
    } else {
        SameSite::Lax
    };
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(same_site)
        .path("/")
        .max_age(time::Duration::minutes(state.config.session_ttl_minutes))
        .build()
}

async fn sign_in(
    state: &AppState,
    jar: CookieJar,
    payload: LoginRequest,
    scope: Role,
    context: &RequestContext,
) -> Result<(CookieJar, Json<AccountEnvelope>), AppError> {
    payload.validate().map_err(validation_error)?;

    let account: accounts::Model = state
        .accounts
        .authenticate(&payload.student_id, &payload.password, scope, context)
        .await?;

    let token = create_jwt(
        &account.id,
        account.role,
        &state.config.jwt_secret,
        state.config.session_ttl_minutes,
    )?;

    let message = match scope {
        Role::Admin => "Admin login successful",
        Role::Student => "Login successful",
    };

    Ok((
        jar.add(session_cookie(state, token)),
        Json(AccountEnvelope {
            message: message.to_string(),
            user: account.into(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Student registered", body = AccountEnvelope),
        (status = 400, description = "Invalid input or Student ID already exists")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    context: RequestContext,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountEnvelope>), AppError> {
    let payload = payload.normalized();
    payload.validate().map_err(validation_error)?;

    let account = state
        .accounts
        .register_student(payload.into(), &context)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountEnvelope {
            message: "Registration successful".to_string(),
            user: account.into(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session cookie set", body = AccountEnvelope),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    context: RequestContext,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AccountEnvelope>), AppError> {
    sign_in(&state, jar, payload, Role::Student, &context).await
}

#[utoipa::path(
    post,
    path = "/auth/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session cookie set", body = AccountEnvelope),
        (status = 401, description = "Invalid admin credentials")
    ),
    tag = "auth"
)]
pub async fn admin_login(
    State(state): State<AppState>,
    jar: CookieJar,
    context: RequestContext,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AccountEnvelope>), AppError> {
    sign_in(&state, jar, payload, Role::Admin, &context).await
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cookie cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/")),
        Json(MessageResponse::new("Logout successful")),
    )
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current account", body = ProfileEnvelope),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ProfileEnvelope>, AppError> {
    let account = state
        .accounts
        .find_by_id(&identity.account_id)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Account no longer exists".to_string()))?;

    Ok(Json(ProfileEnvelope {
        message: None,
        user: account.into(),
    }))
}
