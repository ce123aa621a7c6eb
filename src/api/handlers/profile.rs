use super::{ProfileEnvelope, read_upload_form, stream_response, validation_error};
use crate::AppState;
use crate::api::error::AppError;
use crate::models::Identity;
use crate::services::profile_service::ProfileUpdate;
use axum::{
    Extension, Json,
    extract::{Multipart, State},
    response::Response,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    #[validate(range(min = 1900, max = 2100, message = "Invalid year of joining"))]
    pub year_of_joining: Option<i32>,
    pub date_of_birth: Option<NaiveDate>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            display_name: req.name,
            email: req.email,
            department: req.department,
            year: req.year,
            join_year: req.year_of_joining,
            date_of_birth: req.date_of_birth,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUploadResponse {
    pub message: String,
    pub has_profile_photo: bool,
}

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Caller's profile", body = ProfileEnvelope),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "profile"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ProfileEnvelope>, AppError> {
    let account = state.profiles.get(&identity).await?;
    Ok(Json(ProfileEnvelope {
        message: None,
        user: account.into(),
    }))
}

#[utoipa::path(
    put,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileEnvelope),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "profile"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(mut payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileEnvelope>, AppError> {
    // A blank email means "leave unchanged", same as omitting it.
    payload.email = payload
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    payload.validate().map_err(validation_error)?;

    let account = state.profiles.update(&identity, payload.into()).await?;
    Ok(Json(ProfileEnvelope {
        message: Some("Profile updated successfully".to_string()),
        user: account.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/profile/photo",
    request_body(content = Vec<u8>, description = "`photo` image part", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Photo replaced", body = PhotoUploadResponse),
        (status = 400, description = "Missing or rejected image"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "profile"
)]
pub async fn upload_photo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Multipart,
) -> Result<Json<PhotoUploadResponse>, AppError> {
    let file = read_upload_form(multipart, "photo")
        .await?
        .file
        .ok_or_else(|| AppError::Validation("No photo provided".to_string()))?;

    let account = state.profiles.upload_photo(&identity, file).await?;
    Ok(Json(PhotoUploadResponse {
        message: "Profile photo uploaded successfully".to_string(),
        has_profile_photo: account.profile_photo_key.is_some(),
    }))
}

#[utoipa::path(
    get,
    path = "/profile/photo",
    responses(
        (status = 200, description = "Photo bytes"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No photo on record, or the file is gone")
    ),
    security(
        ("cookie" = [])
    ),
    tag = "profile"
)]
pub async fn get_photo(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, AppError> {
    let photo = state.profiles.photo(&identity).await?;
    stream_response(photo.reader, photo.content_type, None)
}
