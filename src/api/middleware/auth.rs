use crate::AppState;
use crate::api::error::AppError;
use crate::models::Identity;
use crate::utils::auth::{SESSION_COOKIE, validate_jwt};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

/// Resolves the session (cookie, or `Authorization: Bearer`) to an
/// [`Identity`] and attaches it to the request. The account is reloaded on
/// every request, so deleted accounts lose access and the role comes from the
/// database rather than the token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string());

    let token = bearer
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthenticated("Authentication required".to_string()))?;

    let claims = validate_jwt(&token, &state.config.jwt_secret)
        .map_err(|_| AppError::Unauthenticated("Invalid or expired session".to_string()))?;

    let account = state
        .accounts
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Account no longer exists".to_string()))?;

    req.extensions_mut().insert(Identity {
        account_id: account.id,
        external_id: account.external_id,
        role: account.role,
    });

    Ok(next.run(req).await)
}
