//! Role and ownership decisions. Pure functions over an explicit [`Identity`].

use crate::api::error::AppError;
use crate::entities::documents;
use crate::models::{Identity, Role};

/// Admins see everything; anyone else only what they own.
pub fn can_access(actor: &Identity, document: &documents::Model) -> bool {
    actor.is_admin() || actor.external_id == document.owner_external_id
}

pub fn require_role(actor: &Identity, role: Role) -> Result<(), AppError> {
    if actor.role == role {
        Ok(())
    } else {
        tracing::warn!(
            "🚫 {} ({}) denied: requires {} role",
            actor.external_id,
            actor.role,
            role
        );
        Err(AppError::Forbidden(format!("{} access required", capitalize(role.as_str()))))
    }
}

/// Forbidden rather than NotFound, so owners and outsiders are told apart.
pub fn authorize_document(actor: &Identity, document: &documents::Model) -> Result<(), AppError> {
    if can_access(actor, document) {
        Ok(())
    } else {
        tracing::warn!(
            "🚫 {} denied access to document {} owned by {}",
            actor.external_id,
            document.id,
            document.owner_external_id
        );
        Err(AppError::Forbidden("Access denied".to_string()))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
