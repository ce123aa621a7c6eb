use crate::api::error::AppError;
use crate::entities::{accounts, prelude::*};
use crate::models::{Identity, IncomingFile};
use crate::services::storage::{BlobReader, StorageService};
use crate::utils::sanitize::derive_profile_photo_path;
use crate::utils::validation::{FileCandidate, UploadPolicy, extension_of};
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use std::sync::Arc;
use tracing::{info, warn};

/// Self-service profile edit. `None` and blank strings leave a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub join_year: Option<i32>,
    pub date_of_birth: Option<NaiveDate>,
}

pub struct ProfilePhoto {
    pub content_type: &'static str,
    pub reader: BlobReader,
}

#[derive(Clone)]
pub struct ProfileService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    policy: UploadPolicy,
}

fn provided(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Content type served for a stored photo, from its key's extension.
pub fn photo_content_type(key: &str) -> &'static str {
    match extension_of(key).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

impl ProfileService {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn StorageService>, max_photo_size: usize) -> Self {
        Self {
            db,
            storage,
            policy: UploadPolicy::profile_photos(max_photo_size),
        }
    }

    pub async fn get(&self, actor: &Identity) -> Result<accounts::Model, AppError> {
        Accounts::find_by_id(actor.account_id.as_str())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    pub async fn update(
        &self,
        actor: &Identity,
        update: ProfileUpdate,
    ) -> Result<accounts::Model, AppError> {
        let account = self.get(actor).await?;
        let mut active = account.into_active_model();

        if let Some(name) = provided(update.display_name) {
            active.display_name = Set(name);
        }
        if let Some(email) = provided(update.email) {
            active.email = Set(Some(email));
        }
        if let Some(department) = provided(update.department) {
            active.department = Set(Some(department));
        }
        if let Some(year) = provided(update.year) {
            active.year = Set(Some(year));
        }
        if let Some(join_year) = update.join_year {
            active.join_year = Set(Some(join_year));
        }
        if let Some(dob) = update.date_of_birth {
            active.date_of_birth = Set(Some(dob));
        }

        Ok(active.update(&self.db).await?)
    }

    /// Stores the new photo, points the account at it, then drops the old one.
    pub async fn upload_photo(
        &self,
        actor: &Identity,
        file: IncomingFile,
    ) -> Result<accounts::Model, AppError> {
        self.policy
            .validate(&FileCandidate {
                size_bytes: file.size(),
                mime_type: &file.mime_type,
                original_name: &file.original_name,
            })
            .map_err(|_| {
                AppError::Validation(
                    "Only image files are allowed (JPEG, PNG, GIF, WEBP, BMP, ICO) up to 5MB"
                        .to_string(),
                )
            })?;

        let account = self.get(actor).await?;
        let key = derive_profile_photo_path(&account.external_id, &file.original_name);

        self.storage
            .upload_file(&key, file.data.to_vec())
            .await
            .map_err(|e| {
                AppError::Storage(e.context(format!("profile photo for {}", account.external_id)))
            })?;

        let previous = account.profile_photo_key.clone();
        let mut active = account.into_active_model();
        active.profile_photo_key = Set(Some(key));
        let updated = active.update(&self.db).await?;

        if let Some(old) = previous {
            if let Err(e) = self.storage.delete_file(&old).await {
                warn!(
                    "Failed to delete previous profile photo for {}: {:#}",
                    updated.external_id, e
                );
            }
        }

        info!("🖼️ {} updated profile photo", updated.external_id);
        Ok(updated)
    }

    pub async fn photo(&self, actor: &Identity) -> Result<ProfilePhoto, AppError> {
        let account = self.get(actor).await?;
        let key = account
            .profile_photo_key
            .ok_or_else(|| AppError::NotFound("Profile photo not found".to_string()))?;

        if !self.storage.file_exists(&key).await.map_err(AppError::Storage)? {
            return Err(AppError::NotFound("Photo file not found".to_string()));
        }

        let reader = self
            .storage
            .open_stream(&key)
            .await
            .map_err(AppError::Storage)?;

        Ok(ProfilePhoto {
            content_type: photo_content_type(&key),
            reader,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::setup_database;
    use crate::models::{RequestContext, Role};
    use crate::services::account_service::{AccountService, NewStudent};
    use crate::services::audit::AuditService;
    use crate::services::storage::LocalStorageService;
    use crate::utils::keyed_mutex::KeyedMutex;

    #[test]
    fn test_photo_content_type() {
        assert_eq!(photo_content_type("uploads/profiles/S1-1-abc.jpg"), "image/jpeg");
        assert_eq!(photo_content_type("uploads/profiles/S1-1-abc.ico"), "image/x-icon");
        assert_eq!(photo_content_type("uploads/profiles/S1-1-abc"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_photo_replacement_and_profile_update() {
        let db = setup_database("sqlite::memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::new(dir.path()));
        let accounts = AccountService::new(
            db.clone(),
            storage.clone(),
            AuditService::new(db.clone()),
            KeyedMutex::new(),
        );
        let account = accounts
            .register_student(
                NewStudent {
                    external_id: "S1".to_string(),
                    password: "secret1".to_string(),
                    display_name: "Student One".to_string(),
                    ..Default::default()
                },
                &RequestContext::default(),
            )
            .await
            .unwrap();
        let actor = Identity {
            account_id: account.id.clone(),
            external_id: account.external_id.clone(),
            role: Role::Student,
        };
        let profiles = ProfileService::new(db.clone(), storage.clone(), 5 * 1024 * 1024);

        let photo = |name: &str, mime: &str| IncomingFile {
            original_name: name.to_string(),
            mime_type: mime.to_string(),
            data: bytes::Bytes::from_static(b"\x89PNG"),
        };

        let err = profiles.upload_photo(&actor, photo("cv.pdf", "application/pdf")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let first = profiles.upload_photo(&actor, photo("me.png", "image/png")).await.unwrap();
        let first_key = first.profile_photo_key.unwrap();
        assert!(first_key.starts_with("uploads/profiles/S1-"));

        let second = profiles.upload_photo(&actor, photo("me2.PNG", "image/png")).await.unwrap();
        let second_key = second.profile_photo_key.unwrap();
        assert_ne!(first_key, second_key);
        assert!(!storage.file_exists(&first_key).await.unwrap());
        assert_eq!(profiles.photo(&actor).await.ok().unwrap().content_type, "image/png");

        let updated = profiles
            .update(
                &actor,
                ProfileUpdate {
                    display_name: Some("  ".to_string()),
                    department: Some("Physics".to_string()),
                    join_year: Some(2022),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Student One");
        assert_eq!(updated.department.as_deref(), Some("Physics"));
        assert_eq!(updated.join_year, Some(2022));
    }
}
