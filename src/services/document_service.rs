use crate::api::error::AppError;
use crate::entities::{accounts, documents, prelude::*};
use crate::models::{
    AuditAction, Disposition, DocumentQuery, DocumentStats, Identity, IncomingFile, Page,
    RequestContext, Role,
};
use crate::services::audit::AuditService;
use crate::services::authorization;
use crate::services::document_registry::{DocumentRegistry, NewDocument};
use crate::services::storage::{BlobReader, StorageService};
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::sanitize::{derive_blob_path, derive_stored_name, sanitize_category};
use crate::utils::validation::{FileCandidate, UploadPolicy};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// A readable document together with its metadata.
pub struct OpenedDocument {
    pub document: documents::Model,
    pub reader: BlobReader,
}

#[derive(Clone)]
pub struct DocumentService {
    db: DatabaseConnection,
    registry: DocumentRegistry,
    storage: Arc<dyn StorageService>,
    audit: AuditService,
    owner_locks: KeyedMutex,
    policy: UploadPolicy,
}

impl DocumentService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        audit: AuditService,
        owner_locks: KeyedMutex,
        max_file_size: usize,
    ) -> Self {
        Self {
            registry: DocumentRegistry::new(db.clone()),
            db,
            storage,
            audit,
            owner_locks,
            policy: UploadPolicy::documents(max_file_size),
        }
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Validate, write the blob, then record it. No row exists unless the
    /// bytes were stored.
    pub async fn upload(
        &self,
        actor: &Identity,
        category: &str,
        file: IncomingFile,
        context: &RequestContext,
    ) -> Result<documents::Model, AppError> {
        authorization::require_role(actor, Role::Student)?;

        self.policy
            .validate(&FileCandidate {
                size_bytes: file.size(),
                mime_type: &file.mime_type,
                original_name: &file.original_name,
            })
            .map_err(|r| AppError::Validation(r.to_string()))?;

        let category = sanitize_category(category).map_err(|e| AppError::Validation(e.to_string()))?;

        let _lock = self.owner_locks.lock(&actor.external_id).await;

        let owner_exists = Accounts::find()
            .filter(accounts::Column::ExternalId.eq(actor.external_id.as_str()))
            .count(&self.db)
            .await?
            > 0;
        if !owner_exists {
            return Err(AppError::Unauthenticated("Account no longer exists".to_string()));
        }

        let stored_name = derive_stored_name(&file.original_name);
        let blob_path = derive_blob_path(&actor.external_id, &category, &stored_name);
        let byte_size = file.size() as i64;

        self.storage
            .upload_file(&blob_path, file.data.to_vec())
            .await
            .map_err(|e| {
                AppError::Storage(e.context(format!(
                    "upload for {} ({})",
                    actor.external_id, file.original_name
                )))
            })?;

        let document = match self
            .registry
            .insert(NewDocument {
                owner_external_id: actor.external_id.clone(),
                stored_name,
                original_name: file.original_name.clone(),
                blob_path: blob_path.clone(),
                category,
                byte_size,
                mime_type: file.mime_type.clone(),
            })
            .await
        {
            Ok(document) => document,
            Err(e) => {
                if let Err(cleanup) = self.storage.delete_file(&blob_path).await {
                    warn!("Orphan blob left after failed insert: {:#}", cleanup);
                }
                return Err(e);
            }
        };

        info!(
            "📤 {} uploaded document {} ({} bytes) to '{}'",
            actor.external_id, document.id, document.byte_size, document.category
        );

        self.audit.record(
            &actor.external_id,
            AuditAction::Upload,
            json!({
                "documentId": document.id,
                "filename": document.original_name,
                "category": document.category,
                "fileSize": document.byte_size,
            }),
            Some(context),
        );

        Ok(document)
    }

    pub async fn list_own(
        &self,
        actor: &Identity,
        query: DocumentQuery,
    ) -> Result<Page<documents::Model>, AppError> {
        authorization::require_role(actor, Role::Student)?;
        self.registry
            .query(&query.owned_by(actor.external_id.clone()))
            .await
    }

    /// Cross-owner listing. `query.owner_external_id` is an optional filter here.
    pub async fn list_all(
        &self,
        actor: &Identity,
        query: DocumentQuery,
    ) -> Result<Page<documents::Model>, AppError> {
        authorization::require_role(actor, Role::Admin)?;
        self.registry.query(&query).await
    }

    pub async fn categories(&self, actor: &Identity) -> Result<Vec<String>, AppError> {
        authorization::require_role(actor, Role::Student)?;
        self.registry.distinct_categories(&actor.external_id).await
    }

    pub async fn stats(&self, actor: &Identity) -> Result<DocumentStats, AppError> {
        authorization::require_role(actor, Role::Student)?;
        self.registry.aggregate_stats(&actor.external_id).await
    }

    async fn authorized(&self, actor: &Identity, id: i64) -> Result<documents::Model, AppError> {
        let document = self
            .registry
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;
        authorization::authorize_document(actor, &document)?;
        Ok(document)
    }

    pub async fn open(
        &self,
        actor: &Identity,
        id: i64,
        disposition: Disposition,
        context: &RequestContext,
    ) -> Result<OpenedDocument, AppError> {
        let document = self.authorized(actor, id).await?;

        let exists = self
            .storage
            .file_exists(&document.blob_path)
            .await
            .map_err(AppError::Storage)?;
        if !exists {
            warn!(
                "Blob missing for document {} owned by {}",
                document.id, document.owner_external_id
            );
            return Err(AppError::NotFound("File not found on disk".to_string()));
        }

        let reader = self
            .storage
            .open_stream(&document.blob_path)
            .await
            .map_err(|e| AppError::Storage(e.context(format!("open document {}", document.id))))?;

        let action = match disposition {
            Disposition::Inline => "view",
            Disposition::Attachment => "download",
        };
        self.audit.record(
            &actor.external_id,
            AuditAction::Download,
            json!({
                "documentId": document.id,
                "filename": document.original_name,
                "action": action,
            }),
            Some(context),
        );

        Ok(OpenedDocument { document, reader })
    }

    /// Row first, then the blob best-effort. Losing a race to another delete
    /// still counts as success.
    pub async fn delete(
        &self,
        actor: &Identity,
        id: i64,
        context: &RequestContext,
    ) -> Result<(), AppError> {
        let document = self.authorized(actor, id).await?;

        if !self.registry.delete_by_id(document.id).await? {
            info!("Document {} was already deleted", document.id);
            return Ok(());
        }

        if let Err(e) = self.storage.delete_file(&document.blob_path).await {
            warn!(
                "Failed to delete blob for document {} ({}): {:#}",
                document.id, document.owner_external_id, e
            );
        }

        info!("🗑️ {} deleted document {}", actor.external_id, document.id);

        let deleted_by = if actor.is_admin() { "admin" } else { "owner" };
        self.audit.record(
            &actor.external_id,
            AuditAction::Delete,
            json!({
                "documentId": document.id,
                "filename": document.original_name,
                "studentId": document.owner_external_id,
                "deletedBy": deleted_by,
            }),
            Some(context),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::setup_database;
    use crate::services::storage::LocalStorageService;
    use crate::utils::auth::hash_password;
    use async_trait::async_trait;
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, NotSet, Set};

    struct BrokenStorage;

    #[async_trait]
    impl StorageService for BrokenStorage {
        async fn upload_file(&self, _key: &str, _data: Vec<u8>) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn get_file(&self, _key: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("disk full")
        }
        async fn open_stream(&self, _key: &str) -> anyhow::Result<BlobReader> {
            anyhow::bail!("disk full")
        }
        async fn delete_file(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn file_exists(&self, _key: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    async fn seed_student(db: &DatabaseConnection, external_id: &str) -> Identity {
        let id = uuid::Uuid::new_v4().to_string();
        accounts::ActiveModel {
            id: Set(id.clone()),
            external_id: Set(external_id.to_string()),
            password_hash: Set(hash_password("secret1").unwrap()),
            role: Set(Role::Student),
            display_name: Set(external_id.to_string()),
            email: Set(None),
            display_name_folded: NotSet,
            email_folded: NotSet,
            profile_photo_key: Set(None),
            department: Set(None),
            year: Set(None),
            join_year: Set(None),
            date_of_birth: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .unwrap();
        Identity {
            account_id: id,
            external_id: external_id.to_string(),
            role: Role::Student,
        }
    }

    fn pdf(name: &str, len: usize) -> IncomingFile {
        IncomingFile {
            original_name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            data: bytes::Bytes::from(vec![b'%'; len]),
        }
    }

    #[tokio::test]
    async fn test_failed_blob_write_leaves_no_row() {
        let db = setup_database("sqlite::memory:").await.unwrap();
        let student = seed_student(&db, "S1").await;
        let service = DocumentService::new(
            db.clone(),
            Arc::new(BrokenStorage),
            AuditService::new(db.clone()),
            KeyedMutex::new(),
            5 * 1024 * 1024,
        );

        let err = service
            .upload(&student, "Transcripts", pdf("a.pdf", 10), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(service.registry().count_by_owner("S1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_name_twice_keeps_both_blobs() {
        let db = setup_database("sqlite::memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::new(dir.path()));
        let student = seed_student(&db, "S1").await;
        let service = DocumentService::new(
            db.clone(),
            storage.clone(),
            AuditService::new(db.clone()),
            KeyedMutex::new(),
            5 * 1024 * 1024,
        );
        let ctx = RequestContext::default();

        let a = service.upload(&student, "Transcripts", pdf("t.pdf", 3), &ctx).await.unwrap();
        let b = service.upload(&student, "Transcripts", pdf("t.pdf", 5), &ctx).await.unwrap();

        assert_ne!(a.stored_name, b.stored_name);
        assert_ne!(a.blob_path, b.blob_path);
        assert_eq!(storage.get_file(&a.blob_path).await.unwrap().len(), 3);
        assert_eq!(storage.get_file(&b.blob_path).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_upload_rejects_traversal_category_and_unknown_owner() {
        let db = setup_database("sqlite::memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let service = DocumentService::new(
            db.clone(),
            Arc::new(LocalStorageService::new(dir.path())),
            AuditService::new(db.clone()),
            KeyedMutex::new(),
            5 * 1024 * 1024,
        );
        let ctx = RequestContext::default();
        let student = seed_student(&db, "S1").await;

        let err = service
            .upload(&student, "../../etc", pdf("a.pdf", 3), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let ghost = Identity {
            account_id: "gone".to_string(),
            external_id: "S9".to_string(),
            role: Role::Student,
        };
        let err = service
            .upload(&ghost, "Transcripts", pdf("a.pdf", 3), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found_and_delete_tolerates_it() {
        let db = setup_database("sqlite::memory:").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorageService::new(dir.path()));
        let student = seed_student(&db, "S1").await;
        let service = DocumentService::new(
            db.clone(),
            storage.clone(),
            AuditService::new(db.clone()),
            KeyedMutex::new(),
            5 * 1024 * 1024,
        );
        let ctx = RequestContext::default();

        let doc = service.upload(&student, "T", pdf("a.pdf", 3), &ctx).await.unwrap();
        storage.delete_file(&doc.blob_path).await.unwrap();

        let err = service
            .open(&student, doc.id, Disposition::Inline, &ctx)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::NotFound(_)));

        service.delete(&student, doc.id, &ctx).await.unwrap();
        let err = service.delete(&student, doc.id, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
