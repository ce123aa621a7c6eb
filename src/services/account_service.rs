use crate::api::error::AppError;
use crate::entities::{accounts, prelude::*};
use crate::models::{AuditAction, Identity, RequestContext, Role, StudentDeletion};
use crate::services::audit::AuditService;
use crate::services::authorization;
use crate::services::document_registry::DocumentRegistry;
use crate::services::storage::StorageService;
use crate::utils::auth::{MIN_PASSWORD_LENGTH, hash_password, verify_password};
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::sanitize::validate_external_id;
use crate::utils::search::contains;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    NotSet, QueryFilter, QueryOrder, Set, TransactionTrait,
    sea_query::{Expr, Func},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Fields for a new student account, from self-registration or an admin.
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub external_id: String,
    pub password: String,
    pub display_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub join_year: Option<i32>,
    pub date_of_birth: Option<NaiveDate>,
}

/// What an admin sees before confirming a cascade.
#[derive(Debug, Clone)]
pub struct DeletionPreview {
    pub account: accounts::Model,
    pub document_count: u64,
}

#[derive(Clone)]
pub struct AccountService {
    db: DatabaseConnection,
    registry: DocumentRegistry,
    storage: Arc<dyn StorageService>,
    audit: AuditService,
    owner_locks: KeyedMutex,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

impl AccountService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        audit: AuditService,
        owner_locks: KeyedMutex,
    ) -> Self {
        Self {
            registry: DocumentRegistry::new(db.clone()),
            db,
            storage,
            audit,
            owner_locks,
        }
    }

    pub async fn find_by_id(&self, account_id: &str) -> Result<Option<accounts::Model>, AppError> {
        Ok(Accounts::find_by_id(account_id).one(&self.db).await?)
    }

    pub async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<accounts::Model>, AppError> {
        Ok(Accounts::find()
            .filter(accounts::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?)
    }

    /// Inserts an account with a fresh hash. The role is chosen by the caller,
    /// never by the request.
    async fn insert_account(&self, input: NewStudent, role: Role) -> Result<accounts::Model, AppError> {
        let external_id =
            validate_external_id(&input.external_id).map_err(|e| AppError::Validation(e.to_string()))?;
        check_password(&input.password)?;
        let display_name = input.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }

        if self.find_by_external_id(&external_id).await?.is_some() {
            return Err(AppError::Conflict("Student ID already exists".to_string()));
        }

        let password_hash = hash_password(&input.password)?;

        let account = accounts::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            external_id: Set(external_id),
            password_hash: Set(password_hash),
            role: Set(role),
            display_name: Set(display_name),
            email: Set(non_blank(input.email)),
            display_name_folded: NotSet,
            email_folded: NotSet,
            profile_photo_key: Set(None),
            department: Set(non_blank(input.department)),
            year: Set(non_blank(input.year)),
            join_year: Set(input.join_year),
            date_of_birth: Set(input.date_of_birth),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await
        .map_err(|e| match e.sql_err() {
            // Lost a race with a concurrent registration of the same id.
            Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => {
                AppError::Conflict("Student ID already exists".to_string())
            }
            _ => AppError::Database(e),
        })?;

        Ok(account)
    }

    /// Public self-registration. Always produces a student.
    pub async fn register_student(
        &self,
        input: NewStudent,
        context: &RequestContext,
    ) -> Result<accounts::Model, AppError> {
        let account = self.insert_account(input, Role::Student).await?;
        info!("👤 Registered student {}", account.external_id);
        self.audit.record(
            &account.external_id,
            AuditAction::Register,
            json!({ "role": Role::Student }),
            Some(context),
        );
        Ok(account)
    }

    pub async fn create_student(
        &self,
        actor: &Identity,
        input: NewStudent,
        context: &RequestContext,
    ) -> Result<accounts::Model, AppError> {
        authorization::require_role(actor, Role::Admin)?;
        let account = self.insert_account(input, Role::Student).await?;
        info!("👤 {} created student {}", actor.external_id, account.external_id);
        self.audit.record(
            &actor.external_id,
            AuditAction::CreateUser,
            json!({
                "targetStudentId": account.external_id,
                "name": account.display_name,
            }),
            Some(context),
        );
        Ok(account)
    }

    /// Operator-only path to an admin account (CLI and first-boot seed).
    /// Nothing reachable over HTTP calls this.
    pub async fn provision_admin(
        &self,
        external_id: &str,
        password: &str,
        display_name: &str,
    ) -> Result<accounts::Model, AppError> {
        let account = self
            .insert_account(
                NewStudent {
                    external_id: external_id.to_string(),
                    password: password.to_string(),
                    display_name: display_name.to_string(),
                    ..Default::default()
                },
                Role::Admin,
            )
            .await?;
        info!("🔑 Provisioned admin {}", account.external_id);
        Ok(account)
    }

    /// Credential check restricted to one role.
    pub async fn authenticate(
        &self,
        external_id: &str,
        password: &str,
        scope: Role,
        context: &RequestContext,
    ) -> Result<accounts::Model, AppError> {
        let rejected = || match scope {
            Role::Admin => AppError::Unauthenticated("Invalid admin credentials".to_string()),
            Role::Student => AppError::Unauthenticated("Invalid credentials".to_string()),
        };

        let account = Accounts::find()
            .filter(accounts::Column::ExternalId.eq(external_id.trim()))
            .filter(accounts::Column::Role.eq(scope))
            .one(&self.db)
            .await?
            .ok_or_else(rejected)?;

        if !verify_password(password, &account.password_hash)? {
            warn!("Failed {} login for {}", scope, account.external_id);
            return Err(rejected());
        }

        self.audit.record(
            &account.external_id,
            AuditAction::Login,
            json!({ "role": account.role }),
            Some(context),
        );

        Ok(account)
    }

    pub async fn reset_password(
        &self,
        actor: &Identity,
        external_id: &str,
        new_password: &str,
        context: &RequestContext,
    ) -> Result<(), AppError> {
        authorization::require_role(actor, Role::Admin)?;
        check_password(new_password)?;

        let account = Accounts::find()
            .filter(accounts::Column::ExternalId.eq(external_id.trim()))
            .filter(accounts::Column::Role.eq(Role::Student))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;

        let target = account.external_id.clone();
        let mut active = account.into_active_model();
        active.password_hash = Set(hash_password(new_password)?);
        active.update(&self.db).await?;

        info!("🔑 {} reset password for {}", actor.external_id, target);
        self.audit.record(
            &actor.external_id,
            AuditAction::PasswordReset,
            json!({ "targetStudentId": target }),
            Some(context),
        );
        Ok(())
    }

    /// Students only, newest first. `search` is a case-insensitive substring
    /// over id, name and email.
    pub async fn list_students(
        &self,
        actor: &Identity,
        search: Option<&str>,
    ) -> Result<Vec<accounts::Model>, AppError> {
        authorization::require_role(actor, Role::Admin)?;

        let mut select = Accounts::find().filter(accounts::Column::Role.eq(Role::Student));

        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(accounts::Column::ExternalId)))
                            .like(contains(term)),
                    )
                    .add(Expr::col(accounts::Column::DisplayNameFolded).like(contains(term)))
                    .add(Expr::col(accounts::Column::EmailFolded).like(contains(term))),
            );
        }

        Ok(select
            .order_by_desc(accounts::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    async fn find_student(&self, account_id: &str) -> Result<accounts::Model, AppError> {
        self.find_by_id(account_id)
            .await?
            .filter(|a| a.role == Role::Student)
            .ok_or_else(|| AppError::NotFound("Student not found".to_string()))
    }

    pub async fn delete_verification(
        &self,
        actor: &Identity,
        account_id: &str,
    ) -> Result<DeletionPreview, AppError> {
        authorization::require_role(actor, Role::Admin)?;
        let account = self.find_student(account_id).await?;
        let document_count = self.registry.count_by_owner(&account.external_id).await?;
        Ok(DeletionPreview {
            account,
            document_count,
        })
    }

    /// Removes a student with every document and blob they own.
    ///
    /// Holds the owner lock so no upload lands mid-cascade. Rows go in one
    /// transaction with the account row last; blobs are removed afterwards and
    /// failures there only leave orphans, which are logged.
    pub async fn delete_student(
        &self,
        actor: &Identity,
        account_id: &str,
        context: &RequestContext,
    ) -> Result<StudentDeletion, AppError> {
        authorization::require_role(actor, Role::Admin)?;

        let account = self
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
        if account.role != Role::Student {
            return Err(AppError::Forbidden(
                "Only student accounts can be deleted".to_string(),
            ));
        }

        let _lock = self.owner_locks.lock(&account.external_id).await;
        info!(
            "🔒 Owner lock acquired for cascade delete of {}",
            account.external_id
        );

        // A concurrent cascade may have finished while we waited.
        let account = self.find_student(account_id).await?;
        let owned = self.registry.list_by_owner(&account.external_id).await?;

        let txn = self.db.begin().await?;
        DocumentRegistry::delete_by_owner(&txn, &account.external_id).await?;
        Accounts::delete_by_id(account.id.as_str()).exec(&txn).await?;
        txn.commit().await?;

        for doc in &owned {
            if let Err(e) = self.storage.delete_file(&doc.blob_path).await {
                warn!(
                    "Failed to delete blob of document {} for {}: {:#}",
                    doc.id, account.external_id, e
                );
            }
        }
        if let Some(photo) = &account.profile_photo_key {
            if let Err(e) = self.storage.delete_file(photo).await {
                warn!(
                    "Failed to delete profile photo for {}: {:#}",
                    account.external_id, e
                );
            }
        }

        info!(
            "🗑️ {} deleted student {} with {} documents",
            actor.external_id,
            account.external_id,
            owned.len()
        );

        self.audit.record(
            &actor.external_id,
            AuditAction::DeleteStudent,
            json!({
                "deletedStudentId": account.external_id,
                "deletedStudentName": account.display_name,
                "documentCount": owned.len(),
            }),
            Some(context),
        );

        Ok(StudentDeletion {
            external_id: account.external_id,
            display_name: account.display_name,
            document_count: owned.len(),
            deleted_at: Utc::now(),
        })
    }
}
