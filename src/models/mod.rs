use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{Paginator, SelectorTrait};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Account role. Self-registration only ever produces `Student`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[sea_orm(string_value = "student")]
    Student,
    #[sea_orm(string_value = "admin")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    #[sea_orm(string_value = "login")]
    Login,
    #[sea_orm(string_value = "register")]
    Register,
    #[sea_orm(string_value = "upload")]
    Upload,
    #[sea_orm(string_value = "delete")]
    Delete,
    #[sea_orm(string_value = "download")]
    Download,
    #[sea_orm(string_value = "password_reset")]
    PasswordReset,
    #[sea_orm(string_value = "create_user")]
    CreateUser,
    #[sea_orm(string_value = "delete_student")]
    DeleteStudent,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::Register => "register",
            AuditAction::Upload => "upload",
            AuditAction::Delete => "delete",
            AuditAction::Download => "download",
            AuditAction::PasswordReset => "password_reset",
            AuditAction::CreateUser => "create_user",
            AuditAction::DeleteStudent => "delete_student",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved caller of an operation. Every service call receives it
/// explicitly; nothing reads it from ambient request state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: String,
    pub external_id: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Client details attached to audit entries.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A file received from a client, not yet validated.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub mime_type: String,
    pub data: bytes::Bytes,
}

impl IncomingFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Filter + window for document listings. `page` is 1-indexed.
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    pub owner_external_id: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: u64,
    pub page_size: u64,
}

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

/// 1-indexed page and a page size in `1..=MAX_PAGE_SIZE`.
fn page_window(page: Option<u64>, page_size: Option<u64>) -> (u64, u64) {
    (
        page.filter(|p| *p > 0).unwrap_or(1),
        page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE),
    )
}

impl DocumentQuery {
    pub fn new(page: Option<u64>, page_size: Option<u64>) -> Self {
        let (page, page_size) = page_window(page, page_size);
        Self {
            owner_external_id: None,
            category: None,
            search: None,
            page,
            page_size,
        }
    }

    pub fn owned_by(mut self, owner_external_id: impl Into<String>) -> Self {
        self.owner_external_id = Some(owner_external_id.into());
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        self
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
}

impl<T> Page<T> {
    pub fn pages(&self) -> u64 {
        self.total_count.div_ceil(self.page_size.max(1))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Fetches one 1-indexed page. Pages past the end come back empty without a
/// query, so the offset never exceeds the row count.
pub async fn fetch_page<'db, C, S>(
    paginator: Paginator<'db, C, S>,
    page: u64,
    page_size: u64,
) -> Result<Page<S::Item>, DbErr>
where
    C: ConnectionTrait,
    S: SelectorTrait + 'db,
{
    let total_count = paginator.num_items().await?;
    let last_page = total_count.div_ceil(page_size.max(1));
    let items = if page == 0 || page > last_page {
        Vec::new()
    } else {
        paginator.fetch_page(page - 1).await?
    };

    Ok(Page {
        items,
        total_count,
        page,
        page_size,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStats {
    pub count: u64,
    pub total_bytes: i64,
    pub recent_count: u64,
}

#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub actor_external_id: Option<String>,
    pub page: u64,
    pub page_size: u64,
}

impl AuditQuery {
    pub fn new(page: Option<u64>, page_size: Option<u64>) -> Self {
        let (page, page_size) = page_window(page, page_size);
        Self {
            action: None,
            actor_external_id: None,
            page,
            page_size,
        }
    }

    pub fn with_action(mut self, action: Option<AuditAction>) -> Self {
        self.action = action;
        self
    }

    pub fn by_actor(mut self, actor_external_id: Option<String>) -> Self {
        self.actor_external_id = actor_external_id
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        self
    }
}

/// How a document's bytes are handed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// Summary of a completed student cascade.
#[derive(Debug, Clone)]
pub struct StudentDeletion {
    pub external_id: String,
    pub display_name: String,
    pub document_count: usize,
    pub deleted_at: DateTime<Utc>,
}
