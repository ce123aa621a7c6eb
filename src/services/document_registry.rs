use crate::api::error::AppError;
use crate::entities::{documents, prelude::*};
use crate::models::{DocumentQuery, DocumentStats, Page, fetch_page};
use crate::utils::search::contains;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, NotSet,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    sea_query::Expr,
};

/// Uploads newer than this count as "recent" in stats.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// Metadata for a blob that has already been written.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_external_id: String,
    pub stored_name: String,
    pub original_name: String,
    pub blob_path: String,
    pub category: String,
    pub byte_size: i64,
    pub mime_type: String,
}

/// Metadata store for documents. Rows are inserted and deleted, never updated.
#[derive(Clone)]
pub struct DocumentRegistry {
    db: DatabaseConnection,
}

impl DocumentRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert(&self, doc: NewDocument) -> Result<documents::Model, AppError> {
        let model = documents::ActiveModel {
            id: NotSet,
            owner_external_id: Set(doc.owner_external_id),
            stored_name: Set(doc.stored_name),
            original_name: Set(doc.original_name),
            blob_path: Set(doc.blob_path),
            category: Set(doc.category),
            original_name_folded: NotSet,
            category_folded: NotSet,
            byte_size: Set(doc.byte_size),
            mime_type: Set(doc.mime_type),
            uploaded_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;
        Ok(model)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<documents::Model>, AppError> {
        Ok(Documents::find_by_id(id).one(&self.db).await?)
    }

    /// Filtered, newest-first page. `total_count` ignores the window.
    pub async fn query(&self, query: &DocumentQuery) -> Result<Page<documents::Model>, AppError> {
        let paginator = Self::filtered(query)
            .order_by_desc(documents::Column::UploadedAt)
            .order_by_desc(documents::Column::Id)
            .paginate(&self.db, query.page_size.max(1));

        Ok(fetch_page(paginator, query.page, query.page_size).await?)
    }

    fn filtered(query: &DocumentQuery) -> Select<Documents> {
        let mut cond = Condition::all();

        if let Some(owner) = &query.owner_external_id {
            cond = cond.add(documents::Column::OwnerExternalId.eq(owner.as_str()));
        }
        if let Some(category) = &query.category {
            cond = cond.add(documents::Column::Category.eq(category.as_str()));
        }
        if let Some(search) = &query.search {
            cond = cond.add(
                Condition::any()
                    .add(Expr::col(documents::Column::OriginalNameFolded).like(contains(search)))
                    .add(Expr::col(documents::Column::CategoryFolded).like(contains(search))),
            );
        }

        Documents::find().filter(cond)
    }

    /// `false` when the row was already gone.
    pub async fn delete_by_id(&self, id: i64) -> Result<bool, AppError> {
        let res = Documents::delete_by_id(id).exec(&self.db).await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn list_by_owner(
        &self,
        owner_external_id: &str,
    ) -> Result<Vec<documents::Model>, AppError> {
        Ok(Documents::find()
            .filter(documents::Column::OwnerExternalId.eq(owner_external_id))
            .order_by_asc(documents::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn count_by_owner(&self, owner_external_id: &str) -> Result<u64, AppError> {
        Ok(Documents::find()
            .filter(documents::Column::OwnerExternalId.eq(owner_external_id))
            .count(&self.db)
            .await?)
    }

    /// Takes any connection so a cascade can run it inside its transaction.
    pub async fn delete_by_owner<C: ConnectionTrait>(
        conn: &C,
        owner_external_id: &str,
    ) -> Result<u64, AppError> {
        let res = Documents::delete_many()
            .filter(documents::Column::OwnerExternalId.eq(owner_external_id))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    /// Sorted, owner-scoped.
    pub async fn distinct_categories(
        &self,
        owner_external_id: &str,
    ) -> Result<Vec<String>, AppError> {
        Ok(Documents::find()
            .select_only()
            .column(documents::Column::Category)
            .distinct()
            .filter(documents::Column::OwnerExternalId.eq(owner_external_id))
            .order_by_asc(documents::Column::Category)
            .into_tuple::<String>()
            .all(&self.db)
            .await?)
    }

    pub async fn aggregate_stats(&self, owner_external_id: &str) -> Result<DocumentStats, AppError> {
        self.aggregate_stats_at(owner_external_id, Utc::now()).await
    }

    pub async fn aggregate_stats_at(
        &self,
        owner_external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DocumentStats, AppError> {
        let rows: Vec<(i64, DateTime<Utc>)> = Documents::find()
            .select_only()
            .column(documents::Column::ByteSize)
            .column(documents::Column::UploadedAt)
            .filter(documents::Column::OwnerExternalId.eq(owner_external_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        let since = now - Duration::days(RECENT_WINDOW_DAYS);
        Ok(DocumentStats {
            count: rows.len() as u64,
            total_bytes: rows.iter().map(|(size, _)| size).sum(),
            recent_count: rows.iter().filter(|(_, at)| *at >= since).count() as u64,
        })
    }
}
