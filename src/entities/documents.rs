use crate::utils::search::fold;
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub owner_external_id: String,
    pub stored_name: String,
    pub original_name: String,
    /// Relative blob key. Never sent to clients.
    #[serde(skip_serializing)]
    pub blob_path: String,
    pub category: String,
    /// Case-folded copies for search, filled in on save.
    #[serde(skip_serializing)]
    pub original_name_folded: String,
    #[serde(skip_serializing)]
    pub category_folded: String,
    pub byte_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if let Some(name) = self.original_name.try_as_ref() {
            self.original_name_folded = Set(fold(name));
        }
        if let Some(category) = self.category.try_as_ref() {
            self.category_folded = Set(fold(category));
        }
        Ok(self)
    }
}
