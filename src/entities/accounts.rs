use crate::models::Role;
use crate::utils::search::fold;
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Human-facing login handle, unique across roles.
    #[sea_orm(unique)]
    pub external_id: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub display_name: String,
    pub email: Option<String>,
    /// Case-folded copies for admin search, filled in on save.
    #[serde(skip_serializing)]
    pub display_name_folded: String,
    #[serde(skip_serializing)]
    pub email_folded: Option<String>,
    pub profile_photo_key: Option<String>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub join_year: Option<i32>,
    pub date_of_birth: Option<Date>,
    pub created_at: DateTimeUtc,
}

// Documents reference accounts by `external_id` only; there is no foreign key.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if let Some(name) = self.display_name.try_as_ref() {
            self.display_name_folded = Set(fold(name));
        }
        if let Some(email) = self.email.try_as_ref() {
            self.email_folded = Set(email.as_deref().map(fold));
        }
        Ok(self)
    }
}
