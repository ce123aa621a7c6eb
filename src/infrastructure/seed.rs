use crate::entities::{accounts, prelude::*};
use crate::models::Role;
use crate::services::account_service::AccountService;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use std::env;
use tracing::{info, warn};

/// Creates the first admin from `ADMIN_ID` / `ADMIN_PASSWORD` when no admin
/// exists yet. Does nothing if either variable is unset.
pub async fn seed_initial_admin(
    db: &DatabaseConnection,
    accounts: &AccountService,
) -> anyhow::Result<()> {
    let (Ok(admin_id), Ok(password)) = (env::var("ADMIN_ID"), env::var("ADMIN_PASSWORD")) else {
        return Ok(());
    };

    let admins = Accounts::find()
        .filter(accounts::Column::Role.eq(Role::Admin))
        .count(db)
        .await?;
    if admins > 0 {
        info!("🌱 Admin account already present, skipping seed");
        return Ok(());
    }

    let name = env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string());
    match accounts.provision_admin(&admin_id, &password, &name).await {
        Ok(account) => info!("🌱 Seeded admin account {}", account.external_id),
        Err(e) => warn!("⚠️ Could not seed admin account {}: {}", admin_id, e),
    }

    Ok(())
}
