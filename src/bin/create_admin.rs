use clap::Parser;
use dotenvy::dotenv;
use student_vault::config::{StorageConfig, database_url};
use student_vault::infrastructure::{database, storage};
use student_vault::services::account_service::AccountService;
use student_vault::services::audit::AuditService;
use student_vault::utils::keyed_mutex::KeyedMutex;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Provision an administrator account. Admins cannot self-register.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Login identifier for the admin
    #[arg(long)]
    id: String,

    /// Initial password (at least 6 characters)
    #[arg(long, env = "ADMIN_PASSWORD")]
    password: String,

    /// Display name
    #[arg(long, default_value = "Administrator")]
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "create_admin=info,student_vault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🔌 Connecting to database...");
    let db = database::setup_database(&database_url()).await?;
    let storage = storage::setup_storage(&StorageConfig::from_env()).await?;

    let accounts = AccountService::new(
        db.clone(),
        storage,
        AuditService::new(db),
        KeyedMutex::new(),
    );

    match accounts
        .provision_admin(&args.id, &args.password, &args.name)
        .await
    {
        Ok(account) => {
            info!("✅ Admin {} created", account.external_id);
            Ok(())
        }
        Err(e) => {
            error!("❌ Could not create admin {}: {}", args.id, e);
            Err(anyhow::anyhow!("{}", e))
        }
    }
}
