use crate::config::{StorageBackend, StorageConfig};
use crate::services::storage::{LocalStorageService, S3StorageService, StorageService};
use anyhow::Context;
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageService>> {
    match config.backend {
        StorageBackend::Local => {
            tokio::fs::create_dir_all(&config.upload_dir)
                .await
                .with_context(|| format!("creating {}", config.upload_dir.display()))?;
            info!("💾 Local Storage: {}", config.upload_dir.display());
            Ok(Arc::new(LocalStorageService::new(config.upload_dir.clone())))
        }
        StorageBackend::S3 => Ok(Arc::new(setup_s3(config).await?)),
    }
}

async fn setup_s3(config: &StorageConfig) -> anyhow::Result<S3StorageService> {
    let endpoint_url = config
        .s3_endpoint
        .clone()
        .context("S3_ENDPOINT must be set")?;
    let access_key = config
        .s3_access_key
        .clone()
        .context("S3_ACCESS_KEY must be set")?;
    let secret_key = config
        .s3_secret_key
        .clone()
        .context("S3_SECRET_KEY must be set")?;
    let bucket = config.s3_bucket.clone().context("S3_BUCKET must be set")?;

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new("us-east-1"))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", bucket);
            }
        }
    }

    Ok(S3StorageService::new(s3_client, bucket))
}
