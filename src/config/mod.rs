use std::env;
use std::path::PathBuf;

pub const MIB: usize = 1024 * 1024;

/// Security and upload policy configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Maximum document size in bytes (default: 5 MiB)
    pub max_file_size: usize,

    /// Maximum profile photo size in bytes (default: 5 MiB)
    pub max_profile_photo_size: usize,

    /// Advisory per-student storage quota. Reported by the stats endpoint, never enforced.
    pub storage_limit_bytes: u64,

    /// Session signing key
    pub jwt_secret: String,

    /// Session lifetime in minutes (default: 60)
    pub session_ttl_minutes: i64,

    /// Mark the session cookie `Secure` (and `SameSite=Strict`)
    pub cookie_secure: bool,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    /// Take the client address from `x-forwarded-for` (only behind a reverse proxy)
    pub trust_proxy: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_file_size: 5 * MIB,
            max_profile_photo_size: 5 * MIB,
            storage_limit_bytes: 100 * MIB as u64,
            jwt_secret: "secret".to_string(),
            session_ttl_minutes: 60,
            cookie_secure: false,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://localhost:8080".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            trust_proxy: false,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn flag_env(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn origins_env() -> Option<Vec<String>> {
    env::var("ALLOWED_ORIGINS").ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl SecurityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: parse_env("MAX_FILE_SIZE").unwrap_or(default.max_file_size),
            max_profile_photo_size: parse_env("MAX_PROFILE_PHOTO_SIZE")
                .unwrap_or(default.max_profile_photo_size),
            storage_limit_bytes: parse_env("STORAGE_LIMIT_BYTES")
                .unwrap_or(default.storage_limit_bytes),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret), // dev fallback, production() requires it
            session_ttl_minutes: parse_env("SESSION_TTL_MINUTES")
                .filter(|m| *m > 0)
                .unwrap_or(default.session_ttl_minutes),
            cookie_secure: flag_env("COOKIE_SECURE").unwrap_or(default.cookie_secure),
            allowed_origins: origins_env().unwrap_or(default.allowed_origins),
            trust_proxy: flag_env("TRUST_PROXY").unwrap_or(default.trust_proxy),
        }
    }

    /// Relaxed settings for local development and tests
    pub fn development() -> Self {
        Self {
            jwt_secret: "development-secret".to_string(),
            ..Self::default()
        }
    }

    /// Strict settings: secure cookies and a mandatory `JWT_SECRET`
    pub fn production() -> anyhow::Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("CRITICAL: JWT_SECRET must be set"))?;
        let base = Self::from_env();
        Ok(Self {
            jwt_secret,
            cookie_secure: flag_env("COOKIE_SECURE").unwrap_or(true),
            ..base
        })
    }

    pub fn is_production() -> bool {
        env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false)
    }
}

/// Which blob store backs documents and profile photos
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the local backend (default: ./uploads)
    pub upload_dir: PathBuf,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_bucket: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            upload_dir: PathBuf::from("./uploads"),
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_bucket: None,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "s3" | "minio" => StorageBackend::S3,
            _ => StorageBackend::Local,
        };

        Self {
            backend,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_access_key: env::var("S3_ACCESS_KEY").ok(),
            s3_secret_key: env::var("S3_SECRET_KEY").ok(),
            s3_bucket: env::var("S3_BUCKET").ok(),
        }
    }
}

pub fn database_url() -> String {
    env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://student_vault.db?mode=rwc".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SecurityConfig::default();
        assert_eq!(config.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.storage_limit_bytes, 100 * 1024 * 1024);
        assert_eq!(config.session_ttl_minutes, 60);
        assert!(!config.cookie_secure);
        assert!(!config.trust_proxy);
    }

    #[test]
    fn test_development_config() {
        let config = SecurityConfig::development();
        assert_eq!(config.max_file_size, 5 * MIB);
        assert!(!config.allowed_origins.contains(&"*".to_string()));
    }

    #[test]
    fn test_production_config() {
        unsafe { env::set_var("JWT_SECRET", "test_secret") };
        let config = SecurityConfig::production();
        unsafe { env::remove_var("JWT_SECRET") };
        let config = config.unwrap();
        assert_eq!(config.jwt_secret, "test_secret");
        assert!(config.cookie_secure);
    }

    #[test]
    fn test_storage_defaults_to_local() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Local);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
    }
}
