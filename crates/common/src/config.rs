use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (backup job queue)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// JWT secret used to validate bearer tokens issued by the auth layer
    pub jwt_secret: String,

    /// Display name used in notification copy (default: "Keeper")
    pub app_name: String,

    /// Public base URL of the web application, used for notification links
    pub app_url: String,

    /// Port the API server binds to (default: 3000)
    pub api_port: u16,

    /// Name of the disk backups are written to (default: "local")
    pub backup_disk: String,

    /// Filesystem root of the local backup disk
    pub backup_disk_root: String,

    /// Directory on the disk where the backup tool drops its archives
    pub backup_archive_dir: String,

    /// Program invoked to create a backup archive
    pub backup_tool_program: String,

    /// Leading arguments passed to the backup program before the component flags
    pub backup_tool_args: Vec<String>,

    /// Task-level ceiling for a single backup attempt, in seconds (default: 3600)
    pub backup_job_timeout_secs: u64,

    /// Maximum number of execution attempts for a backup job (default: 3)
    pub backup_max_attempts: u32,

    /// Interval between scheduled backups, in hours (default: 24)
    pub backup_schedule_interval_hours: u64,

    /// Web Push relay endpoint
    pub push_relay_url: Option<String>,

    /// VAPID public key handed to browsers when they subscribe
    pub vapid_public_key: Option<String>,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Timeout for outbound HTTP calls (push relay, email), in seconds (default: 30)
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Keeper".to_string()),
            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            backup_disk: std::env::var("BACKUP_DISK").unwrap_or_else(|_| "local".to_string()),
            backup_disk_root: std::env::var("BACKUP_DISK_ROOT")
                .unwrap_or_else(|_| "storage/app".to_string()),
            backup_archive_dir: std::env::var("BACKUP_ARCHIVE_DIR")
                .unwrap_or_else(|_| "keeper".to_string()),
            backup_tool_program: std::env::var("BACKUP_TOOL_PROGRAM")
                .unwrap_or_else(|_| "php".to_string()),
            backup_tool_args: std::env::var("BACKUP_TOOL_ARGS")
                .unwrap_or_else(|_| "artisan backup:run".to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            backup_job_timeout_secs: std::env::var("BACKUP_JOB_TIMEOUT_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BACKUP_JOB_TIMEOUT_SECS must be a valid u64"))?,
            backup_max_attempts: std::env::var("BACKUP_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BACKUP_MAX_ATTEMPTS must be a valid u32"))?,
            backup_schedule_interval_hours: std::env::var("BACKUP_SCHEDULE_INTERVAL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("BACKUP_SCHEDULE_INTERVAL_HOURS must be a valid u64")
                })?,
            push_relay_url: std::env::var("PUSH_RELAY_URL").ok(),
            vapid_public_key: std::env::var("VAPID_PUBLIC_KEY").ok(),
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a valid u64"))?,
        })
    }
}
