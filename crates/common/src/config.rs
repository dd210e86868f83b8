use serde::Deserialize;

/// Which messaging provider backs the delivery gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Twilio,
    Meta,
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Redis stream carrying delivery jobs
    pub delivery_stream: String,

    /// Redis stream carrying provider status events
    pub status_stream: String,

    /// Consumer group name shared by both streams
    pub consumer_group: String,

    /// Dead-letter stream for jobs that exhausted their retries
    pub dead_letter_stream: String,

    /// Maximum delivery attempts per job before dead-lettering
    pub max_delivery_attempts: u32,

    /// Base backoff between delivery attempts, in milliseconds
    pub retry_backoff_ms: u64,

    /// Selected messaging provider
    pub provider: ProviderKind,

    /// Twilio credentials
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,

    /// Meta WhatsApp Cloud API credentials
    pub meta_phone_number_id: Option<String>,
    pub meta_access_token: Option<String>,
    pub meta_app_secret: Option<String>,

    /// Token expected in the Meta webhook verification handshake
    pub webhook_verify_token: Option<String>,

    /// HTTP listen port
    pub http_port: u16,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let provider = match std::env::var("PROVIDER")
            .unwrap_or_else(|_| "twilio".to_string())
            .to_lowercase()
            .as_str()
        {
            "twilio" => ProviderKind::Twilio,
            "meta" => ProviderKind::Meta,
            other => anyhow::bail!("PROVIDER must be 'twilio' or 'meta', got '{other}'"),
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            delivery_stream: std::env::var("DELIVERY_STREAM")
                .unwrap_or_else(|_| "courier:delivery".to_string()),
            status_stream: std::env::var("STATUS_STREAM")
                .unwrap_or_else(|_| "courier:status".to_string()),
            consumer_group: std::env::var("CONSUMER_GROUP")
                .unwrap_or_else(|_| "courier".to_string()),
            dead_letter_stream: std::env::var("DEAD_LETTER_STREAM")
                .unwrap_or_else(|_| "courier:dead-letter".to_string()),
            max_delivery_attempts: std::env::var("MAX_DELIVERY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_DELIVERY_ATTEMPTS must be a valid u32"))?,
            retry_backoff_ms: std::env::var("RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_BACKOFF_MS must be a valid u64"))?,
            provider,
            twilio_account_sid: std::env::var("TWILIO_ACCOUNT_SID").ok(),
            twilio_auth_token: std::env::var("TWILIO_AUTH_TOKEN").ok(),
            twilio_from_number: std::env::var("TWILIO_FROM_NUMBER").ok(),
            meta_phone_number_id: std::env::var("META_PHONE_NUMBER_ID").ok(),
            meta_access_token: std::env::var("META_ACCESS_TOKEN").ok(),
            meta_app_secret: std::env::var("META_APP_SECRET").ok(),
            webhook_verify_token: std::env::var("WEBHOOK_VERIFY_TOKEN").ok(),
            http_port: std::env::var("HTTP_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_PORT must be a valid u16"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}
