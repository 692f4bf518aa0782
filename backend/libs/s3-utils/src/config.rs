/// S3 configuration shared across services
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible storage such as MinIO
    pub endpoint: Option<String>,
    /// Whether to use path-style URLs (false = virtual-hosted-style)
    pub path_style: bool,
    /// Lifetime of presigned URLs in seconds
    pub presign_ttl_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "agora-media".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            path_style: false,
            presign_ttl_secs: 900,
        }
    }
}

impl S3Config {
    /// Load S3 configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let endpoint = std::env::var("AWS_S3_ENDPOINT").ok().filter(|v| !v.is_empty());

        Self {
            bucket: std::env::var("AWS_S3_BUCKET").unwrap_or(defaults.bucket),
            region: std::env::var("AWS_REGION").unwrap_or(defaults.region),
            // custom endpoints are nearly always path-style
            path_style: std::env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(endpoint.is_some()),
            endpoint,
            presign_ttl_secs: std::env::var("S3_PRESIGN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.presign_ttl_secs),
        }
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}
