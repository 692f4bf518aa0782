/// Configuration management
use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub kafka_group_id: String,
    pub log_format: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8082),
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            kafka_group_id: env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "profile-service".to_string()),
            log_format: env::var("LOG_FORMAT").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults() {
        env::set_var("DATABASE_URL", "postgres://localhost/agora_profile");
        env::remove_var("SERVER_PORT");
        env::remove_var("KAFKA_GROUP_ID");

        let config = Config::from_env().unwrap();
        assert_eq!(config.server_port, 8082);
        assert_eq!(config.kafka_group_id, "profile-service");
        env::remove_var("DATABASE_URL");
    }
}
