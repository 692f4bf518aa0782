/// Configuration management
use anyhow::Result;
use std::env;
use std::time::Duration;

/// Base URLs of the internal services, without trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstreams {
    pub auth: String,
    pub profile: String,
    pub post: String,
    pub message: String,
}

impl Upstreams {
    /// First path segment decides the upstream.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        let prefix = path.trim_start_matches('/').split('/').next()?;
        match prefix {
            "auth" => Some(&self.auth),
            "profile" => Some(&self.profile),
            "post" => Some(&self.post),
            "message" => Some(&self.message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub upstreams: Upstreams,
    /// Websocket upgrades are redirected here, e.g. `ws://localhost:8084`
    pub chat_ws_url: String,
    pub upstream_timeout: Duration,
    pub log_format: Option<String>,
}

fn url_var(name: &str, default: &str) -> String {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            upstreams: Upstreams {
                auth: url_var("AUTH_SERVICE_URL", "http://localhost:8081"),
                profile: url_var("PROFILE_SERVICE_URL", "http://localhost:8082"),
                post: url_var("POST_SERVICE_URL", "http://localhost:8083"),
                message: url_var("MESSAGE_SERVICE_URL", "http://localhost:8084"),
            },
            chat_ws_url: url_var("CHAT_WS_URL", "ws://localhost:8084"),
            upstream_timeout: Duration::from_secs(
                env::var("UPSTREAM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            log_format: env::var("LOG_FORMAT").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn upstreams() -> Upstreams {
        Upstreams {
            auth: "http://auth".into(),
            profile: "http://profile".into(),
            post: "http://post".into(),
            message: "http://message".into(),
        }
    }

    #[test]
    fn resolves_by_first_segment() {
        let u = upstreams();
        assert_eq!(u.resolve("/auth/login"), Some("http://auth"));
        assert_eq!(u.resolve("/post/media/s3/upload"), Some("http://post"));
        assert_eq!(u.resolve("/message"), Some("http://message"));
        assert_eq!(u.resolve("/posts/1"), None);
        assert_eq!(u.resolve("/"), None);
    }

    #[test]
    #[serial]
    fn trailing_slashes_are_trimmed() {
        env::set_var("PROFILE_SERVICE_URL", "http://profile:8082/");
        env::remove_var("SERVER_PORT");
        let config = Config::from_env().unwrap();
        assert_eq!(config.upstreams.profile, "http://profile:8082");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        env::remove_var("PROFILE_SERVICE_URL");
    }
}
