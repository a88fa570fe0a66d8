use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

/// Without a `url` the service runs on the in-memory store.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    #[serde(default = "default_admin_name")]
    pub user_name: String,
}

fn default_admin_name() -> String {
    "admin".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `BUSLINE__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("BUSLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_source_fills_defaults() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080

                [auth]
                jwt_secret = "secret"
                jwt_expiration_seconds = 3600
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: Config = s.try_deserialize().unwrap();
        assert_eq!(cfg.bind_address(), "0.0.0.0:8080");
        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.database.max_connections, 5);
        assert!(cfg.bootstrap_admin.is_none());
        assert_eq!(cfg.notifications.channel_capacity, 256);
    }
}
