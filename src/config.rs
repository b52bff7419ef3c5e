use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// | Env Var             | Default                                |
/// |---------------------|----------------------------------------|
/// | `DATABASE_URL`      | `sqlite://./data/drafts.db`            |
/// | `HOST`              | `0.0.0.0`                              |
/// | `PORT`              | `3000`                                 |
/// | `JWT_SECRET`        | `change-me`                            |
/// | `HERO_SOURCE_URL`   | `https://api.opendota.com/api/heroes`  |
/// | `MATCH_WEBHOOK_URL` | unset                                  |
/// | `CORS_ORIGINS`      | `*`                                    |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub hero_source_url: String,
    pub match_webhook_url: Option<String>,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port_raw = env::var("PORT").unwrap_or_else(|_| "3000".into());
        let port = port_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "PORT",
            expected: "port number",
            value: port_raw.clone(),
        })?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "*")
            .collect();

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/drafts.db".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "change-me".into()),
            hero_source_url: env::var("HERO_SOURCE_URL")
                .unwrap_or_else(|_| "https://api.opendota.com/api/heroes".into()),
            match_webhook_url: env::var("MATCH_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            cors_origins,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
