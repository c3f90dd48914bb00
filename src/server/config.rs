use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub listen_addr: String,
    /// Platform domain; tenants live at `<subdomain>.<base_domain>`.
    pub base_domain: String,
    pub public_url: String,
    pub log_dir: String,
    pub trial_days: i64,
    pub billing_webhook_secret: Option<String>,
    /// External reply provider. When unset, replies come from the knowledge base only.
    pub reply_endpoint: Option<String>,
    pub cors_origins: Vec<String>,
    pub bcrypt_cost: u32,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialServerConfig {
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub listen_addr: Option<String>,
    pub base_domain: Option<String>,
    pub public_url: Option<String>,
    pub log_dir: Option<String>,
    pub trial_days: Option<i64>,
    pub billing_webhook_secret: Option<String>,
    pub reply_endpoint: Option<String>,
    pub cors_origins: Option<Vec<String>>,
    pub bcrypt_cost: Option<u32>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_base_domain() -> String {
    "localhost".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

pub const DEFAULT_TRIAL_DAYS: i64 = 14;

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialServerConfig = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path_str.to_string(),
                    source,
                })?
            }
            _ => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()?;

        // 3. Merge: environment overrides file
        Self::merge(file_config, env_config)
    }

    pub fn merge(
        file_config: PartialServerConfig,
        env_config: PartialServerConfig,
    ) -> Result<Self, ConfigError> {
        let base_domain = env_config
            .base_domain
            .or(file_config.base_domain)
            .unwrap_or_else(default_base_domain)
            .trim_start_matches('.')
            .to_ascii_lowercase();

        let trial_days = env_config
            .trial_days
            .or(file_config.trial_days)
            .unwrap_or(DEFAULT_TRIAL_DAYS);
        if !(1..=365).contains(&trial_days) {
            return Err(ConfigError::Invalid {
                field: "trial_days",
                reason: format!("{trial_days} is outside 1..=365"),
            });
        }

        let jwt_secret = env_config
            .jwt_secret
            .or(file_config.jwt_secret)
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid {
                field: "jwt_secret",
                reason: "must be at least 16 characters".to_string(),
            });
        }

        let bcrypt_cost = env_config
            .bcrypt_cost
            .or(file_config.bcrypt_cost)
            .unwrap_or(bcrypt::DEFAULT_COST);
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                field: "bcrypt_cost",
                reason: format!("{bcrypt_cost} is outside 4..=31"),
            });
        }

        let public_url = env_config
            .public_url
            .or(file_config.public_url)
            .unwrap_or_else(|| format!("http://{base_domain}:8080"));

        Ok(ServerConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            jwt_secret,
            listen_addr: env_config
                .listen_addr
                .or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            base_domain,
            public_url: public_url.trim_end_matches('/').to_string(),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            trial_days,
            billing_webhook_secret: env_config
                .billing_webhook_secret
                .or(file_config.billing_webhook_secret)
                .filter(|s| !s.is_empty()),
            reply_endpoint: env_config
                .reply_endpoint
                .or(file_config.reply_endpoint)
                .filter(|s| !s.is_empty()),
            cors_origins: env_config
                .cors_origins
                .or(file_config.cors_origins)
                .unwrap_or_default(),
            bcrypt_cost,
        })
    }

    /// Config used by tests and local tooling.
    pub fn for_tests() -> Self {
        ServerConfig {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret-test-secret".to_string(),
            listen_addr: default_listen_addr(),
            base_domain: "chatdesk.test".to_string(),
            public_url: "https://chatdesk.test".to_string(),
            log_dir: default_log_dir(),
            trial_days: DEFAULT_TRIAL_DAYS,
            billing_webhook_secret: Some("whsec-test".to_string()),
            reply_endpoint: None,
            cors_origins: Vec::new(),
            // Minimum cost keeps hashing fast in tests.
            bcrypt_cost: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> PartialServerConfig {
        PartialServerConfig {
            database_url: Some("postgres://localhost/chatdesk".to_string()),
            jwt_secret: Some("0123456789abcdef0123".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn env_overrides_file() {
        let file = PartialServerConfig {
            base_domain: Some("file.example".to_string()),
            trial_days: Some(30),
            ..required()
        };
        let env = PartialServerConfig {
            base_domain: Some(".Env.Example".to_string()),
            ..Default::default()
        };

        let config = ServerConfig::merge(file, env).unwrap();
        assert_eq!(config.base_domain, "env.example");
        assert_eq!(config.trial_days, 30);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.public_url, "http://env.example:8080");
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let err = ServerConfig::merge(PartialServerConfig::default(), PartialServerConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));

        let no_db = PartialServerConfig {
            jwt_secret: Some("0123456789abcdef0123".to_string()),
            ..Default::default()
        };
        let err = ServerConfig::merge(no_db, PartialServerConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn rejects_out_of_range_trial_and_short_secret() {
        let file = PartialServerConfig {
            trial_days: Some(0),
            ..required()
        };
        assert!(matches!(
            ServerConfig::merge(file, PartialServerConfig::default()),
            Err(ConfigError::Invalid { field: "trial_days", .. })
        ));

        let file = PartialServerConfig {
            jwt_secret: Some("short".to_string()),
            ..required()
        };
        assert!(matches!(
            ServerConfig::merge(file, PartialServerConfig::default()),
            Err(ConfigError::Invalid { field: "jwt_secret", .. })
        ));
    }

    #[test]
    fn empty_optional_secrets_are_treated_as_unset() {
        let file = PartialServerConfig {
            billing_webhook_secret: Some(String::new()),
            reply_endpoint: Some(String::new()),
            ..required()
        };
        let config = ServerConfig::merge(file, PartialServerConfig::default()).unwrap();
        assert!(config.billing_webhook_secret.is_none());
        assert!(config.reply_endpoint.is_none());
    }

    #[test]
    fn reads_toml_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "database_url = \"sqlite::memory:\"\njwt_secret = \"0123456789abcdef0123\"\ntrial_days = 21\nbcrypt_cost = 6"
        )
        .unwrap();

        let config = ServerConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.trial_days, 21);
        assert_eq!(config.bcrypt_cost, 6);
    }

    #[test]
    fn unparsable_file_is_reported_with_its_path() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "trial_days = \"fourteen\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        match ServerConfig::load(Some(&path)) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
