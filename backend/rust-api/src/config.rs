use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Base URL of the command executor / test runner service. Without it,
    /// attempts that need a run fail closed.
    pub url: Option<String>,
    /// Extra time allowed on top of an exercise's own timeout before the
    /// HTTP call is abandoned.
    pub grace_period_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Seed batch applied on startup when set.
    pub file: Option<PathBuf>,
    /// Abort the batch on the first invalid record instead of skipping it.
    pub strict: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub executor: ExecutorConfig,
    pub seed: SeedConfig,
    pub bind_addr: String,
    /// `username:password` guarding `/metrics`.
    pub metrics_auth: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "courseware".to_string(),
            redis_uri: None,
            executor: ExecutorConfig {
                url: None,
                grace_period_ms: 5_000,
            },
            seed: SeedConfig {
                file: None,
                strict: false,
            },
            bind_addr: "0.0.0.0:8081".to_string(),
            metrics_auth: "admin:changeme".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the local one.
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml, then APP__SECTION__KEY overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let string_setting = |key: &str, var: &str| -> Option<String> {
            settings
                .get_string(key)
                .or_else(|_| env::var(var))
                .ok()
                .filter(|value| !value.trim().is_empty())
        };

        let mongo_uri = string_setting("database.mongo_uri", "MONGO_URI").unwrap_or_else(|| {
            tracing::warn!("MONGO_URI not set, using {}", defaults.mongo_uri);
            defaults.mongo_uri.clone()
        });

        let mongo_database = string_setting("database.mongo_database", "MONGO_DATABASE")
            .unwrap_or(defaults.mongo_database);

        let redis_uri = string_setting("redis.uri", "REDIS_URI");

        let executor_url = string_setting("executor.url", "EXECUTOR_URL");
        let grace_period_ms = match string_setting("executor.grace_period_ms", "EXECUTOR_GRACE_PERIOD_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                config::ConfigError::Message(format!("executor.grace_period_ms: {}", e))
            })?,
            None => defaults.executor.grace_period_ms,
        };

        let seed_file = string_setting("seed.file", "SEED_FILE").map(PathBuf::from);
        let seed_strict = match string_setting("seed.strict", "SEED_STRICT") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                config::ConfigError::Message(format!("seed.strict: invalid boolean '{}'", raw))
            })?,
            None => defaults.seed.strict,
        };

        let bind_addr =
            string_setting("server.bind_addr", "BIND_ADDR").unwrap_or(defaults.bind_addr);

        let metrics_auth = match string_setting("metrics.auth", "METRICS_AUTH") {
            Some(value) => value,
            None if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "METRICS_AUTH must be set in production".to_string(),
                ))
            }
            None => {
                tracing::warn!("Using default METRICS_AUTH (dev mode only!)");
                defaults.metrics_auth
            }
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            executor: ExecutorConfig {
                url: executor_url,
                grace_period_ms,
            },
            seed: SeedConfig {
                file: seed_file,
                strict: seed_strict,
            },
            bind_addr,
            metrics_auth,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "APP_ENV",
        "SKIP_ROOT_ENV",
        "MONGO_URI",
        "MONGO_DATABASE",
        "REDIS_URI",
        "EXECUTOR_URL",
        "EXECUTOR_GRACE_PERIOD_MS",
        "SEED_FILE",
        "SEED_STRICT",
        "METRICS_AUTH",
        "APP__SEED__STRICT",
        "APP__EXECUTOR__GRACE_PERIOD_MS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
        env::set_var("APP_ENV", "test");
        env::set_var("SKIP_ROOT_ENV", "1");
    }

    #[test]
    #[serial]
    fn defaults_apply_without_settings() {
        clear_env();
        let config = Config::load().unwrap();
        assert_eq!(config.mongo_database, "courseware");
        assert!(config.redis_uri.is_none());
        assert!(config.executor.url.is_none());
        assert!(!config.seed.strict);
        assert_eq!(config.executor.grace_period_ms, 5_000);
    }

    #[test]
    #[serial]
    fn env_overrides_are_read() {
        clear_env();
        env::set_var("MONGO_URI", "mongodb://db:27017");
        env::set_var("EXECUTOR_URL", "http://executor:9000");
        env::set_var("APP__SEED__STRICT", "true");
        env::set_var("APP__EXECUTOR__GRACE_PERIOD_MS", "250");

        let config = Config::load().unwrap();
        assert_eq!(config.mongo_uri, "mongodb://db:27017");
        assert_eq!(config.executor.url.as_deref(), Some("http://executor:9000"));
        assert!(config.seed.strict);
        assert_eq!(config.executor.grace_period_ms, 250);
        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_strict_flag_is_rejected() {
        clear_env();
        env::set_var("SEED_STRICT", "sometimes");
        assert!(Config::load().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn production_requires_metrics_credentials() {
        clear_env();
        env::set_var("APP_ENV", "prod");
        assert!(Config::load().is_err());
        env::set_var("METRICS_AUTH", "ops:secret");
        assert_eq!(Config::load().unwrap().metrics_auth, "ops:secret");
        clear_env();
    }
}
