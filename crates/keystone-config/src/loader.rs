//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use keystone_core::CacheError;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Environment variable selecting the environment overlay.
pub const ENVIRONMENT_VAR: &str = "KEYSTONE_ENVIRONMENT";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "KEYSTONE";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
    environment: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `{dir}/default.toml` - Default values
    /// 2. `{dir}/{environment}.toml` - Environment-specific overrides
    /// 3. `{dir}/local.toml` - Local overrides
    /// 4. Environment variables named `KEYSTONE_<SECTION>__<KEY>`, e.g.
    ///    `KEYSTONE_BREAKER__OPEN_DURATION_SECS=10`
    ///
    /// The environment is read from `KEYSTONE_ENVIRONMENT` and defaults to
    /// `development`. It also seeds `app.environment` unless a file sets it.
    pub fn new(config_dir: impl Into<String>) -> Result<Self, CacheError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());
        Self::with_environment(config_dir, environment)
    }

    /// Creates a loader for an explicit environment overlay.
    pub fn with_environment(
        config_dir: impl Into<String>,
        environment: impl Into<String>,
    ) -> Result<Self, CacheError> {
        let config_dir = config_dir.into();
        let environment = environment.into();
        let config = Self::load_config(&config_dir, &environment)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
            environment,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, CacheError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Returns the environment overlay in use.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Reloads the configuration from disk.
    ///
    /// The previous configuration is kept if the new one fails to load.
    pub async fn reload(&self) -> Result<(), CacheError> {
        let new_config = Self::load_config(&self.config_dir, &self.environment)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    fn load_config(config_dir: &str, environment: &str) -> Result<AppConfig, CacheError> {
        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder()
            .set_default("app.environment", environment)
            .map_err(config_error_to_cache_error)?;

        // 1. Load default configuration
        let default_path = format!("{}/default.toml", config_dir);
        if Path::new(&default_path).exists() {
            debug!("Loading default config from: {}", default_path);
            builder = builder.add_source(File::with_name(&default_path).required(false));
        }

        // 2. Load environment-specific configuration
        let env_path = format!("{}/{}.toml", config_dir, environment);
        if Path::new(&env_path).exists() {
            debug!("Loading environment config from: {}", env_path);
            builder = builder.add_source(File::with_name(&env_path).required(false));
        }

        // 3. Load local overrides (not committed to version control)
        let local_path = format!("{}/local.toml", config_dir);
        if Path::new(&local_path).exists() {
            debug!("Loading local config from: {}", local_path);
            builder = builder.add_source(File::with_name(&local_path).required(false));
        }

        // 4. Override with environment variables. The prefix is followed by a
        // single underscore; `__` then separates section from key.
        builder = builder.add_source(env_source());

        let config = builder.build().map_err(config_error_to_cache_error)?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_cache_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    fn validate_config(config: &AppConfig) -> Result<(), CacheError> {
        if config.app.environment == "production" && !config.redis.enabled {
            warn!("Redis is disabled in production; using the in-process store");
        }

        ConfigValidator::validate(config).map_err(|errors| {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            CacheError::configuration(message)
        })
    }

    /// Gets a specific configuration value by key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn config_error_to_cache_error(err: ConfigError) -> CacheError {
    CacheError::configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    fn dir_str(dir: &TempDir) -> String {
        dir.path().to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_empty_dir_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_environment(dir_str(&dir), "test").unwrap();
        let config = loader.get().await;
        assert_eq!(config.breaker.failure_rate_threshold, 0.5);
        assert_eq!(config.rate_limiter.capacity, 100);
    }

    #[tokio::test]
    async fn test_layers_override_in_order() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "default.toml",
            "[breaker]\nminimum_calls = 4\nwindow_size = 8\n\n[retry]\nmax_attempts = 5\n",
        );
        write(&dir, "staging.toml", "[breaker]\nminimum_calls = 6\n");
        write(&dir, "local.toml", "[retry]\nmax_attempts = 2\n");

        let loader = ConfigLoader::with_environment(dir_str(&dir), "staging").unwrap();
        let config = loader.get().await;
        assert_eq!(config.breaker.minimum_calls, 6);
        assert_eq!(config.breaker.window_size, 8);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(loader.environment(), "staging");
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "default.toml", "[breaker]\nfailure_rate_threshold = 1.5\n");

        let err = ConfigLoader::with_environment(dir_str(&dir), "test")
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::Configuration(_)));
        assert!(err.to_string().contains("failure rate"));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        write(&dir, "default.toml", "[rate_limiter]\ncapacity = 10\n");
        let loader = ConfigLoader::with_environment(dir_str(&dir), "test").unwrap();
        assert_eq!(loader.get().await.rate_limiter.capacity, 10);

        write(&dir, "default.toml", "[rate_limiter]\ncapacity = 20\n");
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.rate_limiter.capacity, 20);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_config() {
        let dir = TempDir::new().unwrap();
        write(&dir, "default.toml", "[retry]\nmax_attempts = 4\n");
        let loader = ConfigLoader::with_environment(dir_str(&dir), "test").unwrap();

        write(&dir, "default.toml", "[retry]\nmax_attempts = 0\n");
        assert!(loader.reload().await.is_err());
        assert_eq!(loader.get().await.retry.max_attempts, 4);
    }

    #[tokio::test]
    async fn test_env_var_overrides_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "default.toml", "[breaker]\nopen_duration_secs = 30\n");

        std::env::set_var("KEYSTONE_BREAKER__OPEN_DURATION_SECS", "10");
        let loaded = ConfigLoader::with_environment(dir_str(&dir), "test");
        std::env::remove_var("KEYSTONE_BREAKER__OPEN_DURATION_SECS");

        let config = loaded.unwrap().get().await;
        assert_eq!(config.breaker.open_duration_secs, 10);
    }

    #[test]
    fn test_env_source_maps_section_and_key() {
        let source = env_source().source(Some(
            [
                ("KEYSTONE_REDIS__POOL_SIZE".to_string(), "4".to_string()),
                ("KEYSTONE_ENVIRONMENT".to_string(), "staging".to_string()),
                ("OTHER_REDIS__URL".to_string(), "redis://x".to_string()),
            ]
            .into_iter()
            .collect(),
        ));
        let config = Config::builder().add_source(source).build().unwrap();
        assert_eq!(config.get::<u32>("redis.pool_size").unwrap(), 4);
        assert!(config.get::<String>("redis.url").is_err());
    }

    #[tokio::test]
    async fn test_environment_seeds_app_metadata() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_environment(dir_str(&dir), "staging").unwrap();
        assert_eq!(loader.get().await.app.environment, "staging");

        write(&dir, "staging.toml", "[app]\nenvironment = \"qa\"\n");
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.app.environment, "qa");
    }

    #[tokio::test]
    async fn test_get_value_by_path() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_environment(dir_str(&dir), "test").unwrap();
        let name: Option<String> = loader.get_value("breaker.name").await;
        assert_eq!(name.as_deref(), Some("redis-service"));
        assert!(loader.get_value::<u32>("breaker.missing").await.is_none());
    }
}
