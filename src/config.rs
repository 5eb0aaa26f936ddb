use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_ONESIGNAL_API_URL: &str = "https://onesignal.com/api/v1/notifications";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: Option<String>,
    /// JSON array of accounts loaded into the directory at startup.
    pub accounts_seed_path: Option<String>,
    pub jwt_secret: String,
    pub public_rps: u32,
    pub push: PushConfig,
}

/// Push gateway settings. Push is disabled unless both the app id and the
/// REST key are present.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub app_id: Option<String>,
    pub rest_api_key: Option<String>,
    pub api_url: String,
    pub site_url: String,
    pub timeout: Duration,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env_opt("DATABASE_URL"),
            accounts_seed_path: get_env_opt("ACCOUNTS_SEED_PATH"),
            jwt_secret: get_env("JWT_SECRET")?,
            public_rps: get_env_parse_or("PUBLIC_RPS", 50)?,
            push: PushConfig {
                app_id: get_env_opt("ONESIGNAL_APP_ID"),
                rest_api_key: get_env_opt("ONESIGNAL_REST_API_KEY"),
                api_url: get_env_opt("ONESIGNAL_API_URL")
                    .unwrap_or_else(|| DEFAULT_ONESIGNAL_API_URL.to_string()),
                site_url: get_env_opt("SITE_URL").unwrap_or_default(),
                timeout: Duration::from_secs(get_env_parse_or("PUSH_TIMEOUT_SECS", 10)?),
            },
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

/// Empty values count as unset.
fn get_env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_opt(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
