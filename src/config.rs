use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::http::{header, Method};
use anyhow::{Context, Result};

use crate::models::cloud_instance::DEFAULT_REGION;
use crate::services::launch_service::WaitPolicy;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_address: String,
    /// Region used when a request does not name one.
    pub default_region: String,
    pub wait: WaitPolicy,
    pub ami_table_path: Option<PathBuf>,
    /// Browser origins allowed to call the API. Empty means same-origin only.
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = WaitPolicy::default();

        let delay_secs = parse_or(&lookup, "GROBID_WAIT_DELAY_SECS", defaults.delay.as_secs())?;
        let max_attempts = parse_or(&lookup, "GROBID_WAIT_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            anyhow::bail!("GROBID_WAIT_MAX_ATTEMPTS must be at least 1");
        }

        Ok(AppConfig {
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            default_region: lookup("GROBID_DEFAULT_REGION")
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            wait: WaitPolicy {
                delay: Duration::from_secs(delay_secs),
                max_attempts,
            },
            ami_table_path: lookup("GROBID_AMI_TABLE_PATH").map(PathBuf::from),
            cors_origins: lookup("GROBID_CORS_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_default(),
        })
    }

    pub fn cors(&self) -> Cors {
        self.cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods([Method::GET, Method::POST, Method::DELETE])
            .allowed_header(header::CONTENT_TYPE)
            .max_age(3600)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
