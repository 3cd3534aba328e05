use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub files_staging_dir: PathBuf,
    pub cors_allowed_origin: Option<String>,
    pub bootstrap_admin: Option<AdminCredentials>,
}

#[derive(Clone, Debug)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer =
            env::var("JWT_ISSUER").unwrap_or_else(|_| "construction-docs".to_string());
        let jwt_audience = env::var("JWT_AUDIENCE")
            .unwrap_or_else(|_| "construction-docs-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "1440".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let files_staging_dir = env::var("FILES_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/filetemp"));
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let bootstrap_admin = bootstrap_admin_from(
            env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        );

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            files_staging_dir,
            cors_allowed_origin,
            bootstrap_admin,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn bootstrap_admin_from(
    email: Option<String>,
    password: Option<String>,
) -> Option<AdminCredentials> {
    let email = email.map(|value| value.trim().to_string())?;
    let password = password?;
    if email.is_empty() || password.is_empty() {
        return None;
    }
    Some(AdminCredentials { email, password })
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
