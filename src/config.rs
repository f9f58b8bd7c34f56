use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;

use crate::engine::clock::{DEFAULT_REPORT_TIMEZONE, ReportZone};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    /// Day and month boundaries for every report
    pub report_zone: ReportZone,
    /// Lets `/auth/register` create new companies
    pub allow_company_signup: bool,
    /// Take the client IP from `X-Forwarded-For` when present
    pub trust_forwarded_for: bool,
    pub run_migrations: bool,
    pub log_level: tracing::Level,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

fn optional<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let timezone = env::var("REPORT_TIMEZONE")
            .unwrap_or_else(|_| DEFAULT_REPORT_TIMEZONE.to_string());
        let report_zone = ReportZone::parse(&timezone)
            .map_err(|e| anyhow!("REPORT_TIMEZONE is invalid: {}", e))?;

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: optional("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: optional("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: optional("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: optional("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: optional("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: optional("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            report_zone,
            allow_company_signup: optional("ALLOW_COMPANY_SIGNUP", false)?,
            trust_forwarded_for: optional("TRUST_FORWARDED_FOR", true)?,
            run_migrations: optional("RUN_MIGRATIONS", true)?,
            log_level: optional("LOG_LEVEL", tracing::Level::DEBUG)?,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            jwt_secret: "test-secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            report_zone: ReportZone::default(),
            allow_company_signup: false,
            trust_forwarded_for: true,
            run_migrations: false,
            log_level: tracing::Level::DEBUG,
        }
    }
}
