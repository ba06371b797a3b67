use anyhow::Result;
use clap::Parser;

use crate::auth::store::{ACCESS_MAX_AGE_SECS, REFRESH_MAX_AGE_SECS};
use crate::auth::{CookiePolicy, RefreshMode};
use crate::middleware::GateConfig;

/// Dashboard Gateway - session gateway for the login-gated dashboard
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "3000")]
    pub port: u16,

    /// Base URL of the auth and API backend
    #[arg(short = 'a', long, env = "API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Cookie policy (interactive, server-side)
    #[arg(long, env = "COOKIE_POLICY", default_value = "interactive")]
    pub cookie_policy: String,

    /// Mark token cookies Secure (enable behind HTTPS)
    #[arg(long, env = "COOKIE_SECURE", default_value = "false")]
    pub cookie_secure: bool,

    /// Concurrent refresh handling (independent, single-flight)
    #[arg(long, env = "REFRESH_MODE", default_value = "independent")]
    pub refresh_mode: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Data fetch retries (Unauthorized is never retried)
    #[arg(long, env = "QUERY_MAX_RETRIES", default_value = "3")]
    pub query_retries: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Backend
    pub api_url: String,

    // Cookies
    pub cookie_same_site: CookieSameSite,
    pub cookie_secure: bool,
    pub access_cookie_max_age: u64,
    pub refresh_cookie_max_age: u64,

    // Session handling
    pub refresh_mode: RefreshMode,
    pub revoke_on_logout: bool,

    // Routes
    pub protected_prefix: String,
    pub login_path: String,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Data fetch retries
    pub query_max_retries: u32,
    pub query_retry_base_delay_ms: u64,

    pub log_level: String,
    pub log_json: bool,
}

/// Named cookie policy preset
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CookieSameSite {
    Interactive,
    ServerSide,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();

        Ok(Self::from_args(args))
    }

    /// Build config from parsed arguments plus env-only settings
    pub fn from_args(args: CliArgs) -> Self {
        Config {
            server_host: args.host,
            server_port: args.port,

            api_url: args.api_url.trim_end_matches('/').to_string(),

            cookie_same_site: parse_cookie_policy(&args.cookie_policy),
            cookie_secure: args.cookie_secure,
            access_cookie_max_age: env_or("ACCESS_COOKIE_MAX_AGE", ACCESS_MAX_AGE_SECS),
            refresh_cookie_max_age: env_or("REFRESH_COOKIE_MAX_AGE", REFRESH_MAX_AGE_SECS),

            refresh_mode: parse_refresh_mode(&args.refresh_mode),
            revoke_on_logout: env_or("REVOKE_ON_LOGOUT", true),

            protected_prefix: std::env::var("PROTECTED_PREFIX")
                .unwrap_or_else(|_| "/dashboard".to_string()),
            login_path: std::env::var("LOGIN_PATH").unwrap_or_else(|_| "/login".to_string()),

            http_connect_timeout: env_or("HTTP_CONNECT_TIMEOUT", 10),
            http_request_timeout: args.http_timeout,

            query_max_retries: args.query_retries,
            query_retry_base_delay_ms: env_or("QUERY_RETRY_BASE_DELAY_MS", 1000),

            log_level: args.log_level,
            log_json: args.log_json,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("API_URL must be an http(s) URL: {}", self.api_url);
        }

        for (name, path) in [
            ("PROTECTED_PREFIX", &self.protected_prefix),
            ("LOGIN_PATH", &self.login_path),
        ] {
            if !path.starts_with('/') || path.len() < 2 {
                anyhow::bail!("{} must be an absolute, non-root path: {}", name, path);
            }
        }

        if self.login_path.starts_with(&self.protected_prefix) {
            anyhow::bail!(
                "LOGIN_PATH ({}) must not live under PROTECTED_PREFIX ({})",
                self.login_path,
                self.protected_prefix
            );
        }

        if self.access_cookie_max_age == 0 || self.refresh_cookie_max_age == 0 {
            anyhow::bail!("Cookie lifetimes must be positive");
        }

        Ok(())
    }

    /// Cookie attributes for the token store
    pub fn cookie_policy(&self) -> CookiePolicy {
        let base = match self.cookie_same_site {
            CookieSameSite::Interactive => CookiePolicy::interactive(),
            CookieSameSite::ServerSide => CookiePolicy::server_side(),
        };

        CookiePolicy {
            access_max_age: self.access_cookie_max_age,
            refresh_max_age: self.refresh_cookie_max_age,
            ..base.with_secure(self.cookie_secure)
        }
    }

    /// Paths for the route gate
    pub fn gate(&self) -> GateConfig {
        GateConfig {
            protected_prefix: self.protected_prefix.clone(),
            login_path: self.login_path.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            api_url: "http://localhost:8080".to_string(),
            cookie_same_site: CookieSameSite::Interactive,
            cookie_secure: false,
            access_cookie_max_age: ACCESS_MAX_AGE_SECS,
            refresh_cookie_max_age: REFRESH_MAX_AGE_SECS,
            refresh_mode: RefreshMode::Independent,
            revoke_on_logout: true,
            protected_prefix: "/dashboard".to_string(),
            login_path: "/login".to_string(),
            http_connect_timeout: 10,
            http_request_timeout: 30,
            query_max_retries: 3,
            query_retry_base_delay_ms: 1000,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse cookie policy preset from string
fn parse_cookie_policy(s: &str) -> CookieSameSite {
    match s.to_lowercase().replace('_', "-").as_str() {
        "server-side" | "strict" => CookieSameSite::ServerSide,
        _ => CookieSameSite::Interactive,
    }
}

/// Parse refresh mode from string
fn parse_refresh_mode(s: &str) -> RefreshMode {
    match s.to_lowercase().replace('_', "-").as_str() {
        "single-flight" | "singleflight" => RefreshMode::SingleFlight,
        _ => RefreshMode::Independent,
    }
}
