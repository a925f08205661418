use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::session::{AuthConfig, AuthMode};

#[derive(Debug, Clone, Parser)]
#[command(name = "dashboard", about = "Fleet asset-monitoring dashboard service")]
pub struct Config {
    /// Base URL of the tracking API.
    #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:8090/api")]
    pub api_base_url: String,

    #[arg(long, env = "AUTH_TOKEN_URL", default_value = "http://localhost:8090/oauth/token")]
    pub auth_token_url: String,

    #[arg(long, env = "SSO_EXCHANGE_URL", default_value = "http://localhost:8090/sso/exchange")]
    pub sso_exchange_url: String,

    #[arg(long, env = "AUTH_MODE", value_enum, default_value_t = AuthMode::Password)]
    pub auth_mode: AuthMode,

    #[arg(long, env = "CLIENT_ID", default_value = "fleet-dashboard")]
    pub client_id: String,

    #[arg(long, env = "PREFERENCES_PATH", default_value = "dashboard-preferences.json")]
    pub preferences_path: PathBuf,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval_secs: u64,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "HTTP_ADDR", default_value = "127.0.0.1:8080")]
    pub http_addr: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            mode: self.auth_mode,
            token_url: self.auth_token_url.clone(),
            sso_exchange_url: self.sso_exchange_url.clone(),
            client_id: self.client_id.clone(),
            timeout: self.request_timeout(),
        }
    }
}
