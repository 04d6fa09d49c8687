use std::time::Duration;

use resumeai_core::error::CoreError;

/// Default REST root.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api/recruiter";

/// Default hub endpoint.
pub const DEFAULT_JOB_HUB_URL: &str = "http://localhost:5000/jobProgressHub";

/// Default per-request timeout for the job control API.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except the
/// auth token, which the caller decides how to require.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// REST root the job endpoints hang off.
    pub api_base_url: String,
    /// Hub URL; `http(s)` is converted to `ws(s)` when connecting.
    pub job_hub_url: String,
    /// Bearer token, if one was configured.
    pub auth_token: Option<String>,
    /// Per-request timeout for REST calls.
    pub request_timeout: Duration,
    /// Retry failed and dropped connections automatically.
    pub auto_connect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            job_hub_url: DEFAULT_JOB_HUB_URL.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            auto_connect: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                                |
    /// |------------------------|----------------------------------------|
    /// | `API_BASE_URL`         | `http://localhost:5000/api/recruiter`  |
    /// | `JOB_HUB_URL`          | `http://localhost:5000/jobProgressHub` |
    /// | `AUTH_TOKEN`           | none                                   |
    /// | `REQUEST_TIMEOUT_SECS` | `15`                                   |
    /// | `AUTO_CONNECT`         | `true`                                 |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let request_timeout_secs: u64 = match var("REQUEST_TIMEOUT_SECS") {
            Some(v) => v.parse().map_err(|_| {
                CoreError::Validation(format!(
                    "REQUEST_TIMEOUT_SECS must be a valid u64, got '{v}'"
                ))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };
        if request_timeout_secs == 0 {
            return Err(CoreError::Validation(
                "REQUEST_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        let auto_connect = match var("AUTO_CONNECT") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                CoreError::Validation(format!("AUTO_CONNECT must be true or false, got '{v}'"))
            })?,
            None => defaults.auto_connect,
        };

        Ok(Self {
            api_base_url: var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            job_hub_url: var("JOB_HUB_URL").unwrap_or(defaults.job_hub_url),
            auth_token: var("AUTH_TOKEN"),
            request_timeout: Duration::from_secs(request_timeout_secs),
            auto_connect,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
