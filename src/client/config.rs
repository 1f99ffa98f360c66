use std::env;
use std::time::Duration;

use url::Url;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: Url,
    pub poll_interval: Duration,
    pub search_debounce: Duration,
    pub min_search_len: usize,
    pub request_timeout: Duration,
    pub log_level: String,
    pub current_user_id: Option<i64>,
    pub api_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_base_url(),
            poll_interval: Duration::from_millis(5000),
            search_debounce: Duration::from_millis(500),
            min_search_len: 2,
            request_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
            current_user_id: None,
            api_token: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let api_base_url = match env::var("API_BASE_URL") {
            Ok(raw) => match Url::parse(&raw) {
                Ok(url) => url,
                Err(e) => {
                    log::warn!("Ignoring invalid API_BASE_URL '{}': {}", raw, e);
                    defaults.api_base_url
                }
            },
            Err(_) => defaults.api_base_url,
        };

        Self {
            api_base_url,
            poll_interval: env::var("POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).map(Duration::from_millis).unwrap_or(defaults.poll_interval),
            search_debounce: env::var("SEARCH_DEBOUNCE_MS").ok().and_then(|v| v.parse().ok()).map(Duration::from_millis).unwrap_or(defaults.search_debounce),
            min_search_len: env::var("MIN_SEARCH_LEN").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.min_search_len),
            request_timeout: env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(defaults.request_timeout),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            current_user_id: env::var("CURRENT_USER_ID").ok().and_then(|v| v.parse().ok()),
            api_token: env::var("API_TOKEN").ok().filter(|t| !t.trim().is_empty()),
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("http://127.0.0.1:8000/api").expect("default API base URL is valid")
}
