use crate::models::page::SortKey;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Runtime
    pub environment: String,
    pub log_level: String,

    // Backend
    pub api_base_url: String,
    pub request_timeout_secs: u64,

    // Feed
    pub feed_page_size: u32,
    pub feed_sort_by: String,
    pub feed_sort_ascending: bool,

    // Mutations
    pub mutation_debounce_ms: u64,

    // Local storage
    pub draft_dir: PathBuf,
    pub session_token_path: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "travel_sync=debug".to_string()),

            api_base_url: env::var("TRAVEL_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            feed_page_size: env::var("FEED_PAGE_SIZE")
                .unwrap_or_else(|_| "8".to_string())
                .parse()?,
            feed_sort_by: env::var("FEED_SORT_BY").unwrap_or_else(|_| "createdAt".to_string()),
            feed_sort_ascending: env::var("FEED_SORT_ASC")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            mutation_debounce_ms: env::var("MUTATION_DEBOUNCE_MS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,

            draft_dir: env::var("DRAFT_DIR")
                .unwrap_or_else(|_| ".travel-sync/drafts".to_string())
                .into(),
            session_token_path: env::var("SESSION_TOKEN_PATH")
                .unwrap_or_else(|_| ".travel-sync/session".to_string())
                .into(),
        })
    }

    /// 测试和嵌入场景使用的默认配置
    pub fn with_base_url(api_base_url: &str) -> Self {
        Config {
            environment: "test".to_string(),
            log_level: "travel_sync=debug".to_string(),
            api_base_url: api_base_url.to_string(),
            request_timeout_secs: 30,
            feed_page_size: 8,
            feed_sort_by: "createdAt".to_string(),
            feed_sort_ascending: false,
            mutation_debounce_ms: 0,
            draft_dir: PathBuf::from(".travel-sync/drafts"),
            session_token_path: PathBuf::from(".travel-sync/session"),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn feed_sort(&self) -> SortKey {
        SortKey::new(self.feed_sort_by.clone(), self.feed_sort_ascending)
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_defaults_to_crate_filter() {
        env::remove_var("LOG_LEVEL");
        let config = Config::from_env().unwrap();
        assert_eq!(config.log_level, "travel_sync=debug");
        assert_eq!(config.log_level, Config::with_base_url("http://localhost").log_level);
    }
}
