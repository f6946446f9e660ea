use std::time::Duration;

use reqwest::Client;

use crate::config::Config;

/// Builds the one HTTP client shared by every upstream integration.
pub fn build_http_client(config: &Config) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.upstream_timeout_seconds))
        .build()
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}
