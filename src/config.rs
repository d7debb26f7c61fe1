use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ApiError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_WEB_URL: &str = "http://localhost:3000/";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_POLL_SECS: u64 = 30;

/// Runtime settings resolved from the environment, then overridden by CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    /// Base of shareable view links (`/category/{name}?min_score=..`).
    pub web_url: Url,
    pub data_dir: PathBuf,
    pub page_size: u32,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = parse_base_url(
            &lookup("NEWSDESK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        )?;
        let web_url = parse_base_url(
            &lookup("NEWSDESK_WEB_URL").unwrap_or_else(|| DEFAULT_WEB_URL.to_string()),
        )?;

        let data_dir = if let Some(dir) = lookup("NEWSDESK_DATA_DIR") {
            expand_path(&dir)
        } else if let Some(xdg_data) = lookup("XDG_DATA_HOME") {
            PathBuf::from(xdg_data).join("newsdesk")
        } else {
            // XDG default
            let home = lookup("HOME").unwrap_or_else(|| ".".to_string());
            PathBuf::from(home).join(".local/share/newsdesk")
        };

        let page_size = lookup("NEWSDESK_PAGE_SIZE")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let poll_secs = lookup("NEWSDESK_POLL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_POLL_SECS);

        Ok(Self {
            api_url,
            web_url,
            data_dir,
            page_size,
            poll_interval: Duration::from_secs(poll_secs),
        })
    }

    pub fn with_api_url(mut self, raw: &str) -> Result<Self, ApiError> {
        self.api_url = parse_base_url(raw)?;
        Ok(self)
    }

    pub fn with_data_dir(mut self, raw: &str) -> Self {
        self.data_dir = expand_path(raw);
        self
    }

    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn theme_file(&self) -> PathBuf {
        self.data_dir.join("theme")
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("newsdesk.log")
    }
}

/// Base URLs always end with `/` so relative joins keep their path prefix.
pub fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    let url = Url::parse(&normalized)
        .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(ApiError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_follow_xdg() {
        let config = Config::from_lookup(lookup_from(&[("HOME", "/home/ada")])).unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:8000/api/");
        assert_eq!(config.data_dir, PathBuf::from("/home/ada/.local/share/newsdesk"));
        assert_eq!(config.page_size, 20);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let config = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/ada"),
            ("XDG_DATA_HOME", "/xdg"),
            ("NEWSDESK_DATA_DIR", "/srv/newsdesk"),
            ("NEWSDESK_API_URL", "https://news.example.com/api"),
            ("NEWSDESK_PAGE_SIZE", "0"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/newsdesk"));
        assert_eq!(config.api_url.as_str(), "https://news.example.com/api/");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.session_file(), PathBuf::from("/srv/newsdesk/session.json"));
    }

    #[test]
    fn rejects_bad_api_url() {
        let result = Config::from_lookup(lookup_from(&[("NEWSDESK_API_URL", "not a url")]));
        assert!(result.is_err());
    }
}
