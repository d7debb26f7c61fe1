//! User-center operations: subscriptions, information sources and history.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use tracing::info;

use crate::api::{ApiClient, NewSource, NewsQuery};
use crate::error::{ApiError, Result};
use crate::models::{Category, HistoryEntry, NewsItem, Session, Source, User};

pub const SUBSCRIBED_NEWS_LIMIT: u32 = 20;

/// Categories and sources together with the user's subscriptions to them.
#[derive(Debug, Clone)]
pub struct AccountOverview {
    pub user_id: String,
    pub categories: Vec<Category>,
    pub subscribed_categories: BTreeSet<String>,
    pub sources: Vec<Source>,
    pub subscribed_sources: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Subscribed,
    Unsubscribed,
}

impl AccountOverview {
    pub async fn load(api: &ApiClient, user_id: &str) -> Result<Self> {
        let (categories, category_subs, sources, source_subs) = futures::try_join!(
            api.categories(),
            api.category_subscriptions(user_id),
            api.sources(),
            api.source_subscriptions(user_id),
        )?;

        Ok(Self {
            user_id: user_id.to_string(),
            categories,
            subscribed_categories: category_subs.into_iter().map(|s| s.category_id).collect(),
            sources,
            subscribed_sources: source_subs.into_iter().map(|s| s.source_id).collect(),
        })
    }

    pub fn is_subscribed_category(&self, category_id: &str) -> bool {
        self.subscribed_categories.contains(category_id)
    }

    pub fn is_subscribed_source(&self, source_id: &str) -> bool {
        self.subscribed_sources.contains(source_id)
    }

    pub async fn toggle_category(&mut self, api: &ApiClient, category_id: &str) -> Result<Toggle> {
        if self.is_subscribed_category(category_id) {
            api.unsubscribe_category(&self.user_id, category_id).await?;
            self.subscribed_categories.remove(category_id);
            info!(category_id, "unsubscribed from category");
            Ok(Toggle::Unsubscribed)
        } else {
            api.subscribe_category(&self.user_id, category_id).await?;
            self.subscribed_categories.insert(category_id.to_string());
            info!(category_id, "subscribed to category");
            Ok(Toggle::Subscribed)
        }
    }

    pub async fn toggle_source(&mut self, api: &ApiClient, source_id: &str) -> Result<Toggle> {
        if self.is_subscribed_source(source_id) {
            api.unsubscribe_source(&self.user_id, source_id).await?;
            self.subscribed_sources.remove(source_id);
            info!(source_id, "unsubscribed from source");
            Ok(Toggle::Unsubscribed)
        } else {
            api.subscribe_source(&self.user_id, source_id).await?;
            self.subscribed_sources.insert(source_id.to_string());
            info!(source_id, "subscribed to source");
            Ok(Toggle::Subscribed)
        }
    }

    /// News across every subscribed category. No subscriptions, no request.
    pub async fn subscribed_news(&self, api: &ApiClient) -> Result<Vec<NewsItem>> {
        if self.subscribed_categories.is_empty() {
            return Ok(Vec::new());
        }
        let category = self
            .subscribed_categories
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        api.list_news(&NewsQuery {
            category: Some(category),
            limit: Some(SUBSCRIBED_NEWS_LIMIT),
            ..NewsQuery::default()
        })
        .await
    }

    /// Adds a source, then reloads the source list.
    pub async fn add_source(
        &mut self,
        api: &ApiClient,
        name: &str,
        url: &str,
        description: Option<&str>,
    ) -> Result<Source> {
        let source = validate_source(name, url, description)?;
        let created = api.add_source(&source).await?;
        self.sources = api.sources().await?;
        Ok(created)
    }
}

pub fn validate_source(name: &str, url: &str, description: Option<&str>) -> Result<NewSource> {
    let name = name.trim();
    let url = url.trim();
    if name.is_empty() || url.is_empty() {
        return Err(ApiError::Validation("source name and URL are required".to_string()));
    }
    url::Url::parse(url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", url, e)))?;
    Ok(NewSource {
        name: name.to_string(),
        url: url.to_string(),
        description: description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
    })
}

pub fn validate_registration(username: &str, email: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(ApiError::Validation("username is required".to_string()));
    }
    if password.is_empty() {
        return Err(ApiError::Validation("password is required".to_string()));
    }
    let email_shape = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    if !email_shape.is_match(email.trim()) {
        return Err(ApiError::Validation(format!("invalid email address: {}", email)));
    }
    Ok(())
}

pub async fn register(api: &ApiClient, username: &str, email: &str, password: &str) -> Result<User> {
    validate_registration(username, email, password)?;
    api.register(username.trim(), email.trim(), password).await
}

/// History entries for the session's user.
pub async fn history(api: &ApiClient, session: &Session) -> Result<Vec<HistoryEntry>> {
    api.history(&session.user.id).await
}

/// Keyword and day-window filter over browse history. Both date bounds are
/// exclusive.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub keyword: Option<String>,
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        self.matches_keyword(entry) && self.matches_dates(entry.viewed_at)
    }

    pub fn apply<'a>(&self, entries: &'a [HistoryEntry]) -> Vec<&'a HistoryEntry> {
        entries.iter().filter(|e| self.matches(e)).collect()
    }

    fn matches_keyword(&self, entry: &HistoryEntry) -> bool {
        let Some(keyword) = self.keyword.as_deref().filter(|k| !k.is_empty()) else {
            return true;
        };
        entry.title.contains(keyword)
            || entry
                .summary
                .as_deref()
                .map_or(false, |s| s.contains(keyword))
    }

    fn matches_dates(&self, viewed_at: Option<DateTime<Utc>>) -> bool {
        if self.after.is_none() && self.before.is_none() {
            return true;
        }
        let Some(day) = viewed_at.map(|ts| ts.date_naive()) else {
            return false;
        };
        self.after.map_or(true, |after| day > after) && self.before.map_or(true, |before| day < before)
    }
}
