use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ApiError, Result};
use crate::models::{
    Category, CategorySubscription, CrawlNowResponse, CrawlerStatusResponse, HistoryEntry,
    LoginResponse, MessageResponse, NewsDetail, NewsItem, SchedulerStatus, Session, Source,
    SourceSubscription, User,
};
use crate::session::SessionStore;

/// Tells tunnelling proxies to skip their interstitial warning page.
pub const SKIP_WARNING_HEADER: &str = "ngrok-skip-browser-warning";

/// Parameters of `GET /news`. Unset or zero values are left out of the URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsQuery {
    pub category: Option<String>,
    pub min_score: f64,
    pub days: Option<u32>,
    pub skip: u32,
    pub limit: Option<u32>,
}

impl NewsQuery {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            pairs.push(("category", category.to_string()));
        }
        if self.min_score > 0.0 {
            pairs.push(("min_score", self.min_score.to_string()));
        }
        if let Some(days) = self.days.filter(|d| *d > 0) {
            pairs.push(("days", days.to_string()));
        }
        if self.skip > 0 {
            pairs.push(("skip", self.skip.to_string()));
        }
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Stateless mapping of the backend REST contract.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(base: Url, session: Arc<SessionStore>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(SKIP_WARNING_HEADER, HeaderValue::from_static("true"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent("newsdesk/0.1")
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self { http, base, session })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = %method, url = %url, "api call");
        let builder = self.http.request(method, url);
        match self.session.auth_token() {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        Self::send(self.request(Method::GET, url).query(query)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let builder = self.request(Method::POST, url);
        let builder = match body {
            Some(body) => builder.json(body),
            None => builder,
        };
        Self::send(builder).await
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "api response");

        let bytes = response.bytes().await?;
        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .and_then(|body| body.detail)
                .map(|detail| match detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                });
            return Err(ApiError::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                detail,
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn list_news(&self, query: &NewsQuery) -> Result<Vec<NewsItem>> {
        self.get(&["news"], &query.to_pairs()).await
    }

    pub async fn news_detail(&self, id: &str) -> Result<NewsDetail> {
        self.get(&["news", id], &[]).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.get(&["categories"], &[]).await
    }

    pub async fn category(&self, id: &str) -> Result<Category> {
        self.get(&["categories", id], &[]).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        debug!(username, "logging in");
        let response: LoginResponse = self
            .post(
                &["login"],
                Some(&json!({ "username": username, "password": password })),
            )
            .await?;
        let session = Session::from(response);
        self.session.set_user(&session)?;
        Ok(session)
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        self.post(
            &["register"],
            Some(&json!({ "username": username, "email": email, "password": password })),
        )
        .await
    }

    pub async fn current_user(&self) -> Result<User> {
        self.get(&["me"], &[]).await
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>> {
        self.get(&["history"], &[("user_id", user_id.to_string())])
            .await
    }

    pub async fn add_history(&self, user_id: &str, news_id: &str) -> Result<MessageResponse> {
        self.post(
            &["history", "add"],
            Some(&json!({ "user_id": user_id, "news_id": news_id })),
        )
        .await
    }

    /// Records a browse-history entry for the logged-in user in the background.
    /// Failures are logged and otherwise ignored.
    pub fn record_view(&self, news_id: &str) -> Option<JoinHandle<()>> {
        let session = self.session.get_user()?;
        let client = self.clone();
        let news_id = news_id.to_string();
        Some(tokio::spawn(async move {
            if let Err(e) = client.add_history(&session.user.id, &news_id).await {
                warn!(error = %e, news_id = %news_id, "failed to record browse history");
            }
        }))
    }

    pub async fn subscribe_category(
        &self,
        user_id: &str,
        category_id: &str,
    ) -> Result<CategorySubscription> {
        self.post(
            &["subscribe"],
            Some(&json!({ "user_id": user_id, "category_id": category_id })),
        )
        .await
    }

    pub async fn unsubscribe_category(
        &self,
        user_id: &str,
        category_id: &str,
    ) -> Result<MessageResponse> {
        self.post(
            &["unsubscribe"],
            Some(&json!({ "user_id": user_id, "category_id": category_id })),
        )
        .await
    }

    pub async fn category_subscriptions(&self, user_id: &str) -> Result<Vec<CategorySubscription>> {
        self.get(&["subscriptions", user_id], &[]).await
    }

    pub async fn sources(&self) -> Result<Vec<Source>> {
        self.get(&["sources"], &[]).await
    }

    pub async fn add_source(&self, source: &NewSource) -> Result<Source> {
        self.post(&["source"], Some(source)).await
    }

    pub async fn subscribe_source(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<SourceSubscription> {
        self.post(
            &["source", "subscribe"],
            Some(&json!({ "user_id": user_id, "source_id": source_id })),
        )
        .await
    }

    pub async fn unsubscribe_source(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<MessageResponse> {
        self.post(
            &["source", "unsubscribe"],
            Some(&json!({ "user_id": user_id, "source_id": source_id })),
        )
        .await
    }

    pub async fn source_subscriptions(&self, user_id: &str) -> Result<Vec<SourceSubscription>> {
        self.get(&["source", "subscriptions", user_id], &[]).await
    }

    pub async fn crawler_status(&self) -> Result<SchedulerStatus> {
        let response: CrawlerStatusResponse = self.get(&["crawler", "status"], &[]).await?;
        Ok(response.scheduler_status)
    }

    pub async fn crawl_url(&self, url: &str) -> Result<MessageResponse> {
        self.post(&["crawler", "url"], Some(&json!({ "url": url })))
            .await
    }

    pub async fn discover(&self) -> Result<MessageResponse> {
        self.post::<serde_json::Value, _>(&["crawler", "discover"], None)
            .await
    }

    pub async fn crawl_now(&self) -> Result<CrawlNowResponse> {
        self.post::<serde_json::Value, _>(&["admin", "crawl-now"], None)
            .await
    }
}
