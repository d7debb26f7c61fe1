use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub source: String,
    #[serde(with = "timestamp")]
    pub published_at: DateTime<Utc>,
    pub url: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub importance_score: f64,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDetail {
    #[serde(flatten)]
    pub item: NewsItem,
    #[serde(default)]
    pub content: String,
    #[serde(default, with = "timestamp::option")]
    pub crawled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Authenticated session as persisted on disk: user fields at the top level
/// next to the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(flatten)]
    pub user: User,
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub access_token: String,
    pub token_type: String,
}

impl From<LoginResponse> for Session {
    fn from(resp: LoginResponse) -> Self {
        Session {
            user: resp.user,
            access_token: resp.access_token,
            token_type: resp.token_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub news_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySubscription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSubscription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub source_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub interval_hours: Option<f64>,
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub successful_runs: u64,
    #[serde(default)]
    pub failed_runs: u64,
    #[serde(default, with = "timestamp::option")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerStatusResponse {
    pub scheduler_status: SchedulerStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CrawlNowResponse {
    pub message: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub news_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageResponse {
    #[serde(default, alias = "msg")]
    pub message: String,
}

/// The backend emits naive ISO-8601 timestamps; those are read as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        crate::format::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => s.serialize_str(&ts.to_rfc3339()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            Ok(raw.as_deref().and_then(crate::format::parse_timestamp))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn news_item_accepts_naive_timestamps() {
        let item: NewsItem = serde_json::from_value(json!({
            "id": "n1",
            "title": "Chip exports tighten",
            "summary": "Short summary",
            "source": "Wire",
            "url": "https://example.com/n1",
            "published_at": "2024-05-01T08:30:00.123456",
            "importance_score": 8.5,
            "categories": [{"id": "c1", "name": "tech"}]
        }))
        .unwrap();

        assert_eq!(item.published_at.to_rfc3339(), "2024-05-01T08:30:00.123456+00:00");
        assert_eq!(item.categories[0].name, "tech");
    }

    #[test]
    fn session_is_stored_flat() {
        let session = Session {
            user: User {
                id: "u1".to_string(),
                username: "ada".to_string(),
                email: Some("ada@example.com".to_string()),
                created_at: None,
            },
            access_token: "a.b.c".to_string(),
            token_type: "bearer".to_string(),
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["username"], "ada");
        assert_eq!(value["access_token"], "a.b.c");

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn detail_flattens_item_fields() {
        let detail: NewsDetail = serde_json::from_value(json!({
            "id": "n2",
            "title": "Rates hold",
            "source": "Wire",
            "url": "https://example.com/n2",
            "published_at": "2024-05-02T10:00:00Z",
            "importance_score": 6.0,
            "categories": [],
            "content": "Full text",
            "crawled_at": "2024-05-02T10:05:00"
        }))
        .unwrap();

        assert_eq!(detail.item.id, "n2");
        assert_eq!(detail.content, "Full text");
        assert!(detail.crawled_at.is_some());
    }
}
