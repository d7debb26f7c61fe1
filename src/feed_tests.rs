use super::*;
use crate::error::ApiError;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Serves canned pages in order and records every query it sees.
#[derive(Default)]
struct ScriptedFetcher {
    pages: Mutex<VecDeque<Result<Vec<NewsItem>>>>,
    queries: Mutex<Vec<NewsQuery>>,
}

impl ScriptedFetcher {
    fn with_pages(pages: Vec<Result<Vec<NewsItem>>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn queries(&self) -> Vec<NewsQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsFetcher for ScriptedFetcher {
    async fn fetch_news(&self, query: &NewsQuery) -> Result<Vec<NewsItem>> {
        self.queries.lock().unwrap().push(query.clone());
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn news(prefix: &str, count: usize) -> Vec<NewsItem> {
    (0..count)
        .map(|i| NewsItem {
            id: format!("{}-{}", prefix, i),
            title: format!("{} story {}", prefix, i),
            source: "Wire".to_string(),
            published_at: Utc::now(),
            url: format!("https://example.com/{}/{}", prefix, i),
            summary: None,
            importance_score: 5.0,
            categories: Vec::new(),
        })
        .collect()
}

fn server_error() -> ApiError {
    ApiError::Status {
        status: 500,
        status_text: "Internal Server Error".to_string(),
        detail: None,
    }
}

fn ids(controller: &FeedController) -> Vec<String> {
    controller.items().iter().map(|i| i.id.clone()).collect()
}

#[tokio::test]
async fn test_initial_load_replaces_empty_list() {
    let fetcher = ScriptedFetcher::with_pages(vec![Ok(news("a", 20))]);
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    assert!(feed.is_loading());

    assert_eq!(feed.sync(&fetcher).await, Some(ApplyOutcome::Replaced));

    let queries = fetcher.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].category, None);
    assert_eq!(queries[0].skip, 0);
    assert_eq!(queries[0].limit, Some(20));
    assert_eq!(queries[0].days, Some(7));
    assert_eq!(feed.items().len(), 20);
    assert!(feed.has_more());
    assert!(!feed.is_loading());
}

#[tokio::test]
async fn test_load_more_appends_and_detects_last_page() {
    let fetcher = ScriptedFetcher::with_pages(vec![Ok(news("a", 20)), Ok(news("b", 15))]);
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    feed.sync(&fetcher).await;

    assert!(feed.load_more());
    assert_eq!(feed.filters().skip, 20);
    // The first page stays visible while the next one loads.
    assert_eq!(feed.items().len(), 20);

    assert_eq!(feed.sync(&fetcher).await, Some(ApplyOutcome::Appended));
    assert_eq!(feed.items().len(), 35);
    assert_eq!(feed.items()[0].id, "a-0");
    assert_eq!(feed.items()[20].id, "b-0");
    assert!(!feed.has_more());
    assert_eq!(fetcher.queries()[1].skip, 20);
}

#[tokio::test]
async fn test_load_more_is_noop_without_more_pages() {
    let fetcher = ScriptedFetcher::with_pages(vec![Ok(news("a", 3))]);
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    feed.sync(&fetcher).await;
    assert!(!feed.has_more());

    assert!(!feed.load_more());
    assert_eq!(feed.filters().skip, 0);
    assert!(feed.take_pending().is_none());
    assert_eq!(ids(&feed).len(), 3);
}

#[test]
fn test_load_more_waits_for_running_fetch() {
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    assert!(!feed.load_more());
    assert_eq!(feed.filters().skip, 0);
}

#[tokio::test]
async fn test_category_change_resets_paging() {
    let fetcher = ScriptedFetcher::with_pages(vec![
        Ok(news("a", 20)),
        Ok(news("b", 20)),
        Ok(news("tech", 4)),
    ]);
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    feed.sync(&fetcher).await;
    feed.load_more();
    feed.sync(&fetcher).await;
    assert_eq!(feed.items().len(), 40);

    feed.set_category(CategorySelection::parse("tech"));
    assert_eq!(feed.filters().skip, 0);
    assert!(feed.items().is_empty());
    assert!(feed.is_loading());

    assert_eq!(feed.sync(&fetcher).await, Some(ApplyOutcome::Replaced));
    let last = fetcher.queries().pop().unwrap();
    assert_eq!(last.category.as_deref(), Some("tech"));
    assert_eq!(last.skip, 0);
    assert_eq!(ids(&feed), vec!["tech-0", "tech-1", "tech-2", "tech-3"]);
}

#[tokio::test]
async fn test_filter_change_resets_paging() {
    let fetcher = ScriptedFetcher::with_pages(vec![Ok(news("a", 10)), Ok(news("b", 10))]);
    let mut feed = FeedController::new(CategorySelection::All, FilterState::with_limit(10));
    feed.sync(&fetcher).await;
    feed.load_more();
    feed.sync(&fetcher).await;
    assert_eq!(feed.items().len(), 20);

    feed.set_filters(FilterState {
        min_score: 2.5,
        days: 3,
        limit: 10,
        skip: 30,
    });
    assert_eq!(feed.filters().skip, 0);
    assert!(feed.items().is_empty());

    let ticket = feed.take_pending().unwrap();
    assert_eq!(ticket.query.min_score, 2.5);
    assert_eq!(ticket.query.days, Some(3));
    assert_eq!(ticket.query.skip, 0);
}

#[test]
fn test_stale_page_is_discarded() {
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    feed.take_pending();

    feed.set_category(CategorySelection::parse("tech"));
    let tech = feed.take_pending().unwrap();
    feed.set_category(CategorySelection::parse("sports"));
    let sports = feed.take_pending().unwrap();

    // The sports page lands first, then the late tech response.
    assert_eq!(feed.apply(&sports, Ok(news("sports", 2))), ApplyOutcome::Replaced);
    assert_eq!(feed.apply(&tech, Ok(news("tech", 20))), ApplyOutcome::Stale);
    assert_eq!(ids(&feed), vec!["sports-0", "sports-1"]);
    assert!(!feed.has_more());
}

#[test]
fn test_stale_page_does_not_end_loading() {
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    let first = feed.take_pending().unwrap();
    feed.set_category(CategorySelection::parse("sports"));

    assert_eq!(feed.apply(&first, Ok(news("all", 20))), ApplyOutcome::Stale);
    assert!(feed.is_loading());
    assert!(feed.items().is_empty());
}

#[test]
fn test_burst_of_changes_issues_one_fetch() {
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    feed.set_category(CategorySelection::parse("tech"));
    feed.set_filters(FilterState {
        min_score: 4.0,
        ..FilterState::default()
    });

    let ticket = feed.take_pending().unwrap();
    assert_eq!(ticket.generation, feed.generation());
    assert_eq!(ticket.query.category.as_deref(), Some("tech"));
    assert_eq!(ticket.query.min_score, 4.0);
    assert!(feed.take_pending().is_none());
}

#[tokio::test]
async fn test_failed_load_more_keeps_list() {
    let fetcher = ScriptedFetcher::with_pages(vec![
        Ok(news("a", 20)),
        Err(server_error()),
        Ok(news("b", 20)),
    ]);
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());
    feed.sync(&fetcher).await;

    assert!(feed.load_more());
    assert_eq!(feed.sync(&fetcher).await, Some(ApplyOutcome::Failed));
    assert_eq!(feed.items().len(), 20);
    assert_eq!(feed.filters().skip, 0);
    assert!(feed.has_more());
    assert!(!feed.is_loading());
    assert!(feed.error().unwrap().contains("500"));

    // Retrying asks for the same page again.
    assert!(feed.load_more());
    assert_eq!(feed.sync(&fetcher).await, Some(ApplyOutcome::Appended));
    assert_eq!(fetcher.queries()[2].skip, 20);
    assert_eq!(feed.items().len(), 40);
    assert!(feed.error().is_none());
}

#[tokio::test]
async fn test_failed_first_page_surfaces_error() {
    let fetcher = ScriptedFetcher::with_pages(vec![Err(server_error()), Ok(news("a", 1))]);
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());

    assert_eq!(feed.sync(&fetcher).await, Some(ApplyOutcome::Failed));
    assert!(feed.items().is_empty());
    assert!(feed.error().is_some());

    feed.reload();
    assert!(feed.error().is_none());
    assert_eq!(feed.sync(&fetcher).await, Some(ApplyOutcome::Replaced));
    assert_eq!(feed.items().len(), 1);
}

#[tokio::test]
async fn test_failed_first_page_blocks_load_more() {
    let fetcher = ScriptedFetcher::with_pages(vec![Err(server_error()), Ok(news("a", 20))]);
    let mut feed = FeedController::new(CategorySelection::All, FilterState::default());

    assert_eq!(feed.sync(&fetcher).await, Some(ApplyOutcome::Failed));
    assert!(!feed.has_more());
    assert!(!feed.load_more());
    assert!(feed.take_pending().is_none());
    assert_eq!(feed.filters().skip, 0);

    feed.reload();
    let ticket = feed.take_pending().unwrap();
    assert_eq!(ticket.query.skip, 0);
    assert_eq!(
        feed.apply(&ticket, fetcher.fetch_news(&ticket.query).await),
        ApplyOutcome::Replaced
    );
    assert_eq!(feed.items().len(), 20);
    assert!(feed.has_more());
}

#[test]
fn test_has_more_tracks_full_pages() {
    let mut feed = FeedController::new(CategorySelection::All, FilterState::with_limit(5));
    let ticket = feed.take_pending().unwrap();
    feed.apply(&ticket, Ok(news("a", 5)));
    assert!(feed.has_more());

    feed.load_more();
    let ticket = feed.take_pending().unwrap();
    feed.apply(&ticket, Ok(Vec::new()));
    assert!(!feed.has_more());
    assert_eq!(feed.items().len(), 5);
}

#[test]
fn test_filters_are_normalized() {
    let filters = FilterState {
        min_score: 14.0,
        days: 0,
        limit: 0,
        skip: 7,
    }
    .normalized();
    assert_eq!(filters.min_score, MAX_SCORE);
    assert_eq!(filters.days, 1);
    assert_eq!(filters.limit, 1);
    assert_eq!(filters.skip, 7);

    let filters = FilterState {
        skip: 25,
        ..FilterState::default()
    }
    .normalized();
    assert_eq!(filters.skip, 20);

    let filters = FilterState {
        min_score: 0.0,
        days: 31,
        limit: 200,
        skip: 250,
    }
    .normalized();
    assert_eq!(filters.days, MAX_DAYS);
    assert_eq!(filters.limit, MAX_PAGE_SIZE);
    assert_eq!(filters.skip, 200);
}

#[test]
fn test_category_selection_parsing() {
    assert_eq!(CategorySelection::parse("all"), CategorySelection::All);
    assert_eq!(CategorySelection::parse(" "), CategorySelection::All);
    assert_eq!(
        CategorySelection::parse("tech").name(),
        Some("tech")
    );
    assert_eq!(CategorySelection::Named("tech".into()).to_string(), "tech");
}
