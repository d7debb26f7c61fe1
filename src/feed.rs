//! News list state: category, filters, and the accumulated pages.
//!
//! Every state change bumps a generation counter and leaves a single pending
//! [`FetchTicket`]. Whoever drives the fetch hands the ticket back to
//! [`FeedController::apply`] together with the result; a ticket from an older
//! generation is dropped so an out-of-order response never overwrites newer
//! state.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::api::{ApiClient, NewsQuery};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::Result;
use crate::models::NewsItem;

pub const DEFAULT_MIN_SCORE: f64 = 0.0;
pub const DEFAULT_DAYS: u32 = 7;
pub const MAX_SCORE: f64 = 10.0;
/// Upper bounds the backend accepts for `days` and `limit`.
pub const MAX_DAYS: u32 = 30;
pub const MAX_PAGE_SIZE: u32 = 100;

#[async_trait]
pub trait NewsFetcher: Send + Sync {
    async fn fetch_news(&self, query: &NewsQuery) -> Result<Vec<NewsItem>>;
}

#[async_trait]
impl NewsFetcher for ApiClient {
    async fn fetch_news(&self, query: &NewsQuery) -> Result<Vec<NewsItem>> {
        self.list_news(query).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategorySelection {
    #[default]
    All,
    Named(String),
}

impl CategorySelection {
    /// `"all"` and the empty string select every category.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            CategorySelection::All
        } else {
            CategorySelection::Named(raw.to_string())
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            CategorySelection::All => None,
            CategorySelection::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for CategorySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategorySelection::All => f.write_str("all"),
            CategorySelection::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterState {
    pub min_score: f64,
    pub days: u32,
    pub limit: u32,
    pub skip: u32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            days: DEFAULT_DAYS,
            limit: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

impl FilterState {
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
        .normalized()
    }

    /// Clamps values into the ranges the backend accepts.
    pub fn normalized(self) -> Self {
        let min_score = if self.min_score.is_finite() {
            self.min_score.clamp(0.0, MAX_SCORE)
        } else {
            DEFAULT_MIN_SCORE
        };
        let limit = self.limit.clamp(1, MAX_PAGE_SIZE);
        Self {
            min_score,
            days: self.days.clamp(1, MAX_DAYS),
            limit,
            skip: self.skip - self.skip % limit,
        }
    }
}

/// The one fetch a state change asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub query: NewsQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Replaced,
    Appended,
    Failed,
    Stale,
}

/// Receives filter edits from the filter panel.
pub trait FilterSink {
    fn current_filters(&self) -> FilterState;
    fn apply_filters(&mut self, filters: FilterState);
}

#[derive(Debug)]
pub struct FeedController {
    category: CategorySelection,
    filters: FilterState,
    items: Vec<NewsItem>,
    has_more: bool,
    loading: bool,
    error: Option<String>,
    generation: u64,
    pending: Option<FetchTicket>,
    /// `skip` of the last page that was applied; restored when a later page fails.
    applied_skip: u32,
}

impl FeedController {
    /// Starts in the loading state with the initial fetch pending.
    pub fn new(category: CategorySelection, filters: FilterState) -> Self {
        let mut controller = Self {
            category,
            filters: FilterState { skip: 0, ..filters.normalized() },
            items: Vec::new(),
            has_more: true,
            loading: false,
            error: None,
            generation: 0,
            pending: None,
            applied_skip: 0,
        };
        controller.schedule();
        controller
    }

    pub fn category(&self) -> &CategorySelection {
        &self.category
    }

    pub fn filters(&self) -> FilterState {
        self.filters
    }

    pub fn items(&self) -> &[NewsItem] {
        &self.items
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn query(&self) -> NewsQuery {
        NewsQuery {
            category: self.category.name().map(str::to_string),
            min_score: self.filters.min_score,
            days: Some(self.filters.days),
            skip: self.filters.skip,
            limit: Some(self.filters.limit),
        }
    }

    pub fn set_category(&mut self, category: CategorySelection) {
        debug!(category = %category, "category changed");
        self.category = category;
        self.restart();
    }

    /// Replaces score, day window and page size; paging always restarts.
    pub fn set_filters(&mut self, filters: FilterState) {
        let filters = filters.normalized();
        debug!(
            min_score = filters.min_score,
            days = filters.days,
            limit = filters.limit,
            "filters changed"
        );
        self.filters = FilterState { skip: 0, ..filters };
        self.restart();
    }

    /// Requests the next page. Does nothing when no more pages are expected,
    /// a fetch is already running, or the first page has not arrived.
    pub fn load_more(&mut self) -> bool {
        if !self.has_more || self.loading || self.items.is_empty() {
            return false;
        }
        self.filters.skip += self.filters.limit;
        self.schedule();
        true
    }

    /// Fetches the current query again from the first page.
    pub fn reload(&mut self) {
        self.restart();
    }

    /// Hands out the fetch the latest state change asked for, if any.
    pub fn take_pending(&mut self) -> Option<FetchTicket> {
        self.pending.take()
    }

    pub fn apply(&mut self, ticket: &FetchTicket, outcome: Result<Vec<NewsItem>>) -> ApplyOutcome {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale news page"
            );
            return ApplyOutcome::Stale;
        }

        self.loading = false;
        let page = match outcome {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, skip = ticket.query.skip, "news fetch failed");
                self.error = Some(e.to_string());
                if ticket.query.skip == 0 {
                    // Nothing to page from; only reload() retries
                    self.has_more = false;
                }
                // Keep what is already shown; a failed "load more" can be retried.
                self.filters.skip = self.applied_skip;
                return ApplyOutcome::Failed;
            }
        };

        self.error = None;
        self.has_more = page.len() as u32 == self.filters.limit;
        self.applied_skip = ticket.query.skip;
        if ticket.query.skip == 0 {
            self.items = page;
            ApplyOutcome::Replaced
        } else {
            self.items.extend(page);
            ApplyOutcome::Appended
        }
    }

    /// Drains the pending ticket, fetches it and applies the result.
    pub async fn sync<F: NewsFetcher + ?Sized>(&mut self, fetcher: &F) -> Option<ApplyOutcome> {
        let ticket = self.take_pending()?;
        let outcome = fetcher.fetch_news(&ticket.query).await;
        Some(self.apply(&ticket, outcome))
    }

    fn restart(&mut self) {
        self.filters.skip = 0;
        self.applied_skip = 0;
        self.items.clear();
        self.has_more = true;
        self.schedule();
    }

    fn schedule(&mut self) {
        self.generation += 1;
        self.loading = true;
        self.error = None;
        self.pending = Some(FetchTicket {
            generation: self.generation,
            query: self.query(),
        });
    }
}

impl FilterSink for FeedController {
    fn current_filters(&self) -> FilterState {
        self.filters
    }

    fn apply_filters(&mut self, filters: FilterState) {
        self.set_filters(filters);
    }
}

/// Runs one ticket against the fetcher; used where the fetch is spawned away
/// from the controller.
pub async fn run_ticket<F: NewsFetcher + ?Sized>(
    fetcher: &F,
    ticket: FetchTicket,
) -> (FetchTicket, Result<Vec<NewsItem>>) {
    let outcome = fetcher.fetch_news(&ticket.query).await;
    (ticket, outcome)
}

#[cfg(test)]
#[path = "feed_tests.rs"]
mod tests;
