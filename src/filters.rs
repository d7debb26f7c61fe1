use url::Url;

use crate::feed::{FilterSink, FilterState, DEFAULT_DAYS, DEFAULT_MIN_SCORE, MAX_DAYS, MAX_SCORE};

pub const DAY_PRESETS: [u32; 4] = [1, 3, 7, 30];
pub const SCORE_STEP: f64 = 0.5;

/// Editable score/day controls mirrored into a URL query string.
///
/// Only values that differ from the defaults are written, so the default
/// view keeps a bare URL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterPanel {
    min_score: f64,
    days: u32,
}

impl Default for FilterPanel {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            days: DEFAULT_DAYS,
        }
    }
}

impl FilterPanel {
    /// Explicit values are kept as given, only clamped into range.
    pub fn new(min_score: f64, days: u32) -> Self {
        Self {
            min_score: clamp_score(min_score),
            days: days.clamp(1, MAX_DAYS),
        }
    }

    /// Reads `min_score` and `days` from a raw query string; missing or
    /// unparseable values keep their defaults.
    pub fn from_query(query: &str) -> Self {
        let mut panel = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "min_score" => {
                    if let Some(score) = value.trim().parse::<f64>().ok().filter(|s| s.is_finite()) {
                        panel.min_score = clamp_score(score);
                    }
                }
                "days" => {
                    if let Some(days) = value.trim().parse::<u32>().ok().filter(|d| *d > 0) {
                        panel.days = days.min(MAX_DAYS);
                    }
                }
                _ => {}
            }
        }
        panel
    }

    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or(""))
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_filters(&self, limit: u32) -> FilterState {
        FilterState {
            min_score: self.min_score,
            days: self.days,
            limit,
            skip: 0,
        }
    }

    pub fn set_min_score<S: FilterSink + ?Sized>(&mut self, value: f64, sink: &mut S) {
        self.min_score = snap_score(value);
        self.notify(sink);
    }

    pub fn set_days<S: FilterSink + ?Sized>(&mut self, days: u32, sink: &mut S) {
        self.days = days.clamp(1, MAX_DAYS);
        self.notify(sink);
    }

    /// Moves the score slider by `steps` half points.
    pub fn step_score<S: FilterSink + ?Sized>(&mut self, steps: i32, sink: &mut S) {
        let value = self.min_score + f64::from(steps) * SCORE_STEP;
        self.set_min_score(value, sink);
    }

    /// Advances to the next day preset, wrapping around.
    pub fn cycle_days<S: FilterSink + ?Sized>(&mut self, sink: &mut S) {
        let next = DAY_PRESETS
            .iter()
            .copied()
            .find(|d| *d > self.days)
            .unwrap_or(DAY_PRESETS[0]);
        self.set_days(next, sink);
    }

    pub fn reset<S: FilterSink + ?Sized>(&mut self, sink: &mut S) {
        *self = Self::default();
        self.notify(sink);
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if self.min_score > DEFAULT_MIN_SCORE {
            pairs.push(("min_score", self.min_score.to_string()));
        }
        if self.days != DEFAULT_DAYS {
            pairs.push(("days", self.days.to_string()));
        }
        pairs
    }

    /// Replaces the query string of `url` with the non-default filter values.
    pub fn write_query(&self, url: &mut Url) {
        url.set_query(None);
        let pairs = self.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
    }

    fn notify<S: FilterSink + ?Sized>(&self, sink: &mut S) {
        let limit = sink.current_filters().limit;
        sink.apply_filters(self.to_filters(limit));
    }
}

fn clamp_score(value: f64) -> f64 {
    if !value.is_finite() {
        return DEFAULT_MIN_SCORE;
    }
    value.clamp(0.0, MAX_SCORE)
}

/// Clamps to 0–10 and rounds to the slider's half-point steps.
fn snap_score(value: f64) -> f64 {
    (clamp_score(value) / SCORE_STEP).round() * SCORE_STEP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        filters: FilterState,
        received: Vec<FilterState>,
    }

    impl FilterSink for RecordingSink {
        fn current_filters(&self) -> FilterState {
            self.filters
        }

        fn apply_filters(&mut self, filters: FilterState) {
            self.filters = filters;
            self.received.push(filters);
        }
    }

    fn page_url(query: &str) -> Url {
        Url::parse(&format!("http://localhost:3000/{}", query)).unwrap()
    }

    #[test]
    fn reads_filters_from_query() {
        let panel = FilterPanel::from_url(&page_url("?min_score=2.5&days=3"));
        assert_eq!(panel.min_score(), 2.5);
        assert_eq!(panel.days(), 3);

        let panel = FilterPanel::from_query("days=zero&min_score=abc");
        assert!(panel.is_default());
    }

    #[test]
    fn link_values_are_kept_off_the_slider_grid() {
        let mut url = page_url("?min_score=2.3&days=31");
        let panel = FilterPanel::from_url(&url);
        assert_eq!(panel.min_score(), 2.3);
        assert_eq!(panel.days(), 30);
        assert_eq!(panel.to_filters(20).min_score, 2.3);

        panel.write_query(&mut url);
        assert_eq!(url.query(), Some("min_score=2.3&days=30"));

        assert_eq!(FilterPanel::from_query("min_score=12").min_score(), 10.0);
        assert_eq!(FilterPanel::new(7.3, 3).min_score(), 7.3);

        let mut sink = RecordingSink::default();
        let mut stepped = panel;
        stepped.step_score(1, &mut sink);
        assert_eq!(stepped.min_score(), 3.0);
    }

    #[test]
    fn url_round_trip() {
        let mut sink = RecordingSink::default();
        let mut panel = FilterPanel::default();
        panel.set_min_score(2.5, &mut sink);
        panel.set_days(3, &mut sink);

        let mut url = page_url("?utm=x");
        panel.write_query(&mut url);
        assert_eq!(url.query(), Some("min_score=2.5&days=3"));
        assert_eq!(FilterPanel::from_url(&url), panel);

        panel.set_min_score(0.0, &mut sink);
        panel.set_days(7, &mut sink);
        panel.write_query(&mut url);
        assert_eq!(url.query(), None);
        assert_eq!(url.as_str(), "http://localhost:3000/");
    }

    #[test]
    fn edits_notify_with_reset_paging() {
        let mut sink = RecordingSink {
            filters: FilterState {
                min_score: 0.0,
                days: 7,
                limit: 50,
                skip: 100,
            },
            received: Vec::new(),
        };
        let mut panel = FilterPanel::default();
        panel.set_min_score(6.2, &mut sink);

        let sent = sink.received[0];
        assert_eq!(sent.min_score, 6.0);
        assert_eq!(sent.days, 7);
        assert_eq!(sent.limit, 50);
        assert_eq!(sent.skip, 0);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut sink = RecordingSink::default();
        let mut panel = FilterPanel::from_query("min_score=4&days=30");
        assert!(!panel.is_default());

        panel.reset(&mut sink);
        assert!(panel.is_default());
        assert_eq!(sink.received.len(), 1);
        assert_eq!(sink.received[0].min_score, 0.0);
        assert_eq!(sink.received[0].days, 7);
        assert!(panel.query_pairs().is_empty());
    }

    #[test]
    fn slider_and_presets() {
        let mut sink = RecordingSink::default();
        let mut panel = FilterPanel::default();

        panel.step_score(-1, &mut sink);
        assert_eq!(panel.min_score(), 0.0);
        panel.step_score(3, &mut sink);
        assert_eq!(panel.min_score(), 1.5);
        panel.set_min_score(42.0, &mut sink);
        assert_eq!(panel.min_score(), 10.0);

        panel.cycle_days(&mut sink);
        assert_eq!(panel.days(), 30);
        panel.cycle_days(&mut sink);
        assert_eq!(panel.days(), 1);
        panel.cycle_days(&mut sink);
        assert_eq!(panel.days(), 3);
    }
}
