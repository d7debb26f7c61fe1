use url::Url;

use crate::feed::CategorySelection;
use crate::filters::FilterPanel;

/// Views reachable through a shareable web link.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    News {
        category: CategorySelection,
        filters: FilterPanel,
    },
    Article(String),
    Login,
    Register,
    Account,
    Crawler,
    Admin,
    Unknown(String),
}

impl Route {
    /// Resolves `url` against the web base. Paths outside the base path are
    /// matched from the root.
    pub fn parse(url: &Url, base: &Url) -> Route {
        let segments = relative_segments(url, base);
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

        match parts.as_slice() {
            [] => Route::News {
                category: CategorySelection::All,
                filters: FilterPanel::from_url(url),
            },
            ["category", name] => Route::News {
                category: CategorySelection::parse(name),
                filters: FilterPanel::from_url(url),
            },
            ["news", id] => Route::Article(id.to_string()),
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            ["user"] => Route::Account,
            ["crawler"] | ["submit-url"] => Route::Crawler,
            ["admin"] => Route::Admin,
            _ => Route::Unknown(url.path().to_string()),
        }
    }

    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.set_query(None);
        url.set_fragment(None);

        let segments: Vec<&str> = match self {
            Route::News { category, .. } => match category.name() {
                Some(name) => vec!["category", name],
                None => Vec::new(),
            },
            Route::Article(id) => vec!["news", id.as_str()],
            Route::Login => vec!["login"],
            Route::Register => vec!["register"],
            Route::Account => vec!["user"],
            Route::Crawler => vec!["crawler"],
            Route::Admin => vec!["admin"],
            Route::Unknown(path) => {
                url.set_path(path);
                return url;
            }
        };

        if !segments.is_empty() {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            }
        }
        if let Route::News { filters, .. } = self {
            filters.write_query(&mut url);
        }
        url
    }
}

fn relative_segments(url: &Url, base: &Url) -> Vec<String> {
    let decode = |segment: &str| {
        urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string())
    };
    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(decode).collect())
        .unwrap_or_default();
    let base_segments: Vec<String> = base
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(decode).collect())
        .unwrap_or_default();

    if segments.starts_with(&base_segments) {
        segments[base_segments.len()..].to_vec()
    } else {
        segments
    }
}
