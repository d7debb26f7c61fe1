use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

use newsdesk::account::{self, AccountOverview, HistoryFilter, Toggle};
use newsdesk::admin::{self, StatusPoller};
use newsdesk::api::ApiClient;
use newsdesk::config::Config;
use newsdesk::feed::{CategorySelection, FeedController};
use newsdesk::filters::FilterPanel;
use newsdesk::format::{format_absolute, format_optional, format_relative, format_score};
use newsdesk::models::{NewsItem, SchedulerStatus, Session};
use newsdesk::routes::Route;
use newsdesk::session::{FileStorage, SessionStore};
use newsdesk::theme::ThemePreference;
use newsdesk::viewer::{self, BrowserContext};

#[derive(Parser)]
#[command(name = "newsdesk")]
#[command(about = "Terminal client for the news aggregation service", long_about = None)]
struct Cli {
    /// Backend API base URL
    #[arg(long, global = true, env = "NEWSDESK_API_URL")]
    api_url: Option<String>,

    /// Directory for the session, theme and log files
    #[arg(long, global = true, env = "NEWSDESK_DATA_DIR")]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LocationArgs {
    /// Category name, or "all"
    #[arg(short, long)]
    category: Option<String>,

    /// Minimum importance score (0-10)
    #[arg(short, long)]
    min_score: Option<f64>,

    /// Only news from the last N days
    #[arg(short, long)]
    days: Option<u32>,

    /// Start from a shared web link, e.g. http://localhost:3000/category/tech?days=3
    #[arg(long)]
    from_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List news, following "load more" for the requested number of pages
    News {
        #[command(flatten)]
        location: LocationArgs,

        #[arg(short, long)]
        limit: Option<u32>,

        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },
    /// Show one article
    Show { id: String },
    /// Open the terminal browser
    Browse {
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Resolve a shared web link and run the matching command
    Open { url: String },
    Categories,
    /// Log in; the password is read from NEWSDESK_PASSWORD or stdin
    Login { username: String },
    Register { username: String, email: String },
    Logout,
    Whoami,
    /// Browse history of the logged-in user
    History {
        #[arg(short, long)]
        keyword: Option<String>,

        /// Viewed after this day (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Viewed before this day (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Categories with subscription markers
    Subscriptions,
    Subscribe { category_id: String },
    Unsubscribe { category_id: String },
    /// News from subscribed categories
    Feed,
    Sources {
        #[command(subcommand)]
        action: SourceCommands,
    },
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },
    Theme {
        #[command(subcommand)]
        action: Option<ThemeCommands>,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    List,
    Add {
        name: String,
        url: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    Subscribe { source_id: String },
    Unsubscribe { source_id: String },
    /// Sources the logged-in user subscribes to
    Mine,
}

#[derive(Subcommand)]
enum AdminCommands {
    Status,
    /// Poll the crawler status until interrupted
    Watch,
    CrawlNow,
    CrawlUrl { url: String },
    Discover,
}

#[derive(Subcommand)]
enum ThemeCommands {
    Toggle,
}

struct App {
    config: Config,
    session: Arc<SessionStore>,
    api: ApiClient,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url)?;
    }
    if let Some(data_dir) = &cli.data_dir {
        config = config.with_data_dir(data_dir);
    }

    let browsing = matches!(cli.command, Commands::Browse { .. });
    init_tracing(browsing.then(|| config.log_file()).as_deref())?;

    let session = Arc::new(SessionStore::new(FileStorage::new(config.session_file())));
    let api = ApiClient::new(config.api_url.clone(), session.clone())?;
    let app = App {
        config,
        session,
        api,
    };

    run(&app, cli.command).await
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env("NEWSDESK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        // The browser owns the terminal, so logs go to a file
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::News {
            location,
            limit,
            pages,
        } => {
            let (category, panel) = resolve_location(&app.config, &location)?;
            list_news(app, category, panel, limit, pages).await?;
        }
        Commands::Show { id } => show_article(app, &id).await?,
        Commands::Browse { location } => {
            let (category, filters) = resolve_location(&app.config, &location)?;
            viewer::run_browser(BrowserContext {
                api: app.api.clone(),
                theme: load_theme(&app.config),
                web_url: app.config.web_url.clone(),
                category,
                filters,
                page_size: app.config.page_size,
            })
            .await?;
        }
        Commands::Open { url } => open_link(app, &url).await?,
        Commands::Categories => {
            for category in app.api.categories().await? {
                match category.description.as_deref() {
                    Some(description) => {
                        println!("{:<12} {} - {}", category.id, category.name, description)
                    }
                    None => println!("{:<12} {}", category.id, category.name),
                }
            }
        }
        Commands::Login { username } => {
            let password = read_password()?;
            let session = app.api.login(&username, &password).await?;
            println!("Logged in as {}", session.user.username);
        }
        Commands::Register { username, email } => {
            let password = read_password()?;
            let user = account::register(&app.api, &username, &email, &password).await?;
            println!("Registered {} ({}). Log in to continue.", user.username, user.id);
        }
        Commands::Logout => {
            app.session.logout()?;
            println!("Logged out");
        }
        Commands::Whoami => {
            if !app.session.is_logged_in() {
                println!("Not logged in");
                return Ok(());
            }
            let session = require_session(app)?;
            println!("{} ({})", session.user.username, session.user.id);
            if let Some(email) = session.user.email.as_deref() {
                println!("{}", email);
            }
        }
        Commands::History { keyword, from, to } => {
            let session = require_session(app)?;
            let entries = account::history(&app.api, &session).await?;
            let filter = HistoryFilter {
                keyword,
                after: from,
                before: to,
            };
            let matched = filter.apply(&entries);
            if matched.is_empty() {
                println!("No browse history");
            }
            for entry in matched {
                println!("{}  {}  [{}]", format_optional(entry.viewed_at), entry.title, entry.news_id);
            }
        }
        Commands::Subscriptions => {
            let overview = load_overview(app).await?;
            for category in &overview.categories {
                let mark = if overview.is_subscribed_category(&category.id) {
                    "x"
                } else {
                    " "
                };
                println!("[{}] {:<12} {}", mark, category.id, category.name);
            }
        }
        Commands::Subscribe { category_id } => {
            let mut overview = load_overview(app).await?;
            if overview.is_subscribed_category(&category_id) {
                println!("Already subscribed to {}", category_id);
            } else {
                overview.toggle_category(&app.api, &category_id).await?;
                println!("Subscribed to {}", category_id);
            }
        }
        Commands::Unsubscribe { category_id } => {
            let mut overview = load_overview(app).await?;
            if overview.is_subscribed_category(&category_id) {
                overview.toggle_category(&app.api, &category_id).await?;
                println!("Unsubscribed from {}", category_id);
            } else {
                println!("Not subscribed to {}", category_id);
            }
        }
        Commands::Feed => {
            let overview = load_overview(app).await?;
            if overview.subscribed_categories.is_empty() {
                println!("No subscriptions yet; see `newsdesk subscriptions`");
            }
            print_items(&overview.subscribed_news(&app.api).await?);
        }
        Commands::Sources { action } => run_sources(app, action).await?,
        Commands::Admin { action } => run_admin(app, action).await?,
        Commands::Theme { action } => {
            let mut theme = load_theme(&app.config);
            if let Some(ThemeCommands::Toggle) = action {
                theme.toggle()?;
            }
            println!("{}", theme.mode().as_str());
        }
    }

    Ok(())
}

async fn run_sources(app: &App, action: SourceCommands) -> Result<()> {
    match action {
        SourceCommands::List => {
            for source in app.api.sources().await? {
                println!("{:<12} {}  {}", source.id, source.name, source.url);
            }
        }
        SourceCommands::Add {
            name,
            url,
            description,
        } => {
            let mut overview = load_overview(app).await?;
            let created = overview
                .add_source(&app.api, &name, &url, description.as_deref())
                .await?;
            println!("Added source {} ({})", created.name, created.id);
        }
        SourceCommands::Subscribe { source_id } => {
            let mut overview = load_overview(app).await?;
            if overview.is_subscribed_source(&source_id) {
                println!("Already subscribed to source {}", source_id);
            } else if overview.toggle_source(&app.api, &source_id).await? == Toggle::Subscribed {
                println!("Subscribed to source {}", source_id);
            }
        }
        SourceCommands::Unsubscribe { source_id } => {
            let mut overview = load_overview(app).await?;
            if !overview.is_subscribed_source(&source_id) {
                println!("Not subscribed to source {}", source_id);
            } else if overview.toggle_source(&app.api, &source_id).await? == Toggle::Unsubscribed {
                println!("Unsubscribed from source {}", source_id);
            }
        }
        SourceCommands::Mine => {
            let overview = load_overview(app).await?;
            for source in overview
                .sources
                .iter()
                .filter(|s| overview.is_subscribed_source(&s.id))
            {
                println!("{:<12} {}  {}", source.id, source.name, source.url);
            }
        }
    }
    Ok(())
}

async fn run_admin(app: &App, action: AdminCommands) -> Result<()> {
    match action {
        AdminCommands::Status => print_status(&app.api.crawler_status().await?),
        AdminCommands::Watch => {
            let poller = StatusPoller::start(Arc::new(app.api.clone()), app.config.poll_interval);
            let mut updates = poller.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = updates.borrow_and_update().clone();
                        if let Some(error) = snapshot.error {
                            eprintln!("Status refresh failed: {}", error);
                        }
                        if let Some(status) = snapshot.status {
                            print_status(&status);
                            println!();
                        }
                    }
                }
            }
            poller.stop();
        }
        AdminCommands::CrawlNow => {
            println!("Crawling…");
            let report = admin::trigger_crawl(&app.api).await;
            if !report.success {
                bail!(
                    "Crawl failed after {:.1}s: {}",
                    report.duration_secs,
                    report.message
                );
            }
            println!("Crawl finished: {}", report.message);
            println!(
                "  {} stories in {:.1}s, at {}",
                report.news_count,
                report.duration_secs,
                format_absolute(report.finished_at)
            );
        }
        AdminCommands::CrawlUrl { url } => {
            let resp = admin::submit_url(&app.api, &url).await?;
            println!("{}", resp.message);
        }
        AdminCommands::Discover => {
            let resp = admin::discover(&app.api).await?;
            println!("{}", resp.message);
        }
    }
    Ok(())
}

/// Combines a shared link with explicit flags; flags win.
fn resolve_location(
    config: &Config,
    location: &LocationArgs,
) -> Result<(CategorySelection, FilterPanel)> {
    let (mut category, mut panel) = match location.from_url.as_deref() {
        Some(raw) => {
            let url = Url::parse(raw).with_context(|| format!("Invalid link: {}", raw))?;
            match Route::parse(&url, &config.web_url) {
                Route::News { category, filters } => (category, filters),
                other => bail!("Not a news list link: {:?}", other),
            }
        }
        None => (CategorySelection::All, FilterPanel::default()),
    };

    if let Some(raw) = location.category.as_deref() {
        category = CategorySelection::parse(raw);
    }
    if location.min_score.is_some() || location.days.is_some() {
        panel = FilterPanel::new(
            location.min_score.unwrap_or(panel.min_score()),
            location.days.unwrap_or(panel.days()),
        );
    }
    Ok((category, panel))
}

async fn list_news(
    app: &App,
    category: CategorySelection,
    panel: FilterPanel,
    limit: Option<u32>,
    pages: u32,
) -> Result<()> {
    let limit = limit.unwrap_or(app.config.page_size);
    let mut feed = FeedController::new(category, panel.to_filters(limit));
    feed.sync(&app.api).await;
    for _ in 1..pages {
        if !feed.load_more() {
            break;
        }
        feed.sync(&app.api).await;
    }

    let location = Route::News {
        category: feed.category().clone(),
        filters: panel,
    }
    .to_url(&app.config.web_url);
    debug!(%location, items = feed.items().len(), "news listed");

    if let Some(error) = feed.error() {
        if feed.items().is_empty() {
            bail!("Failed to load news: {}", error);
        }
        eprintln!("Failed to load more news: {}", error);
    }

    if feed.items().is_empty() {
        println!("No news for these filters");
        return Ok(());
    }
    print_items(feed.items());
    if feed.has_more() {
        println!("… more available, use --pages {}", pages + 1);
    }
    println!("{}", location);
    Ok(())
}

async fn show_article(app: &App, id: &str) -> Result<()> {
    let detail = app
        .api
        .news_detail(id)
        .await
        .with_context(|| format!("Failed to load article {}", id))?;
    let history = app.api.record_view(id);

    let item = &detail.item;
    println!("{}", item.title);
    println!("Source: {}", item.source);
    println!("Published: {}", format_absolute(item.published_at));
    println!("Importance: {}", format_score(item.importance_score));
    if !item.categories.is_empty() {
        let names: Vec<&str> = item.categories.iter().map(|c| c.name.as_str()).collect();
        println!("Categories: {}", names.join(", "));
    }
    println!("Link: {}", item.url);
    if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
        println!();
        for line in textwrap::wrap(summary, 80) {
            println!("{}", line);
        }
    }
    println!();
    if detail.content.is_empty() {
        println!("No content available");
    } else {
        print!("{}", html2text::from_read(detail.content.as_bytes(), 80));
    }

    if let Some(handle) = history {
        let _ = handle.await;
    }
    Ok(())
}

async fn open_link(app: &App, raw: &str) -> Result<()> {
    let url = Url::parse(raw).with_context(|| format!("Invalid link: {}", raw))?;
    match Route::parse(&url, &app.config.web_url) {
        Route::News { category, filters } => list_news(app, category, filters, None, 1).await,
        Route::Article(id) => show_article(app, &id).await,
        Route::Account => {
            let session = require_session(app)?;
            println!("{} ({})", session.user.username, session.user.id);
            Ok(())
        }
        Route::Admin | Route::Crawler => run_admin(app, AdminCommands::Status).await,
        Route::Login => {
            println!("Run `newsdesk login <username>`");
            Ok(())
        }
        Route::Register => {
            println!("Run `newsdesk register <username> <email>`");
            Ok(())
        }
        Route::Unknown(path) => bail!("Unknown page: {}", path),
    }
}

fn require_session(app: &App) -> Result<Session> {
    if !app.session.is_logged_in() {
        bail!("Not logged in; run `newsdesk login <username>` first");
    }
    app.session
        .get_user()
        .context("Session disappeared while reading it")
}

async fn load_overview(app: &App) -> Result<AccountOverview> {
    let session = require_session(app)?;
    AccountOverview::load(&app.api, &session.user.id)
        .await
        .context("Failed to load subscriptions")
}

fn load_theme(config: &Config) -> ThemePreference {
    let preferred = std::env::var("NEWSDESK_THEME").ok();
    ThemePreference::load(config.theme_file(), preferred.as_deref())
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("NEWSDESK_PASSWORD") {
        return Ok(password);
    }
    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    let password = line.trim_end_matches(&['\r', '\n'][..]).to_string();
    if password.is_empty() {
        bail!("Password is required");
    }
    Ok(password)
}

fn print_items(items: &[NewsItem]) {
    let now = Utc::now();
    for item in items {
        println!("{:>7}  {}  [{}]", format_score(item.importance_score), item.title, item.id);
        println!(
            "         {} · {}",
            item.source,
            format_relative(item.published_at, now)
        );
    }
}

fn print_status(status: &SchedulerStatus) {
    println!("Scheduler: {}", if status.running { "running" } else { "stopped" });
    if let Some(hours) = status.interval_hours {
        println!("Interval: every {} h", hours);
    }
    println!(
        "Runs: {} total, {} succeeded, {} failed",
        status.total_runs, status.successful_runs, status.failed_runs
    );
    println!("Last run: {}", format_optional(status.last_run));
    println!("Next run: {}", format_optional(status.next_run));
}
