use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::mpsc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use unicode_width::UnicodeWidthChar;
use url::Url;

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::feed::{run_ticket, CategorySelection, FeedController, FetchTicket};
use crate::filters::FilterPanel;
use crate::format::{format_absolute, format_optional, format_relative, format_score};
use crate::models::{Category, NewsDetail, NewsItem};
use crate::routes::Route;
use crate::theme::{Palette, ThemePreference};

const TICK: Duration = Duration::from_millis(100);

/// Everything the browser needs, handed in by the caller.
pub struct BrowserContext {
    pub api: ApiClient,
    pub theme: ThemePreference,
    pub web_url: Url,
    pub category: CategorySelection,
    pub filters: FilterPanel,
    pub page_size: u32,
}

/// Runs the terminal news browser until the user quits.
pub async fn run_browser(ctx: BrowserContext) -> Result<()> {
    let runtime = Handle::current();
    tokio::task::spawn_blocking(move || run_terminal(runtime, ctx))
        .await
        .context("Browser task failed")?
}

fn run_terminal(runtime: Handle, ctx: BrowserContext) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = BrowserApp::new(runtime, ctx);
    app.load_categories();

    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

enum Msg {
    Page(FetchTicket, std::result::Result<Vec<NewsItem>, ApiError>),
    Categories(std::result::Result<Vec<Category>, ApiError>),
    Detail(String, std::result::Result<NewsDetail, ApiError>),
}

enum Screen {
    List,
    Detail(DetailView),
}

struct DetailView {
    id: String,
    detail: Option<NewsDetail>,
    error: Option<String>,
    scroll: u16,
    content_lines: Vec<String>,
}

struct BrowserApp {
    api: ApiClient,
    runtime: Handle,
    feed: FeedController,
    panel: FilterPanel,
    tabs: Vec<CategorySelection>,
    tab: usize,
    selected: usize,
    theme: ThemePreference,
    web_url: Url,
    screen: Screen,
    notice: Option<String>,
    tx: mpsc::Sender<Msg>,
    rx: mpsc::Receiver<Msg>,
}

impl BrowserApp {
    fn new(runtime: Handle, ctx: BrowserContext) -> Self {
        let (tx, rx) = mpsc::channel();
        let feed = FeedController::new(ctx.category.clone(), ctx.filters.to_filters(ctx.page_size));
        let mut tabs = vec![CategorySelection::All];
        if ctx.category != CategorySelection::All {
            tabs.push(ctx.category.clone());
        }
        let tab = tabs.len() - 1;

        Self {
            api: ctx.api,
            runtime,
            feed,
            panel: ctx.filters,
            tabs,
            tab,
            selected: 0,
            theme: ctx.theme,
            web_url: ctx.web_url,
            screen: Screen::List,
            notice: None,
            tx,
            rx,
        }
    }

    fn palette(&self) -> Palette {
        self.theme.mode().palette()
    }

    fn location(&self) -> Url {
        Route::News {
            category: self.feed.category().clone(),
            filters: self.panel,
        }
        .to_url(&self.web_url)
    }

    fn load_categories(&self) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(Msg::Categories(api.categories().await));
        });
    }

    /// Starts the fetch the latest state change asked for.
    fn dispatch_pending(&mut self) {
        let Some(ticket) = self.feed.take_pending() else {
            return;
        };
        debug!(generation = ticket.generation, skip = ticket.query.skip, "fetching news page");
        let api = self.api.clone();
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let (ticket, outcome) = run_ticket(&api, ticket).await;
            let _ = tx.send(Msg::Page(ticket, outcome));
        });
    }

    fn drain_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                Msg::Page(ticket, outcome) => {
                    self.feed.apply(&ticket, outcome);
                    if self.selected >= self.feed.items().len() {
                        self.selected = self.feed.items().len().saturating_sub(1);
                    }
                }
                Msg::Categories(Ok(categories)) => self.merge_categories(categories),
                Msg::Categories(Err(e)) => {
                    warn!(error = %e, "failed to load categories");
                    self.notice = Some(format!("Categories unavailable: {}", e));
                }
                Msg::Detail(id, outcome) => {
                    if let Screen::Detail(view) = &mut self.screen {
                        if view.id == id {
                            match outcome {
                                Ok(detail) => view.set_detail(detail),
                                Err(e) => view.error = Some(e.to_string()),
                            }
                        }
                    }
                }
            }
        }
    }

    fn merge_categories(&mut self, categories: Vec<Category>) {
        let current = self.tabs[self.tab].clone();
        let mut tabs = vec![CategorySelection::All];
        tabs.extend(
            categories
                .into_iter()
                .map(|c| CategorySelection::Named(c.name)),
        );
        if !tabs.contains(&current) {
            tabs.push(current.clone());
        }
        self.tab = tabs.iter().position(|t| *t == current).unwrap_or(0);
        self.tabs = tabs;
    }

    fn switch_tab(&mut self, forward: bool) {
        let len = self.tabs.len();
        self.tab = if forward {
            (self.tab + 1) % len
        } else {
            (self.tab + len - 1) % len
        };
        self.selected = 0;
        self.feed.set_category(self.tabs[self.tab].clone());
    }

    fn open_selected(&mut self) {
        let Some(item) = self.feed.items().get(self.selected) else {
            return;
        };
        let id = item.id.clone();
        let api = self.api.clone();
        let tx = self.tx.clone();
        let fetch_id = id.clone();
        self.runtime.spawn(async move {
            let outcome = api.news_detail(&fetch_id).await;
            let _ = tx.send(Msg::Detail(fetch_id, outcome));
        });

        {
            let _guard = self.runtime.enter();
            self.api.record_view(&id);
        }

        self.screen = Screen::Detail(DetailView {
            id,
            detail: None,
            error: None,
            scroll: 0,
            content_lines: Vec::new(),
        });
    }

    /// Returns false when the browser should exit.
    fn handle_list_key(&mut self, code: KeyCode) -> bool {
        self.notice = None;
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected + 1 < self.feed.items().len() {
                    self.selected += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => self.switch_tab(true),
            KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => self.switch_tab(false),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.selected = 0;
                self.panel.step_score(1, &mut self.feed);
            }
            KeyCode::Char('-') => {
                self.selected = 0;
                self.panel.step_score(-1, &mut self.feed);
            }
            KeyCode::Char('d') => {
                self.selected = 0;
                self.panel.cycle_days(&mut self.feed);
            }
            KeyCode::Char('r') => {
                if !self.panel.is_default() {
                    self.selected = 0;
                    self.panel.reset(&mut self.feed);
                }
            }
            KeyCode::Char('R') => {
                self.selected = 0;
                self.feed.reload();
            }
            KeyCode::Char('m') => {
                if !self.feed.load_more() && !self.feed.has_more() {
                    self.notice = Some("No more news".to_string());
                }
            }
            KeyCode::Enter => self.open_selected(),
            KeyCode::Char('t') => {
                if let Err(e) = self.theme.toggle() {
                    warn!(error = %e, "failed to save theme");
                }
            }
            _ => {}
        }
        true
    }

    fn handle_detail_key(&mut self, code: KeyCode, viewport_height: u16) {
        let Screen::Detail(view) = &mut self.screen else {
            return;
        };
        let content_height = view.content_lines.len() as u16;
        let max_scroll = content_height.saturating_sub(viewport_height);

        match code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Backspace => {
                self.screen = Screen::List;
            }
            KeyCode::Char('o') => {
                if let Some(detail) = &view.detail {
                    open_in_browser(&detail.item.url);
                }
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if view.scroll < max_scroll {
                    view.scroll = view.scroll.saturating_add(1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                view.scroll = view.scroll.saturating_sub(1);
            }
            KeyCode::PageDown | KeyCode::Char(' ') => {
                view.scroll = view.scroll.saturating_add(viewport_height).min(max_scroll);
            }
            KeyCode::PageUp => {
                view.scroll = view.scroll.saturating_sub(viewport_height);
            }
            KeyCode::Char('g') | KeyCode::Home => {
                view.scroll = 0;
            }
            KeyCode::Char('G') | KeyCode::End => {
                view.scroll = max_scroll;
            }
            _ => {}
        }
    }
}

impl DetailView {
    fn set_detail(&mut self, detail: NewsDetail) {
        let mut full_content = String::new();
        full_content.push_str(&format!("Source: {}\n", detail.item.source));
        full_content.push_str(&format!(
            "Published: {}\n",
            format_absolute(detail.item.published_at)
        ));
        full_content.push_str(&format!(
            "Importance: {}\n",
            format_score(detail.item.importance_score)
        ));
        if !detail.item.categories.is_empty() {
            let names: Vec<&str> = detail.item.categories.iter().map(|c| c.name.as_str()).collect();
            full_content.push_str(&format!("Categories: {}\n", names.join(", ")));
        }
        full_content.push_str(&format!("Crawled: {}\n", format_optional(detail.crawled_at)));
        full_content.push_str(&format!("Link: {}\n", detail.item.url));

        if let Some(summary) = detail.item.summary.as_deref().filter(|s| !s.is_empty()) {
            full_content.push_str("\nSummary\n\n");
            for line in textwrap::wrap(summary, 80) {
                full_content.push_str(&line);
                full_content.push('\n');
            }
        }

        full_content.push_str("\n────────────────────────────────────────\n\n");
        if detail.content.is_empty() {
            full_content.push_str("No content available");
        } else {
            full_content.push_str(&html2text::from_read(detail.content.as_bytes(), 80));
        }

        self.content_lines = full_content.lines().map(String::from).collect();
        self.scroll = 0;
        self.error = None;
        self.detail = Some(detail);
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut BrowserApp,
) -> io::Result<()> {
    loop {
        app.drain_messages();
        app.dispatch_pending();
        terminal.draw(|f| ui(f, app))?;

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match app.screen {
                Screen::List => {
                    if !app.handle_list_key(key.code) {
                        return Ok(());
                    }
                }
                Screen::Detail(_) => {
                    // Account for header/footer
                    let viewport_height = terminal.size()?.height.saturating_sub(7);
                    app.handle_detail_key(key.code, viewport_height);
                }
            }
        }
    }
}

fn ui(f: &mut Frame, app: &BrowserApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Header
            Constraint::Min(10),   // Content
            Constraint::Length(3), // Footer
        ])
        .split(f.size());

    match &app.screen {
        Screen::List => {
            render_list_header(f, chunks[0], app);
            render_list(f, chunks[1], app);
            render_footer(f, chunks[2], app, LIST_KEYS);
        }
        Screen::Detail(view) => {
            render_detail_header(f, chunks[0], app, view);
            render_detail(f, chunks[1], app, view);
            render_footer(f, chunks[2], app, DETAIL_KEYS);
        }
    }
}

fn render_list_header(f: &mut Frame, area: Rect, app: &BrowserApp) {
    let palette = app.palette();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.border))
        .title(" newsdesk ")
        .title_alignment(Alignment::Center);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);

    let titles: Vec<String> = app.tabs.iter().map(|t| t.to_string()).collect();
    let tabs = Tabs::new(titles)
        .select(app.tab)
        .style(Style::default().fg(palette.muted))
        .highlight_style(
            Style::default()
                .fg(palette.highlight)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, rows[0]);

    let score = if app.panel.min_score() > 0.0 {
        format!("{}", app.panel.min_score())
    } else {
        "any".to_string()
    };
    let filters = Line::from(vec![
        Span::raw("Score ≥ "),
        Span::styled(score, Style::default().fg(palette.accent)),
        Span::raw("  Days: "),
        Span::styled(app.panel.days().to_string(), Style::default().fg(palette.accent)),
        Span::raw("  "),
        Span::styled(app.location().to_string(), Style::default().fg(palette.muted)),
    ]);
    f.render_widget(Paragraph::new(filters), rows[1]);
}

fn render_list(f: &mut Frame, area: Rect, app: &BrowserApp) {
    let palette = app.palette();
    let now = chrono::Utc::now();
    let title_width = area.width.saturating_sub(40) as usize;

    let mut items: Vec<ListItem> = app
        .feed
        .items()
        .iter()
        .map(|item| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:>7} ", format_score(item.importance_score)),
                    Style::default().fg(palette.accent),
                ),
                Span::styled(
                    truncate(&item.title, title_width),
                    Style::default().fg(palette.text),
                ),
                Span::styled(
                    format!("  {} · {}", item.source, format_relative(item.published_at, now)),
                    Style::default().fg(palette.muted),
                ),
            ]))
        })
        .collect();

    let footer_line = if app.feed.is_loading() {
        Some("Loading…".to_string())
    } else if app.feed.items().is_empty() && app.feed.error().is_none() {
        Some("No news for these filters".to_string())
    } else if app.feed.has_more() {
        Some("── m: load more ──".to_string())
    } else {
        None
    };
    if let Some(text) = footer_line {
        items.push(ListItem::new(Line::from(Span::styled(
            text,
            Style::default().fg(palette.muted),
        ))));
    }

    let title = match (app.feed.error(), app.notice.as_deref()) {
        (Some(error), _) => format!(" Error: {} (R to retry) ", error),
        (None, Some(notice)) => format!(" {} ", notice),
        (None, None) => format!(" {} stories ", app.feed.items().len()),
    };
    let title_style = if app.feed.error().is_some() {
        Style::default().fg(palette.error)
    } else {
        Style::default().fg(palette.muted)
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
                .border_style(Style::default().fg(palette.border))
                .title(Span::styled(title, title_style))
                .title_alignment(Alignment::Right),
        )
        .highlight_style(
            Style::default()
                .fg(palette.highlight)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.feed.items().is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn render_detail_header(f: &mut Frame, area: Rect, app: &BrowserApp, view: &DetailView) {
    let palette = app.palette();
    let (title, source) = match &view.detail {
        Some(detail) => (detail.item.title.clone(), detail.item.source.clone()),
        None => ("Loading…".to_string(), String::new()),
    };

    let header_text = vec![
        Line::from(vec![Span::styled(
            title,
            Style::default()
                .fg(palette.highlight)
                .add_modifier(Modifier::BOLD),
        )]),
        Line::from(vec![
            Span::raw("Source: "),
            Span::styled(source, Style::default().fg(palette.accent)),
        ]),
    ];

    let header = Paragraph::new(header_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.border))
                .title(" Article ")
                .title_alignment(Alignment::Center),
        )
        .alignment(Alignment::Left);

    f.render_widget(header, area);
}

fn render_detail(f: &mut Frame, area: Rect, app: &BrowserApp, view: &DetailView) {
    let palette = app.palette();

    if let Some(error) = &view.error {
        let paragraph = Paragraph::new(format!("Failed to load article: {}", error))
            .style(Style::default().fg(palette.error))
            .block(Block::default().borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM));
        f.render_widget(paragraph, area);
        return;
    }

    // Calculate visible range
    let viewport_height = area.height as usize;
    let start = view.scroll as usize;
    let end = (start + viewport_height).min(view.content_lines.len());

    let visible_lines: Vec<String> = if start < view.content_lines.len() {
        view.content_lines[start..end].to_vec()
    } else {
        vec![]
    };
    let content = visible_lines.join("\n");

    let scroll_indicator = if view.content_lines.len() > viewport_height {
        let current = view.scroll as usize + 1;
        let total = view.content_lines.len();
        format!(" [{}/{}] ", current, total)
    } else {
        String::new()
    };

    let paragraph = Paragraph::new(content)
        .style(Style::default().fg(palette.text))
        .block(
            Block::default()
                .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
                .border_style(Style::default().fg(palette.border))
                .title(scroll_indicator)
                .title_alignment(Alignment::Right),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(paragraph, area);
}

const LIST_KEYS: &[(&str, &str)] = &[
    ("q", "Quit"),
    ("j/k", "Move"),
    ("h/l", "Category"),
    ("+/-", "Score"),
    ("d", "Days"),
    ("r", "Reset"),
    ("m", "More"),
    ("⏎", "Open"),
    ("t", "Theme"),
];

const DETAIL_KEYS: &[(&str, &str)] = &[
    ("q", "Back"),
    ("o", "Open in Browser"),
    ("j/k", "Scroll"),
    ("g/G", "Top/Bottom"),
];

fn render_footer(f: &mut Frame, area: Rect, app: &BrowserApp, keys: &[(&str, &str)]) {
    let palette = app.palette();
    let spans: Vec<Span> = keys
        .iter()
        .flat_map(|(key, label)| {
            [
                Span::styled(
                    format!(" {} ", key),
                    Style::default().bg(palette.border).fg(palette.text),
                ),
                Span::raw(format!(" {}  ", label)),
            ]
        })
        .collect();

    let footer = Paragraph::new(Line::from(spans))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.border)),
        )
        .alignment(Alignment::Center);

    f.render_widget(footer, area);
}

/// Cuts `s` to `width` terminal columns, marking the cut with an ellipsis.
fn truncate(s: &str, width: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width.saturating_sub(1) {
            out.push('…');
            return out;
        }
        used += w;
        out.push(c);
    }
    out
}

fn open_in_browser(url: &str) {
    let open_cmd = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "linux") {
        "xdg-open"
    } else {
        return;
    };

    if let Err(e) = std::process::Command::new(open_cmd).arg(url).spawn() {
        warn!(error = %e, "failed to open browser");
    }
}
