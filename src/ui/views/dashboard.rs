use crate::api::endpoints::{self, BookFilters};
use crate::api::types::{Book, Borrow, ListResponse, UserStats};
use crate::cache::Subscription;
use crate::derive::{genre_label, popular_books, DashboardStats, POPULAR_LIMIT};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{titled, BookDetailView};
use crate::ui::AppContext;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Books requested for the popular list
const DASHBOARD_PAGE_SIZE: u32 = 10;

/// Landing view: stats, most read books and favorite genres
pub struct DashboardView {
  ctx: AppContext,
  books: Subscription<ListResponse<Book>>,
  stats: Subscription<UserStats>,
  borrows: Subscription<ListResponse<Borrow>>,
  list_state: ListState,
}

impl DashboardView {
  pub fn new(ctx: AppContext) -> Self {
    let filters = BookFilters {
      page_size: Some(DASHBOARD_PAGE_SIZE),
      ..Default::default()
    };
    let books = ctx.cache.subscribe(endpoints::books(&filters));
    let stats = ctx.cache.subscribe(endpoints::user_stats());
    let borrows = ctx
      .cache
      .subscribe(endpoints::active_borrows(ctx.borrow_page_size));

    Self {
      ctx,
      books,
      stats,
      borrows,
      list_state: ListState::default(),
    }
  }

  fn popular(&self) -> Vec<&Book> {
    self
      .books
      .data()
      .map(|b| popular_books(b.items(), POPULAR_LIMIT))
      .unwrap_or_default()
  }

  fn render_stats(&self, frame: &mut Frame, area: Rect) {
    let stats = DashboardStats::new(self.books.data(), self.stats.data());
    let welcome = match self.ctx.user.as_ref() {
      Some(user) => format!("Welcome back, {}!", user.display_name()),
      None => "Welcome to the library".to_string(),
    };

    let figures = [
      ("Library books", stats.library_books),
      ("Total read", stats.total_read),
      ("Reviews written", stats.reviews_written),
      ("Currently borrowed", stats.currently_borrowed),
    ];
    let mut spans = Vec::new();
    for (label, value) in figures {
      spans.push(Span::styled(
        format!("{} ", value),
        Style::default().fg(Color::Yellow).bold(),
      ));
      spans.push(Span::styled(
        format!("{}   ", label),
        Style::default().fg(Color::DarkGray),
      ));
    }

    let block = Block::default()
      .title(titled("Dashboard", &self.stats, None))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let lines = vec![
      Line::styled(welcome, Style::default().fg(Color::White).bold()),
      Line::from(spans),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
  }

  fn render_popular(&mut self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = self
      .popular()
      .into_iter()
      .map(|book| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<32}", truncate(&book.title, 32)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::styled(
            format!("{:<20}", truncate(&book.author, 20)),
            Style::default().fg(Color::White),
          ),
          Span::styled(
            format!(" {} · read {}", genre_label(book), book.read_count),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();
    let len = items.len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(titled("Most popular", &self.books, None))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let message = if self.books.is_error() {
        "Failed to load books. Press 'r' to retry."
      } else if self.books.is_loading() {
        "Loading..."
      } else {
        "No books in the library yet."
      };
      let paragraph = Paragraph::new(message)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn render_side(&self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
      .split(area);

    let genres: Vec<Line> = match self.stats.data() {
      Some(stats) if !stats.favorite_genres.is_empty() => stats
        .favorite_genres
        .iter()
        .map(|g| {
          Line::from(vec![
            Span::styled(format!("{:<20}", g.name), Style::default().fg(Color::White)),
            Span::styled(format!("{} books", g.count), Style::default().fg(Color::DarkGray)),
          ])
        })
        .collect(),
      _ => vec![Line::styled(
        "Borrow a few books to see your favorites.",
        Style::default().fg(Color::DarkGray),
      )],
    };
    let block = Block::default()
      .title(" Favorite genres ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    frame.render_widget(Paragraph::new(genres).block(block), chunks[0]);

    let borrowed: Vec<Line> = match self.borrows.data() {
      Some(borrows) if !borrows.items().is_empty() => borrows
        .items()
        .iter()
        .map(|b| Line::raw(truncate(&b.book.title, 40)))
        .collect(),
      _ => vec![Line::styled(
        "Nothing borrowed right now.",
        Style::default().fg(Color::DarkGray),
      )],
    };
    let block = Block::default()
      .title(titled("Reading now", &self.borrows, None))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    frame.render_widget(Paragraph::new(borrowed).block(block), chunks[1]);
  }
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => {
        self.books.refetch();
        self.stats.refetch();
        self.borrows.refetch();
      }
      KeyCode::Enter => {
        let selected = self.list_state.selected();
        if let Some(book) = selected.and_then(|i| self.popular().get(i).copied()) {
          return ViewAction::Push(Box::new(BookDetailView::new(self.ctx.clone(), book.id)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(4), Constraint::Min(3)])
      .split(area);
    self.render_stats(frame, chunks[0]);

    let columns = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
      .split(chunks[1]);
    self.render_popular(frame, columns[0]);
    self.render_side(frame, columns[1]);
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.books.poll();
    self.stats.poll();
    self.borrows.poll();
    ViewAction::None
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("Enter", "open").with_priority(20),
      Shortcut::new("r", "refresh").with_priority(30),
      Shortcut::new("q", "quit").with_priority(90),
    ]
  }
}
