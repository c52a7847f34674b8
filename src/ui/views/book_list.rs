use crate::api::endpoints::{self, BookFilters};
use crate::api::types::{Book, Borrow, Genre, ListResponse};
use crate::cache::Subscription;
use crate::derive::genre_label;
use crate::mutation::{MutationArgs, DELETE_BOOK};
use crate::ui::components::{KeyResult, MutationSlot, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{availability_color, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{
  borrow_action, held_book_ids, titled, toggle_borrow, BookDetailView, BookFormView, ConfirmDelete,
};
use crate::ui::AppContext;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Catalog with search, availability and genre filters
pub struct BookListView {
  ctx: AppContext,
  filters: BookFilters,
  books: Subscription<ListResponse<Book>>,
  borrows: Subscription<ListResponse<Borrow>>,
  genres: Subscription<ListResponse<Genre>>,
  list_state: ListState,
  search: SearchInput,
  status: MutationSlot,
  confirm: ConfirmDelete,
}

impl BookListView {
  pub fn new(ctx: AppContext) -> Self {
    let filters = BookFilters::default();
    let books = ctx.cache.subscribe(endpoints::books(&filters));
    let borrows = ctx
      .cache
      .subscribe(endpoints::active_borrows(ctx.borrow_page_size));
    let genres = ctx.cache.subscribe(endpoints::genres());

    Self {
      ctx,
      filters,
      books,
      borrows,
      genres,
      list_state: ListState::default(),
      search: SearchInput::new(),
      status: MutationSlot::new(),
      confirm: ConfirmDelete::default(),
    }
  }

  fn books(&self) -> &[Book] {
    self.books.data().map(|b| b.items()).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Book> {
    self.list_state.selected().and_then(|i| self.books().get(i))
  }

  /// Swap the catalog subscription for one matching the current filters.
  fn apply_filters(&mut self) {
    self.books = self.ctx.cache.subscribe(endpoints::books(&self.filters));
    self.list_state.select(Some(0));
    self.confirm.reset();
  }

  /// No genre, then each genre in turn.
  fn cycle_genre(&mut self) {
    let names: Vec<String> = self
      .genres
      .data()
      .map(|g| g.items().iter().map(|g| g.name.clone()).collect())
      .unwrap_or_default();
    if names.is_empty() {
      self.status.set_error("No genres loaded");
      return;
    }
    let position = self
      .filters
      .genre
      .as_ref()
      .and_then(|current| names.iter().position(|n| n == current));
    self.filters.genre = match position {
      None => names.first().cloned(),
      Some(i) => names.get(i + 1).cloned(),
    };
    self.apply_filters();
  }

  fn toggle_borrow(&mut self) {
    let held = held_book_ids(&self.borrows);
    let Some(book) = self.list_state.selected().and_then(|i| self.books.data()?.items().get(i)) else {
      return;
    };
    toggle_borrow(&self.ctx, &mut self.status, book, &held);
  }

  fn delete_selected(&mut self) {
    let Some((id, title)) = self.selected().map(|b| (b.id, b.title.clone())) else {
      return;
    };
    if self.confirm.press(id) {
      self
        .status
        .start(self.ctx.mutations.submit(&DELETE_BOOK, MutationArgs::id(id)));
    } else {
      self
        .status
        .set_error(format!("Press d again to delete \"{}\"", title));
    }
  }

  fn filter_summary(&self) -> String {
    let mut parts = Vec::new();
    if !self.filters.search.is_empty() {
      parts.push(format!("search: {}", self.filters.search));
    }
    parts.push(format!("showing: {}", self.filters.availability.label()));
    parts.push(format!(
      "genre: {}",
      self.filters.genre.as_deref().unwrap_or("all")
    ));
    parts.join("  ")
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.books().len();
    ensure_valid_selection(&mut self.list_state, len);

    let total = self.books.data().map(|b| b.total() as usize);
    let block = Block::default()
      .title(titled("Books", &self.books, total))
      .title_alignment(Alignment::Center)
      .title_bottom(Line::styled(
        format!(" {} ", self.filter_summary()),
        Style::default().fg(Color::DarkGray),
      ))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.books().is_empty() {
      let content = if self.books.is_error() {
        "Failed to load books. Press 'r' to retry."
      } else if self.books.is_loading() {
        "Loading..."
      } else if self.filters.is_empty() {
        "No books in the library yet."
      } else {
        "No books match these filters."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let held = held_book_ids(&self.borrows);
    let items: Vec<ListItem> = self
      .books()
      .iter()
      .map(|book| {
        let action = borrow_action(book, &held);
        let availability = if book.available { "available" } else { "borrowed" };
        let line = Line::from(vec![
          Span::styled(
            format!("{:<36}", truncate(&book.title, 36)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::raw(format!("{:<22}", truncate(&book.author, 22))),
          Span::raw(" "),
          Span::styled(
            format!("{:<16}", truncate(genre_label(book), 16)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::styled(
            format!("{:<10}", availability),
            Style::default().fg(availability_color(book.available)),
          ),
          Span::styled(action.label(), Style::default().fg(Color::DarkGray)),
        ]);
        ListItem::new(line)
      })
      .collect();

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
}

impl View for BookListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    // Let search component try to handle first
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Submitted(query)) => {
        self.filters.search = query;
        self.apply_filters();
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Cleared) => {
        if !self.filters.search.is_empty() {
          self.filters.search.clear();
          self.apply_filters();
        }
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    if key.code != KeyCode::Char('d') {
      self.confirm.reset();
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('a') => {
        self.filters.availability = self.filters.availability.next();
        self.apply_filters();
      }
      KeyCode::Char('g') => self.cycle_genre(),
      KeyCode::Char('b') => self.toggle_borrow(),
      KeyCode::Char('r') => {
        self.books.refetch();
        self.borrows.refetch();
      }
      KeyCode::Enter => {
        if let Some(book) = self.selected() {
          return ViewAction::Push(Box::new(BookDetailView::new(self.ctx.clone(), book.id)));
        }
      }
      KeyCode::Char('n') if self.ctx.is_admin() => {
        return ViewAction::Push(Box::new(BookFormView::create(self.ctx.clone())));
      }
      KeyCode::Char('e') if self.ctx.is_admin() => {
        if let Some(book) = self.selected() {
          return ViewAction::Push(Box::new(BookFormView::edit(self.ctx.clone(), book)));
        }
      }
      KeyCode::Char('d') if self.ctx.is_admin() => self.delete_selected(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(3), Constraint::Length(1)])
      .split(area);
    self.render_list(frame, chunks[0]);
    self.status.render(frame, chunks[1]);
    // Let search component render its overlay
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    if self.filters.search.is_empty() {
      "Books".to_string()
    } else {
      format!("Books [{}]", self.filters.search)
    }
  }

  fn tick(&mut self) -> ViewAction {
    self.books.poll();
    self.borrows.poll();
    self.genres.poll();
    self.status.poll();
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    let mut shortcuts = vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("/", "search").with_priority(20),
      Shortcut::new("a", "availability").with_priority(30),
      Shortcut::new("g", "genre").with_priority(31),
      Shortcut::new("b", "borrow/return").with_priority(40),
      Shortcut::new("q", "back").with_priority(90),
    ];
    if self.ctx.is_admin() {
      shortcuts.push(Shortcut::new("n", "new").with_priority(50));
      shortcuts.push(Shortcut::new("e", "edit").with_priority(51));
      shortcuts.push(Shortcut::new("d", "delete").with_priority(52));
    }
    shortcuts
  }
}
