use crate::api::endpoints;
use crate::api::types::{Book, Borrow, ListResponse, Recommendations, UserStats};
use crate::cache::Subscription;
use crate::derive::genre_label;
use crate::ui::components::MutationSlot;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{availability_color, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{borrow_action, held_book_ids, titled, toggle_borrow, BookDetailView};
use crate::ui::AppContext;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

/// Books suggested from the user's reading history
pub struct RecommendationsView {
  ctx: AppContext,
  recommendations: Subscription<Recommendations>,
  stats: Subscription<UserStats>,
  borrows: Subscription<ListResponse<Borrow>>,
  list_state: ListState,
  status: MutationSlot,
}

impl RecommendationsView {
  pub fn new(ctx: AppContext) -> Self {
    let recommendations = ctx.cache.subscribe(endpoints::recommendations());
    let stats = ctx.cache.subscribe(endpoints::user_stats());
    let borrows = ctx
      .cache
      .subscribe(endpoints::active_borrows(ctx.borrow_page_size));
    Self {
      ctx,
      recommendations,
      stats,
      borrows,
      list_state: ListState::default(),
      status: MutationSlot::new(),
    }
  }

  fn books(&self) -> &[Book] {
    self
      .recommendations
      .data()
      .map(|r| r.books.as_slice())
      .unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Book> {
    self.list_state.selected().and_then(|i| self.books().get(i))
  }

  fn render_summary(&self, frame: &mut Frame, area: Rect) {
    let mut lines = Vec::new();
    if let Some(message) = self.recommendations.data().and_then(|r| r.message.as_deref()) {
      lines.push(Line::styled(message.to_string(), Style::default().fg(Color::White)));
    }
    let genres: Vec<String> = self
      .stats
      .data()
      .map(|s| {
        s.favorite_genres
          .iter()
          .map(|g| format!("{} ({})", g.name, g.count))
          .collect()
      })
      .unwrap_or_default();
    if !genres.is_empty() {
      lines.push(Line::from(vec![
        Span::styled("Favorite genres: ", Style::default().fg(Color::DarkGray)),
        Span::styled(genres.join(", "), Style::default().fg(Color::Yellow)),
      ]));
    }

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    frame.render_widget(
      Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
      area,
    );
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.books().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(titled("Recommended for you", &self.recommendations, Some(len)))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = if self.recommendations.is_error() {
        "Failed to load recommendations. Press 'r' to retry."
      } else if self.recommendations.is_loading() {
        "Loading..."
      } else {
        "No recommendations yet. Borrow and review books to get some."
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
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<36}", truncate(&book.title, 36)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(format!("{:<22}", truncate(&book.author, 22))),
          Span::styled(
            format!("{:<16}", truncate(genre_label(book), 16)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::styled(
            borrow_action(book, &held).label(),
            Style::default().fg(availability_color(book.available)),
          ),
        ]))
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

impl View for RecommendationsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('b') => {
        let held = held_book_ids(&self.borrows);
        let selected = self.list_state.selected();
        if let Some(book) = selected.and_then(|i| self.recommendations.data()?.books.get(i)) {
          toggle_borrow(&self.ctx, &mut self.status, book, &held);
        }
      }
      KeyCode::Char('r') => {
        self.recommendations.refetch();
        self.stats.refetch();
      }
      KeyCode::Enter => {
        if let Some(book) = self.selected() {
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
      .constraints([
        Constraint::Length(4),
        Constraint::Min(3),
        Constraint::Length(1),
      ])
      .split(area);
    self.render_summary(frame, chunks[0]);
    self.render_list(frame, chunks[1]);
    self.status.render(frame, chunks[2]);
  }

  fn breadcrumb_label(&self) -> String {
    "Recommendations".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.recommendations.poll();
    self.stats.poll();
    self.borrows.poll();
    self.status.poll();
    ViewAction::None
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("b", "borrow/return").with_priority(20),
      Shortcut::new("Enter", "open").with_priority(30),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Verb;
  use crate::cache::testing::{settle, FakeTransport};
  use crate::ui::views::test_support::{context, library};
  use crossterm::event::KeyModifiers;
  use serde_json::json;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[tokio::test]
  async fn test_borrow_from_recommendations_invalidates_them() {
    let transport = FakeTransport::new();
    library(&transport);
    transport.respond(
      Verb::Get,
      "books/recommendations/",
      Ok(json!({"message": "Based on your favorite genres",
        "books": [{"id": 5, "title": "Foundation", "available": true}]})),
    );
    transport.respond(Verb::Post, "books/5/borrow/", Ok(json!({"id": 12})));
    let ctx = context(&transport, false);
    let mut view = RecommendationsView::new(ctx.clone());
    settle().await;
    ctx.cache.poll();
    view.tick();
    let len = view.books().len();
    ensure_valid_selection(&mut view.list_state, len);

    view.handle_key(key(KeyCode::Char('b')));
    settle().await;
    view.tick();
    assert_eq!(transport.count(Verb::Post, "books/5/borrow/"), 1);
    assert!(ctx
      .cache
      .get(&endpoints::recommendations())
      .is_some_and(|e| e.stale));
  }
}
