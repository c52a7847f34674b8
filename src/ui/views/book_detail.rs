use crate::api::endpoints;
use crate::api::types::{Book, Borrow, ListResponse, Review};
use crate::cache::Subscription;
use crate::derive::{genre_label, has_reviewed, rating_stars};
use crate::error::ApiError;
use crate::forms::{ReviewForm, DEFAULT_RATING};
use crate::mutation::{MutationArgs, CREATE_REVIEW};
use crate::ui::components::{FormEvent, FormPanel, KeyResult, MutationSlot};
use crate::ui::renderfns::{availability_color, format_date};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{borrow_action, held_book_ids, titled, toggle_borrow};
use crate::ui::AppContext;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// One book with its reviews
pub struct BookDetailView {
  ctx: AppContext,
  book_id: u64,
  book: Subscription<Book>,
  reviews: Subscription<ListResponse<Review>>,
  borrows: Subscription<ListResponse<Borrow>>,
  review_form: FormPanel,
  /// The slot holds a review submission, close the form when it succeeds
  closes_form: bool,
  status: MutationSlot,
  scroll: u16,
}

impl BookDetailView {
  pub fn new(ctx: AppContext, book_id: u64) -> Self {
    let book = ctx.cache.subscribe(endpoints::book(book_id));
    let reviews = ctx.cache.subscribe(endpoints::reviews(book_id));
    let borrows = ctx
      .cache
      .subscribe(endpoints::active_borrows(ctx.borrow_page_size));

    Self {
      ctx,
      book_id,
      book,
      reviews,
      borrows,
      review_form: FormPanel::new(),
      closes_form: false,
      status: MutationSlot::new(),
      scroll: 0,
    }
  }

  fn reviews(&self) -> &[Review] {
    self.reviews.data().map(|r| r.items()).unwrap_or(&[])
  }

  fn already_reviewed(&self) -> bool {
    self
      .ctx
      .username()
      .is_some_and(|name| has_reviewed(self.reviews(), name))
  }

  fn open_review_form(&mut self) {
    if self.already_reviewed() {
      self.status.set_info("You have already reviewed this book");
      return;
    }
    let title = match self.book.data() {
      Some(book) => format!("Review \"{}\"", book.title),
      None => "Review".to_string(),
    };
    let rating = DEFAULT_RATING.to_string();
    self
      .review_form
      .show(title, &[("Rating (1-5)", rating.as_str()), ("Comment", "")]);
    self.review_form.set_hint("Rating as a number or stars, e.g. 4 or ****");
  }

  fn submit_review(&mut self, values: &[String]) {
    match self.review_payload(values) {
      Ok(body) => {
        self.review_form.set_busy();
        self
          .status
          .start(self.ctx.mutations.submit(&CREATE_REVIEW, MutationArgs::body(body)));
        self.closes_form = true;
      }
      Err(err) => self.review_form.set_error(err.user_message()),
    }
  }

  fn review_payload(&self, values: &[String]) -> Result<serde_json::Value, ApiError> {
    let rating = ReviewForm::parse_rating(values.first().map(String::as_str).unwrap_or(""))?;
    let form = ReviewForm {
      book: self.book_id,
      rating,
      comment: values.get(1).cloned().unwrap_or_default(),
    };
    form.payload()
  }

  fn toggle_borrow(&mut self) {
    let Some(book) = self.book.data() else {
      return;
    };
    let held = held_book_ids(&self.borrows);
    self.closes_form = false;
    toggle_borrow(&self.ctx, &mut self.status, book, &held);
  }

  fn render_book(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(titled("Book", &self.book, None))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let Some(book) = self.book.data() else {
      let message = match self.book.error() {
        Some(err) => format!("Error: {}\n\nPress 'r' to retry.", err.user_message()),
        None => "Loading book...".to_string(),
      };
      frame.render_widget(
        Paragraph::new(message)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    };

    let held = held_book_ids(&self.borrows);
    let action = borrow_action(book, &held);
    let availability = if book.available { "Available" } else { "Borrowed" };
    let rating = match book.average_rating {
      Some(rating) => format!("{} {:.1}", rating_stars(rating), rating),
      None => "No ratings yet".to_string(),
    };

    let label = |text: &'static str| Span::styled(format!("{:<10}", text), Style::default().fg(Color::DarkGray));
    let mut lines = vec![
      Line::styled(book.title.clone(), Style::default().fg(Color::Cyan).bold()),
      Line::raw(""),
      Line::from(vec![label("Author"), Span::raw(book.author.clone())]),
      Line::from(vec![label("Genre"), Span::raw(genre_label(book).to_string())]),
      Line::from(vec![
        label("Status"),
        Span::styled(availability, Style::default().fg(availability_color(book.available))),
        Span::styled(
          format!("  [b] {}", action.label()),
          Style::default().fg(Color::DarkGray),
        ),
      ]),
      Line::from(vec![label("Rating"), Span::styled(rating, Style::default().fg(Color::Yellow))]),
      Line::from(vec![label("Read"), Span::raw(format!("{} times", book.read_count))]),
    ];
    if let Some(description) = book.description.as_deref().filter(|d| !d.trim().is_empty()) {
      lines.push(Line::raw(""));
      lines.push(Line::raw(description.to_string()));
    }

    frame.render_widget(
      Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
      area,
    );
  }

  fn render_reviews(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(titled("Reviews", &self.reviews, Some(self.reviews().len())))
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.reviews().is_empty() {
      let message = if self.already_reviewed() || self.ctx.user.is_none() {
        "No reviews yet."
      } else {
        "No reviews yet. Press 'a' to write the first one."
      };
      frame.render_widget(
        Paragraph::new(message)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    }

    let mut lines = Vec::new();
    for review in self.reviews() {
      let mut header = vec![
        Span::styled(
          rating_stars(f64::from(review.rating)),
          Style::default().fg(Color::Yellow),
        ),
        Span::raw(" "),
        Span::styled(review.user.clone(), Style::default().fg(Color::Cyan)),
      ];
      if let Some(created) = review.created_at {
        header.push(Span::styled(
          format!("  {}", format_date(created)),
          Style::default().fg(Color::DarkGray),
        ));
      }
      lines.push(Line::from(header));
      if !review.comment.is_empty() {
        lines.push(Line::raw(format!("  {}", review.comment)));
      }
      lines.push(Line::raw(""));
    }

    frame.render_widget(
      Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((self.scroll, 0)),
      area,
    );
  }
}

impl View for BookDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.review_form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(values)) => {
        self.submit_review(&values);
        return ViewAction::None;
      }
      KeyResult::Event(FormEvent::Cancelled) => {
        self.closes_form = false;
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('a') => self.open_review_form(),
      KeyCode::Char('b') => self.toggle_borrow(),
      KeyCode::Char('r') => {
        self.book.refetch();
        self.reviews.refetch();
        self.borrows.refetch();
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
        Constraint::Percentage(45),
        Constraint::Min(3),
        Constraint::Length(1),
      ])
      .split(area);

    self.render_book(frame, chunks[0]);
    self.render_reviews(frame, chunks[1]);
    self.status.render(frame, chunks[2]);
    self.review_form.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match self.book.data() {
      Some(book) => book.title.clone(),
      None => format!("Book {}", self.book_id),
    }
  }

  fn tick(&mut self) -> ViewAction {
    self.book.poll();
    self.reviews.poll();
    self.borrows.poll();

    if let Some(outcome) = self.status.poll() {
      if self.closes_form {
        match outcome {
          Ok(_) => self.review_form.hide(),
          Err(err) => self.review_form.set_error(err.user_message()),
        }
        self.closes_form = false;
      }
    }
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.review_form.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    let mut shortcuts = vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("b", "borrow/return").with_priority(20),
      Shortcut::new("r", "refresh").with_priority(40),
      Shortcut::new("q", "back").with_priority(90),
    ];
    if !self.already_reviewed() {
      shortcuts.push(Shortcut::new("a", "review").with_priority(30));
    }
    shortcuts
  }
}
