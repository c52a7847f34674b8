use crate::api::endpoints;
use crate::api::types::{Borrow, ListResponse};
use crate::cache::Subscription;
use crate::derive::{due_date, is_overdue};
use crate::mutation::{MutationArgs, RETURN_BOOK};
use crate::ui::components::MutationSlot;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_date, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{titled, BookDetailView};
use crate::ui::AppContext;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// The user's borrows, active or the full history
pub struct BorrowedView {
  ctx: AppContext,
  active: Subscription<ListResponse<Borrow>>,
  /// Subscribed only while shown
  history: Option<Subscription<ListResponse<Borrow>>>,
  list_state: ListState,
  status: MutationSlot,
}

impl BorrowedView {
  pub fn new(ctx: AppContext) -> Self {
    let active = ctx
      .cache
      .subscribe(endpoints::active_borrows(ctx.borrow_page_size));
    Self {
      ctx,
      active,
      history: None,
      list_state: ListState::default(),
      status: MutationSlot::new(),
    }
  }

  fn shown(&self) -> &Subscription<ListResponse<Borrow>> {
    self.history.as_ref().unwrap_or(&self.active)
  }

  fn borrows(&self) -> &[Borrow] {
    self.shown().data().map(|b| b.items()).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Borrow> {
    self.list_state.selected().and_then(|i| self.borrows().get(i))
  }

  fn toggle_history(&mut self) {
    self.history = match self.history.take() {
      Some(_) => None,
      None => Some(self.ctx.cache.subscribe(endpoints::borrow_history())),
    };
    self.list_state.select(Some(0));
  }

  fn return_selected(&mut self) {
    let Some(borrow) = self.selected() else {
      return;
    };
    if borrow.returned {
      let message = format!("\"{}\" was already returned", borrow.book.title);
      self.status.set_error(message);
      return;
    }
    let pending = self
      .ctx
      .mutations
      .submit(&RETURN_BOOK, MutationArgs::id(borrow.book.id));
    self.status.start(pending);
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.borrows().len();
    ensure_valid_selection(&mut self.list_state, len);

    let label = if self.history.is_some() {
      "Borrow history"
    } else {
      "Borrowed books"
    };
    let block = Block::default()
      .title(titled(label, self.shown(), Some(len)))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = if self.shown().is_error() {
        "Failed to load borrows. Press 'r' to retry."
      } else if self.shown().is_loading() {
        "Loading..."
      } else if self.history.is_some() {
        "You have not borrowed any books yet."
      } else {
        "You have no borrowed books. Find one with :books"
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let now = Utc::now();
    let items: Vec<ListItem> = self
      .borrows()
      .iter()
      .map(|borrow| {
        let state = match borrow.returned_on {
          Some(returned) => Span::styled(
            format!("returned {}", format_date(returned)),
            Style::default().fg(Color::DarkGray),
          ),
          None if borrow.returned => {
            Span::styled("returned", Style::default().fg(Color::DarkGray))
          }
          None if is_overdue(borrow.borrowed_on, now) => Span::styled(
            format!("overdue since {}", format_date(due_date(borrow.borrowed_on))),
            Style::default().fg(Color::Red).bold(),
          ),
          None => Span::styled(
            format!("due {}", format_date(due_date(borrow.borrowed_on))),
            Style::default().fg(Color::Yellow),
          ),
        };
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<36}", truncate(&borrow.book.title, 36)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(format!("{:<22}", truncate(&borrow.book.author, 22))),
          Span::styled(
            format!("borrowed {}  ", format_date(borrow.borrowed_on)),
            Style::default().fg(Color::DarkGray),
          ),
          state,
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

impl View for BorrowedView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('x') => self.return_selected(),
      KeyCode::Char('h') => self.toggle_history(),
      KeyCode::Char('r') => {
        self.active.refetch();
        if let Some(history) = self.history.as_mut() {
          history.refetch();
        }
      }
      KeyCode::Enter => {
        if let Some(borrow) = self.selected() {
          return ViewAction::Push(Box::new(BookDetailView::new(
            self.ctx.clone(),
            borrow.book.id,
          )));
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
      .constraints([Constraint::Min(3), Constraint::Length(1)])
      .split(area);
    self.render_list(frame, chunks[0]);
    self.status.render(frame, chunks[1]);
  }

  fn breadcrumb_label(&self) -> String {
    if self.history.is_some() {
      "History".to_string()
    } else {
      "Borrowed".to_string()
    }
  }

  fn tick(&mut self) -> ViewAction {
    self.active.poll();
    if let Some(history) = self.history.as_mut() {
      history.poll();
    }
    self.status.poll();
    ViewAction::None
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("x", "return").with_priority(20),
      Shortcut::new("h", "history").with_priority(30),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}
