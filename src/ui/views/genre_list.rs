use crate::api::endpoints;
use crate::api::types::{Genre, ListResponse};
use crate::cache::Subscription;
use crate::error::ApiError;
use crate::forms::GenreForm;
use crate::mutation::{MutationArgs, CREATE_GENRE, DELETE_GENRE, UPDATE_GENRE};
use crate::ui::components::{FormEvent, FormPanel, KeyResult, MutationSlot};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::format_date;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{titled, ConfirmDelete};
use crate::ui::AppContext;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Genre administration
pub struct GenreListView {
  ctx: AppContext,
  genres: Subscription<ListResponse<Genre>>,
  list_state: ListState,
  form: FormPanel,
  /// Genre being renamed while the form is open
  renaming: Option<u64>,
  /// The slot holds a form submission
  closes_form: bool,
  status: MutationSlot,
  confirm: ConfirmDelete,
}

impl GenreListView {
  pub fn new(ctx: AppContext) -> Self {
    let genres = ctx.cache.subscribe(endpoints::genres());
    Self {
      ctx,
      genres,
      list_state: ListState::default(),
      form: FormPanel::new(),
      renaming: None,
      closes_form: false,
      status: MutationSlot::new(),
      confirm: ConfirmDelete::default(),
    }
  }

  fn genres(&self) -> &[Genre] {
    self.genres.data().map(|g| g.items()).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Genre> {
    self.list_state.selected().and_then(|i| self.genres().get(i))
  }

  fn open_form(&mut self, renaming: Option<&Genre>) {
    self.renaming = renaming.map(|g| g.id);
    match renaming {
      Some(genre) => {
        let title = format!("Rename \"{}\"", genre.name);
        let name = genre.name.clone();
        self.form.show(title, &[("Name", name.as_str())]);
      }
      None => self.form.show("New genre", &[("Name", "")]),
    }
  }

  fn submit(&mut self, values: Vec<String>) {
    let form = GenreForm {
      name: values.into_iter().next().unwrap_or_default(),
    };
    match self.send(&form) {
      Ok(()) => {
        self.form.set_busy();
        self.closes_form = true;
      }
      Err(err) => self.form.set_error(err.user_message()),
    }
  }

  fn send(&mut self, form: &GenreForm) -> Result<(), ApiError> {
    let body = form.payload()?;
    let pending = match self.renaming {
      Some(id) => self
        .ctx
        .mutations
        .submit(&UPDATE_GENRE, MutationArgs::id(id).with_body(body)),
      None => self.ctx.mutations.submit(&CREATE_GENRE, MutationArgs::body(body)),
    };
    self.status.start(pending);
    Ok(())
  }

  fn delete_selected(&mut self) {
    let Some((id, name)) = self.selected().map(|g| (g.id, g.name.clone())) else {
      return;
    };
    if self.confirm.press(id) {
      self.closes_form = false;
      self
        .status
        .start(self.ctx.mutations.submit(&DELETE_GENRE, MutationArgs::id(id)));
    } else {
      self
        .status
        .set_error(format!("Press d again to delete \"{}\"", name));
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.genres().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(titled("Genres", &self.genres, Some(len)))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = if self.genres.is_error() {
        "Failed to load genres. Press 'r' to retry."
      } else if self.genres.is_loading() {
        "Loading..."
      } else {
        "No genres yet. Press 'n' to add one, or run :seed for sample data."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .genres()
      .iter()
      .map(|genre| {
        let created = genre.created_at.map(format_date).unwrap_or_default();
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<30}", genre.name), Style::default().fg(Color::Cyan)),
          Span::styled(created, Style::default().fg(Color::DarkGray)),
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

impl View for GenreListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(values)) => {
        self.submit(values);
        return ViewAction::None;
      }
      KeyResult::Event(FormEvent::Cancelled) => {
        self.closes_form = false;
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
      KeyCode::Char('n') => self.open_form(None),
      KeyCode::Char('e') => {
        let selected = self.selected().cloned();
        if let Some(genre) = selected {
          self.open_form(Some(&genre));
        }
      }
      KeyCode::Char('d') => self.delete_selected(),
      KeyCode::Char('r') => self.genres.refetch(),
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
    self.form.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Genres".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.genres.poll();
    if let Some(outcome) = self.status.poll() {
      if self.closes_form {
        match outcome {
          Ok(_) => self.form.hide(),
          Err(err) => self.form.set_error(err.user_message()),
        }
        self.closes_form = false;
      }
    }
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.form.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("n", "new").with_priority(20),
      Shortcut::new("e", "rename").with_priority(21),
      Shortcut::new("d", "delete").with_priority(22),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Verb;
  use crate::cache::testing::{settle, FakeTransport};
  use crate::ui::views::test_support::context;
  use crossterm::event::KeyModifiers;
  use serde_json::json;
  use std::sync::Arc;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  async fn loaded(transport: &Arc<FakeTransport>) -> (AppContext, GenreListView) {
    transport.respond(
      Verb::Get,
      "genres/",
      Ok(json!([{"id": 1, "name": "Fiction", "created_at": "2024-02-01T08:00:00Z"}])),
    );
    let ctx = context(transport, true);
    let mut view = GenreListView::new(ctx.clone());
    settle().await;
    ctx.cache.poll();
    view.tick();
    let len = view.genres().len();
    ensure_valid_selection(&mut view.list_state, len);
    (ctx, view)
  }

  #[tokio::test]
  async fn test_duplicate_name_error_shown_in_form() {
    let transport = FakeTransport::new();
    transport.respond(
      Verb::Post,
      "genres/",
      Err(ApiError::server(400, r#"{"name": ["genre with this name already exists."]}"#)),
    );
    let (_ctx, mut view) = loaded(&transport).await;

    view.handle_key(key(KeyCode::Char('n')));
    for c in "Fiction".chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
    view.handle_key(key(KeyCode::Enter));
    settle().await;
    view.tick();

    assert!(view.captures_input());
    assert_eq!(
      view.form.error(),
      Some("Name: genre with this name already exists.")
    );
  }

  #[tokio::test]
  async fn test_rename_puts_and_closes_form() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Put, "genres/1/", Ok(json!({"id": 1, "name": "Literary Fiction"})));
    let (ctx, mut view) = loaded(&transport).await;

    view.handle_key(key(KeyCode::Char('e')));
    view.handle_key(key(KeyCode::Home));
    for c in "Literary ".chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
    view.handle_key(key(KeyCode::Enter));
    settle().await;
    view.tick();

    assert!(!view.captures_input());
    let put = transport
      .requests()
      .into_iter()
      .find(|r| r.verb == Verb::Put)
      .unwrap();
    assert_eq!(put.body, Some(json!({"name": "Literary Fiction"})));
    assert!(ctx.cache.get(&endpoints::genres()).is_some_and(|e| e.stale));
  }

  #[tokio::test]
  async fn test_delete_needs_second_press() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Delete, "genres/1/", Ok(serde_json::Value::Null));
    let (_ctx, mut view) = loaded(&transport).await;

    view.handle_key(key(KeyCode::Char('d')));
    view.handle_key(key(KeyCode::Char('k')));
    view.handle_key(key(KeyCode::Char('d')));
    settle().await;
    assert_eq!(transport.count(Verb::Delete, "genres/1/"), 0);

    view.handle_key(key(KeyCode::Char('d')));
    settle().await;
    assert_eq!(transport.count(Verb::Delete, "genres/1/"), 1);
  }
}
