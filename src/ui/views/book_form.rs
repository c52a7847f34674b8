use crate::api::endpoints;
use crate::api::types::{Book, Genre, ListResponse};
use crate::cache::Subscription;
use crate::error::ApiError;
use crate::forms::BookForm;
use crate::mutation::{MutationArgs, CREATE_BOOK, UPDATE_BOOK};
use crate::ui::components::{FormEvent, FormPanel, KeyResult, MutationSlot};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::AppContext;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;

/// Create or edit a book. Pops itself once the save succeeds.
pub struct BookFormView {
  ctx: AppContext,
  /// Book being edited, `None` when creating
  editing: Option<(u64, String)>,
  genres: Subscription<ListResponse<Genre>>,
  form: FormPanel,
  status: MutationSlot,
}

impl BookFormView {
  pub fn create(ctx: AppContext) -> Self {
    Self::open(ctx, None, BookForm::default())
  }

  pub fn edit(ctx: AppContext, book: &Book) -> Self {
    Self::open(ctx, Some((book.id, book.title.clone())), BookForm::from_book(book))
  }

  fn open(ctx: AppContext, editing: Option<(u64, String)>, initial: BookForm) -> Self {
    let genres = ctx.cache.subscribe(endpoints::genres());
    let title = match &editing {
      Some((_, name)) => format!("Edit \"{}\"", name),
      None => "New book".to_string(),
    };
    let mut form = FormPanel::new();
    form.show(
      title,
      &[
        ("Title", initial.title.as_str()),
        ("Author", initial.author.as_str()),
        ("Genre", initial.genre.as_str()),
        ("Description", initial.description.as_str()),
      ],
    );

    let mut view = Self {
      ctx,
      editing,
      genres,
      form,
      status: MutationSlot::new(),
    };
    view.update_hint();
    view
  }

  fn genres(&self) -> &[Genre] {
    self.genres.data().map(|g| g.items()).unwrap_or(&[])
  }

  fn update_hint(&mut self) {
    let names: Vec<&str> = self.genres().iter().map(|g| g.name.as_str()).collect();
    let hint = if names.is_empty() {
      "No genres yet. An admin can add them with :genres".to_string()
    } else {
      format!("Genres: {}", names.join(", "))
    };
    self.form.set_hint(hint);
  }

  fn submit(&mut self, values: Vec<String>) {
    let mut values = values.into_iter();
    let form = BookForm {
      title: values.next().unwrap_or_default(),
      author: values.next().unwrap_or_default(),
      genre: values.next().unwrap_or_default(),
      description: values.next().unwrap_or_default(),
    };

    match self.send(&form) {
      Ok(()) => self.form.set_busy(),
      Err(err) => self.form.set_error(err.user_message()),
    }
  }

  fn send(&mut self, form: &BookForm) -> Result<(), ApiError> {
    let body = form.payload(self.genres())?;
    let pending = match &self.editing {
      Some((id, _)) => self
        .ctx
        .mutations
        .submit(&UPDATE_BOOK, MutationArgs::id(*id).with_body(body)),
      None => self.ctx.mutations.submit(&CREATE_BOOK, MutationArgs::body(body)),
    };
    self.status.start(pending);
    Ok(())
  }
}

impl View for BookFormView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submitted(values)) => self.submit(values),
      KeyResult::Event(FormEvent::Cancelled) => return ViewAction::Pop,
      KeyResult::Handled => {}
      KeyResult::NotHandled => {
        if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
          return ViewAction::Pop;
        }
      }
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.form.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.editing {
      Some((_, title)) => format!("Edit {}", title),
      None => "New book".to_string(),
    }
  }

  fn tick(&mut self) -> ViewAction {
    if self.genres.poll() {
      self.update_hint();
    }
    match self.status.poll() {
      Some(Ok(_)) => ViewAction::Pop,
      Some(Err(err)) => {
        self.form.set_error(err.user_message());
        ViewAction::None
      }
      None => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    self.form.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("Tab", "next field").with_priority(10),
      Shortcut::new("Enter", "save").with_priority(20),
      Shortcut::new("Esc", "cancel").with_priority(90),
    ]
  }
}
