use crate::commands::{self, CommandKind};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::mutation::MutationExecutor;
use crate::seed;
use crate::session::Session;
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult, MutationSlot};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{
  BookListView, BorrowedView, DashboardView, GenreListView, RecommendationsView,
};
use crate::ui::AppContext;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{debug, info};

const TICK_RATE: Duration = Duration::from_millis(250);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// Command input component (handles : mode)
  command: CommandInput,

  /// Outcome of app-level operations like seeding
  status: MutationSlot,

  title: String,
  config: Config,
  executor: MutationExecutor,
  session: Session,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config, executor: MutationExecutor, session: Session) -> Self {
    let mut app = Self {
      view_stack: Vec::new(),
      command: CommandInput::new(),
      status: MutationSlot::new(),
      title: config.display_title(),
      config,
      executor,
      session,
      should_quit: false,
    };
    app.command.set_admin(app.session.is_admin());
    let root = DashboardView::new(app.context());
    app.set_root(Box::new(root));
    app
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);

    // Main loop
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  /// What views need to read and write data as the current user
  fn context(&self) -> AppContext {
    AppContext {
      cache: self.executor.cache().clone(),
      mutations: self.executor.clone(),
      user: self.session.user().cloned(),
      borrow_page_size: self.config.cache.borrow_page_size,
    }
  }

  // Accessors for UI rendering

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn command(&self) -> &CommandInput {
    &self.command
  }

  pub fn status(&self) -> Option<&str> {
    self.status.text()
  }

  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  /// Breadcrumb trail from root to current view
  pub fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|v| v.breadcrumb_label()).collect()
  }

  // Event handling

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      // The next draw picks up the new size
      Event::Resize => {}
    }
  }

  fn tick(&mut self) {
    self.executor.cache().poll();
    self.status.poll();

    // Every view polls so background mutations settle, only the top one
    // may act on the stack
    let count = self.view_stack.len();
    let mut action = ViewAction::None;
    for (i, view) in self.view_stack.iter_mut().enumerate() {
      let result = view.tick();
      if i + 1 == count {
        action = result;
      }
    }
    self.apply(action);
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let captured = self.current_view().is_some_and(|v| v.captures_input());
    if !captured {
      // Command input handles : activation and its own keys
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => {
          self.execute_command(&cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => {
        debug!(view = %view.breadcrumb_label(), "push");
        self.view_stack.push(view);
      }
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  /// Replace the whole stack; dropped views release their subscriptions
  fn set_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
  }

  fn execute_command(&mut self, input: &str) {
    let admin = self.session.is_admin();
    let Some(command) = commands::find(input, admin) else {
      if commands::find(input, true).is_some() {
        self.status.set_error(format!("{} is for administrators", input));
      } else if !input.is_empty() {
        self.status.set_error(format!("Unknown command: {}", input));
      }
      return;
    };

    if command.kind == CommandKind::Seed && self.status.is_busy() {
      self.status.set_info("Sample data is still being created");
      return;
    }

    info!(command = command.name, "command");
    self.status.clear();
    let ctx = self.context();
    match command.kind {
      CommandKind::Dashboard => self.set_root(Box::new(DashboardView::new(ctx))),
      CommandKind::Books => self.set_root(Box::new(BookListView::new(ctx))),
      CommandKind::Borrowed => self.set_root(Box::new(BorrowedView::new(ctx))),
      CommandKind::Recommendations => self.set_root(Box::new(RecommendationsView::new(ctx))),
      CommandKind::Genres => self.set_root(Box::new(GenreListView::new(ctx))),
      CommandKind::Seed => self.status.start(seed::submit(&self.executor)),
      CommandKind::Logout => self.logout(),
      CommandKind::Quit => self.should_quit = true,
    }
  }

  fn logout(&mut self) {
    if !self.session.is_authenticated() {
      self.status.set_error("Not signed in");
      return;
    }
    // Views hold subscriptions and the old user, rebuild from scratch
    self.view_stack.clear();
    self.session.logout(self.executor.cache());
    self.command.set_admin(false);
    let root = DashboardView::new(self.context());
    self.set_root(Box::new(root));
  }
}
