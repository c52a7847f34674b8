use crate::error::ApiError;
use crate::mutation::PendingMutation;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Message {
  Busy(String),
  Success(String),
  Failure(String),
}

/// Tracks one in-flight mutation for a view and the line describing its
/// outcome.
#[derive(Default)]
pub struct MutationSlot {
  pending: Option<PendingMutation>,
  message: Option<Message>,
}

impl MutationSlot {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace whatever was pending. An earlier mutation keeps running and
  /// still invalidates on success, but its outcome is no longer shown.
  pub fn start(&mut self, pending: PendingMutation) {
    self.message = Some(Message::Busy(format!("{}...", capitalize(pending.label()))));
    self.pending = Some(pending);
  }

  /// Returns the outcome the first time it is seen.
  pub fn poll(&mut self) -> Option<Result<Value, ApiError>> {
    let outcome = self.pending.as_mut()?.poll()?.clone();
    let label = self.pending.take().map(|p| p.label()).unwrap_or_default();
    self.message = Some(match &outcome {
      Ok(_) => Message::Success(format!("{} succeeded", capitalize(label))),
      Err(err) => Message::Failure(err.user_message()),
    });
    Some(outcome)
  }

  pub fn is_busy(&self) -> bool {
    self.pending.is_some()
  }

  pub fn set_error(&mut self, message: impl Into<String>) {
    self.message = Some(Message::Failure(message.into()));
  }

  pub fn set_info(&mut self, message: impl Into<String>) {
    self.message = Some(Message::Success(message.into()));
  }

  pub fn clear(&mut self) {
    self.message = None;
  }

  pub fn text(&self) -> Option<&str> {
    match self.message.as_ref()? {
      Message::Busy(text) | Message::Success(text) | Message::Failure(text) => Some(text),
    }
  }

  pub fn render(&self, frame: &mut Frame, area: Rect) {
    let Some(message) = &self.message else {
      return;
    };
    let (text, color) = match message {
      Message::Busy(text) => (text, Color::Yellow),
      Message::Success(text) => (text, Color::Green),
      Message::Failure(text) => (text, Color::Red),
    };
    frame.render_widget(
      Paragraph::new(Span::styled(text.as_str(), Style::default().fg(color))),
      area,
    );
  }
}

fn capitalize(text: &str) -> String {
  let mut chars = text.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Verb;
  use crate::cache::testing::{settle, FakeTransport};
  use crate::cache::ResourceCache;
  use crate::api::endpoints;
  use crate::mutation::{MutationArgs, MutationExecutor, BORROW_BOOK, CREATE_GENRE, RETURN_BOOK};
  use serde_json::json;

  #[tokio::test]
  async fn test_slot_reports_outcome_once() {
    let transport = FakeTransport::new();
    let cache = ResourceCache::new(transport.clone());
    let executor = MutationExecutor::new(transport.clone(), cache);
    transport.respond(Verb::Post, "books/4/borrow/", Ok(json!({"id": 9})));

    let mut slot = MutationSlot::new();
    slot.start(executor.submit(&BORROW_BOOK, MutationArgs::id(4)));
    assert!(slot.is_busy());
    assert_eq!(slot.text(), Some("Borrow book..."));

    settle().await;
    assert!(matches!(slot.poll(), Some(Ok(_))));
    assert!(!slot.is_busy());
    assert_eq!(slot.text(), Some("Borrow book succeeded"));
    assert!(slot.poll().is_none());
  }

  #[tokio::test]
  async fn test_slot_shows_server_message() {
    let transport = FakeTransport::new();
    let cache = ResourceCache::new(transport.clone());
    let executor = MutationExecutor::new(transport.clone(), cache);
    transport.respond(
      Verb::Post,
      "books/4/return_book/",
      Err(ApiError::server(400, r#"{"detail": "Book not borrowed by you"}"#)),
    );

    let mut slot = MutationSlot::new();
    slot.start(executor.submit(&RETURN_BOOK, MutationArgs::id(4)));
    settle().await;
    assert!(matches!(slot.poll(), Some(Err(_))));
    assert_eq!(slot.text(), Some("Book not borrowed by you"));
  }

  #[tokio::test]
  async fn test_replaced_mutation_still_invalidates() {
    let transport = FakeTransport::new();
    let cache = ResourceCache::new(transport.clone());
    let executor = MutationExecutor::new(transport.clone(), cache.clone());
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    transport.respond(Verb::Post, "genres/", Ok(json!({"id": 3, "name": "Poetry"})));
    transport.respond(Verb::Post, "books/4/borrow/", Ok(json!({"id": 9})));
    let _genres = cache.subscribe::<Value>(endpoints::genres());
    settle().await;
    cache.poll();

    let mut slot = MutationSlot::new();
    slot.start(executor.submit(&CREATE_GENRE, MutationArgs::body(json!({"name": "Poetry"}))));
    slot.start(executor.submit(&BORROW_BOOK, MutationArgs::id(4)));
    settle().await;
    assert!(matches!(slot.poll(), Some(Ok(_))));

    assert_eq!(transport.count(Verb::Post, "genres/"), 1);
    assert!(cache.get(&endpoints::genres()).unwrap().stale);
  }

  #[tokio::test]
  async fn test_dropped_slot_still_invalidates() {
    let transport = FakeTransport::new();
    let cache = ResourceCache::new(transport.clone());
    let executor = MutationExecutor::new(transport.clone(), cache.clone());
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    transport.respond(Verb::Post, "genres/", Ok(json!({"id": 3, "name": "Poetry"})));
    let _genres = cache.subscribe::<Value>(endpoints::genres());
    settle().await;
    cache.poll();

    let mut slot = MutationSlot::new();
    slot.start(executor.submit(&CREATE_GENRE, MutationArgs::body(json!({"name": "Poetry"}))));
    drop(slot);
    settle().await;
    cache.poll();
    assert!(cache.get(&endpoints::genres()).unwrap().stale);
  }

  #[test]
  fn test_capitalize() {
    assert_eq!(capitalize("create review"), "Create review");
    assert_eq!(capitalize(""), "");
  }
}
