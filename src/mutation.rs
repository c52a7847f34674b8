//! Write operations against the API and the invalidation they trigger.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::api::{ApiRequest, Transport, Verb};
use crate::cache::{ResourceCache, Tag};
use crate::error::ApiError;

/// Static description of one kind of write.
#[derive(Debug)]
pub struct MutationDescriptor {
  pub name: &'static str,
  pub verb: Verb,
  /// Relative path, `{id}` is replaced by the target id
  pub path: &'static str,
  /// Tags marked stale when the mutation succeeds
  pub invalidates: &'static [Tag],
}

impl MutationDescriptor {
  pub fn resolve_path(&self, id: Option<u64>) -> Result<String, ApiError> {
    if !self.path.contains("{id}") {
      return Ok(self.path.to_string());
    }
    match id {
      Some(id) => Ok(self.path.replace("{id}", &id.to_string())),
      None => Err(ApiError::validation(format!("{} needs an id", self.name))),
    }
  }
}

pub static LOGIN: MutationDescriptor = MutationDescriptor {
  name: "login",
  verb: Verb::Post,
  path: "login/",
  invalidates: &[],
};

pub static REGISTER: MutationDescriptor = MutationDescriptor {
  name: "register",
  verb: Verb::Post,
  path: "register/",
  invalidates: &[],
};

pub static BORROW_BOOK: MutationDescriptor = MutationDescriptor {
  name: "borrow book",
  verb: Verb::Post,
  path: "books/{id}/borrow/",
  invalidates: &[Tag::Book, Tag::Borrow],
};

pub static RETURN_BOOK: MutationDescriptor = MutationDescriptor {
  name: "return book",
  verb: Verb::Post,
  path: "books/{id}/return_book/",
  invalidates: &[Tag::Book, Tag::Borrow],
};

pub static CREATE_BOOK: MutationDescriptor = MutationDescriptor {
  name: "create book",
  verb: Verb::Post,
  path: "books/",
  invalidates: &[Tag::Book],
};

pub static UPDATE_BOOK: MutationDescriptor = MutationDescriptor {
  name: "update book",
  verb: Verb::Put,
  path: "books/{id}/",
  invalidates: &[Tag::Book],
};

pub static DELETE_BOOK: MutationDescriptor = MutationDescriptor {
  name: "delete book",
  verb: Verb::Delete,
  path: "books/{id}/",
  invalidates: &[Tag::Book],
};

pub static CREATE_GENRE: MutationDescriptor = MutationDescriptor {
  name: "create genre",
  verb: Verb::Post,
  path: "genres/",
  invalidates: &[Tag::Genre],
};

pub static UPDATE_GENRE: MutationDescriptor = MutationDescriptor {
  name: "update genre",
  verb: Verb::Put,
  path: "genres/{id}/",
  invalidates: &[Tag::Genre],
};

pub static DELETE_GENRE: MutationDescriptor = MutationDescriptor {
  name: "delete genre",
  verb: Verb::Delete,
  path: "genres/{id}/",
  invalidates: &[Tag::Genre],
};

pub static CREATE_REVIEW: MutationDescriptor = MutationDescriptor {
  name: "create review",
  verb: Verb::Post,
  path: "reviews/",
  invalidates: &[Tag::Review, Tag::Book],
};

/// Target id and JSON body of one mutation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationArgs {
  pub id: Option<u64>,
  pub body: Option<Value>,
}

impl MutationArgs {
  pub fn id(id: u64) -> Self {
    Self {
      id: Some(id),
      body: None,
    }
  }

  pub fn body(body: Value) -> Self {
    Self {
      id: None,
      body: Some(body),
    }
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }
}

/// Runs mutations and invalidates the cache when they succeed.
///
/// Single attempt, no retry and no client-side pre-checks.
#[derive(Clone)]
pub struct MutationExecutor {
  transport: Arc<dyn Transport>,
  cache: ResourceCache,
}

impl MutationExecutor {
  pub fn new(transport: Arc<dyn Transport>, cache: ResourceCache) -> Self {
    Self { transport, cache }
  }

  pub fn cache(&self) -> &ResourceCache {
    &self.cache
  }

  pub fn transport(&self) -> Arc<dyn Transport> {
    Arc::clone(&self.transport)
  }

  fn request(descriptor: &MutationDescriptor, args: MutationArgs) -> Result<ApiRequest, ApiError> {
    let path = descriptor.resolve_path(args.id)?;
    Ok(ApiRequest::new(descriptor.verb, path, args.body))
  }

  /// Run a mutation to completion.
  pub async fn execute(
    &self,
    descriptor: &MutationDescriptor,
    args: MutationArgs,
  ) -> Result<Value, ApiError> {
    let request = Self::request(descriptor, args)?;
    debug!(mutation = descriptor.name, path = %request.path, "executing");
    let result = self.transport.send(request).await;
    settle(&self.cache, descriptor.name, descriptor.invalidates, &result);
    result
  }

  /// Start a mutation without waiting for it. The outcome is picked up by
  /// [`PendingMutation::poll`] from the event loop.
  pub fn submit(&self, descriptor: &'static MutationDescriptor, args: MutationArgs) -> PendingMutation {
    match Self::request(descriptor, args) {
      Ok(request) => {
        debug!(mutation = descriptor.name, path = %request.path, "submitting");
        let future = self.transport.send(request);
        self.submit_task(descriptor.name, descriptor.invalidates, future)
      }
      Err(err) => {
        warn!(mutation = descriptor.name, error = %err, "not submitted");
        PendingMutation::failed(descriptor.name, self.cache.clone(), err)
      }
    }
  }

  /// Run an arbitrary operation under the same invalidate-on-success rule.
  ///
  /// The tags are queued on the cache by the task itself, so they are
  /// applied even if the returned handle is dropped first.
  pub fn submit_task<F>(&self, label: &'static str, invalidates: &'static [Tag], task: F) -> PendingMutation
  where
    F: Future<Output = Result<Value, ApiError>> + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    let invalidations = self.cache.invalidations();
    tokio::spawn(async move {
      let result = task.await;
      match &result {
        Ok(_) => invalidations.succeeded(label, invalidates),
        Err(err) => warn!(mutation = label, error = %err, "mutation failed"),
      }
      let _ = tx.send(result);
    });
    PendingMutation {
      label,
      cache: self.cache.clone(),
      rx: Some(rx),
      outcome: None,
    }
  }
}

fn settle(cache: &ResourceCache, label: &str, invalidates: &[Tag], result: &Result<Value, ApiError>) {
  match result {
    Ok(_) => {
      let count = cache.invalidate_tags(invalidates);
      info!(mutation = label, invalidated = count, "mutation succeeded");
    }
    Err(err) => warn!(mutation = label, error = %err, "mutation failed"),
  }
}

/// A submitted mutation whose outcome has not been observed yet.
///
/// Only reports the outcome. Dropping it does not cancel the request or
/// its invalidation.
pub struct PendingMutation {
  label: &'static str,
  cache: ResourceCache,
  rx: Option<oneshot::Receiver<Result<Value, ApiError>>>,
  outcome: Option<Result<Value, ApiError>>,
}

impl PendingMutation {
  fn failed(label: &'static str, cache: ResourceCache, err: ApiError) -> Self {
    Self {
      label,
      cache,
      rx: None,
      outcome: Some(Err(err)),
    }
  }

  pub fn label(&self) -> &'static str {
    self.label
  }

  /// The outcome once the request has finished. A success is only
  /// reported after its tags have been applied to the cache.
  pub fn poll(&mut self) -> Option<&Result<Value, ApiError>> {
    if self.outcome.is_none() {
      let rx = self.rx.as_mut()?;
      let result = match rx.try_recv() {
        Ok(result) => result,
        Err(oneshot::error::TryRecvError::Empty) => return None,
        Err(oneshot::error::TryRecvError::Closed) => {
          Err(ApiError::network("request task ended without a result"))
        }
      };
      self.cache.apply_invalidations();
      self.rx = None;
      self.outcome = Some(result);
    }
    self.outcome.as_ref()
  }

  #[cfg(test)]
  pub fn is_done(&self) -> bool {
    self.outcome.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::endpoints;
  use crate::api::endpoints::BookFilters;
  use crate::cache::testing::{settle as wait, FakeTransport};
  use serde_json::json;

  fn setup() -> (Arc<FakeTransport>, ResourceCache, MutationExecutor) {
    let transport = FakeTransport::new();
    let cache = ResourceCache::new(transport.clone());
    let executor = MutationExecutor::new(transport.clone(), cache.clone());
    (transport, cache, executor)
  }

  #[test]
  fn test_resolve_path() {
    assert_eq!(BORROW_BOOK.resolve_path(Some(2)).unwrap(), "books/2/borrow/");
    assert_eq!(CREATE_BOOK.resolve_path(None).unwrap(), "books/");
    assert!(matches!(
      DELETE_GENRE.resolve_path(None),
      Err(ApiError::Validation { .. })
    ));
  }

  #[tokio::test]
  async fn test_missing_id_sends_nothing() {
    let (transport, cache, executor) = setup();
    let _genres = cache.subscribe::<Value>(endpoints::genres());
    transport.respond(Verb::Get, "genres/", Ok(json!([])));

    let err = executor
      .execute(&DELETE_BOOK, MutationArgs::default())
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Validation { .. }));
    assert!(transport
      .requests()
      .iter()
      .all(|r| r.verb == Verb::Get));
  }

  #[tokio::test]
  async fn test_borrow_invalidates_books_and_borrows_only() {
    let (transport, cache, executor) = setup();
    transport.respond(
      Verb::Get,
      "books/",
      Ok(json!({"count": 3, "results": [
        {"id": 1, "title": "A", "available": true},
        {"id": 2, "title": "B", "available": true},
        {"id": 3, "title": "C", "available": true}
      ]})),
    );
    transport.respond(Verb::Get, "borrows/", Ok(json!({"count": 0, "results": []})));
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    transport.respond(Verb::Post, "books/2/borrow/", Ok(json!({"id": 9})));

    let books_key = endpoints::books(&BookFilters::default());
    let borrows_key = endpoints::active_borrows(100);
    let mut books = cache.subscribe::<Value>(books_key.clone());
    let mut borrows = cache.subscribe::<Value>(borrows_key.clone());
    let mut genres = cache.subscribe::<Value>(endpoints::genres());
    wait().await;
    cache.poll();

    executor
      .execute(&BORROW_BOOK, MutationArgs::id(2))
      .await
      .unwrap();

    assert!(cache.get(&books_key).unwrap().stale);
    assert!(cache.get(&borrows_key).unwrap().stale);
    assert!(!cache.get(&endpoints::genres()).unwrap().stale);

    books.poll();
    borrows.poll();
    genres.poll();
    assert_eq!(transport.count(Verb::Get, "books/"), 2);
    assert_eq!(transport.count(Verb::Get, "borrows/"), 2);
    assert_eq!(transport.count(Verb::Get, "genres/"), 1);
  }

  #[tokio::test]
  async fn test_duplicate_review_is_sent_and_rejection_kept_verbatim() {
    let (transport, cache, executor) = setup();
    let body = r#"{"non_field_errors":["You have already reviewed this book."]}"#;
    transport.respond(Verb::Get, "reviews/", Ok(json!([])));
    transport.respond(Verb::Post, "reviews/", Err(ApiError::server(400, body)));

    let reviews_key = endpoints::reviews(1);
    let _reviews = cache.subscribe::<Value>(reviews_key.clone());
    wait().await;
    cache.poll();

    let err = executor
      .execute(
        &CREATE_REVIEW,
        MutationArgs::body(json!({"book": 1, "rating": 5, "comment": "again"})),
      )
      .await
      .unwrap_err();

    assert_eq!(transport.count(Verb::Post, "reviews/"), 1);
    match &err {
      ApiError::Server { status, rejection } => {
        assert_eq!(*status, 400);
        assert_eq!(rejection.body, body);
      }
      other => panic!("expected server error, got {:?}", other),
    }
    assert_eq!(err.user_message(), "You have already reviewed this book.");
    assert!(!cache.get(&reviews_key).unwrap().stale);
  }

  #[tokio::test]
  async fn test_submit_invalidates_once_on_success() {
    let (transport, cache, executor) = setup();
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    transport.respond(Verb::Post, "genres/", Ok(json!({"id": 1, "name": "Poetry"})));
    let genres_key = endpoints::genres();
    let _genres = cache.subscribe::<Value>(genres_key.clone());
    wait().await;
    cache.poll();

    let mut pending = executor.submit(&CREATE_GENRE, MutationArgs::body(json!({"name": "Poetry"})));
    wait().await;

    let outcome = pending.poll().cloned();
    assert_eq!(outcome, Some(Ok(json!({"id": 1, "name": "Poetry"}))));
    assert!(cache.get(&genres_key).unwrap().stale);
    assert!(pending.is_done());
    assert_eq!(pending.label(), "create genre");
  }

  #[tokio::test]
  async fn test_submit_failure_leaves_cache_alone() {
    let (transport, cache, executor) = setup();
    transport.respond(Verb::Get, "books/", Ok(json!([])));
    transport.respond(Verb::Post, "books/4/return_book/", Err(ApiError::network("reset")));
    let books_key = endpoints::books(&BookFilters::default());
    let _books = cache.subscribe::<Value>(books_key.clone());
    wait().await;
    cache.poll();

    let mut pending = executor.submit(&RETURN_BOOK, MutationArgs::id(4));
    wait().await;

    assert!(matches!(pending.poll(), Some(Err(ApiError::Network { .. }))));
    assert!(!cache.get(&books_key).unwrap().stale);
  }

  #[tokio::test]
  async fn test_submit_without_id_fails_immediately() {
    let (transport, _cache, executor) = setup();
    let mut pending = executor.submit(&UPDATE_GENRE, MutationArgs::body(json!({"name": "x"})));
    assert!(matches!(pending.poll(), Some(Err(ApiError::Validation { .. }))));
    assert!(transport.requests().is_empty());
  }

  #[tokio::test]
  async fn test_dropped_handle_still_invalidates() {
    let (transport, cache, executor) = setup();
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    let gate = transport.gate(Verb::Post, "genres/");
    let genres_key = endpoints::genres();
    let _genres = cache.subscribe::<Value>(genres_key.clone());
    wait().await;
    cache.poll();

    let pending = executor.submit(&CREATE_GENRE, MutationArgs::body(json!({"name": "Poetry"})));
    wait().await;
    drop(pending);

    gate.send(Ok(json!({"id": 1, "name": "Poetry"}))).unwrap();
    wait().await;
    assert!(!cache.get(&genres_key).unwrap().stale);
    cache.poll();
    assert!(cache.get(&genres_key).unwrap().stale);
  }

  #[tokio::test]
  async fn test_dropped_failed_handle_leaves_cache_alone() {
    let (transport, cache, executor) = setup();
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    transport.respond(Verb::Post, "genres/", Err(ApiError::server(400, "{}")));
    let genres_key = endpoints::genres();
    let _genres = cache.subscribe::<Value>(genres_key.clone());
    wait().await;
    cache.poll();

    drop(executor.submit(&CREATE_GENRE, MutationArgs::body(json!({"name": "x"}))));
    wait().await;
    cache.poll();
    assert!(!cache.get(&genres_key).unwrap().stale);
  }

  #[tokio::test]
  async fn test_pending_reports_nothing_until_done() {
    let (transport, _cache, executor) = setup();
    let gate = transport.gate(Verb::Delete, "books/5/");
    let mut pending = executor.submit(&DELETE_BOOK, MutationArgs::id(5));
    wait().await;
    assert!(pending.poll().is_none());

    gate.send(Ok(Value::Null)).unwrap();
    wait().await;
    assert_eq!(pending.poll().cloned(), Some(Ok(Value::Null)));
  }

  #[tokio::test]
  async fn test_submit_task_uses_given_tags() {
    let (transport, cache, executor) = setup();
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    transport.respond(Verb::Get, "books/", Ok(json!([])));
    let _genres = cache.subscribe::<Value>(endpoints::genres());
    let _books = cache.subscribe::<Value>(endpoints::books(&BookFilters::default()));
    wait().await;
    cache.poll();

    let mut pending = executor.submit_task("seed", &[Tag::Genre], async { Ok(json!(5)) });
    wait().await;
    pending.poll();

    assert!(cache.get(&endpoints::genres()).unwrap().stale);
    assert!(!cache
      .get(&endpoints::books(&BookFilters::default()))
      .unwrap()
      .stale);
  }
}
