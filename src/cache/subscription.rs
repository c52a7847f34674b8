use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use super::entry::{CacheEntry, FetchStatus};
use super::store::ResourceCache;
use super::tags::QueryKey;
use crate::error::ApiError;

/// A view's handle on one cache entry, decoded into `T`.
///
/// Holding it counts as a subscriber: the entry is kept and refetched
/// lazily after invalidation. Dropping it starts the retention timer.
pub struct Subscription<T> {
  cache: ResourceCache,
  key: QueryKey,
  hash: String,
  seen_revision: Option<u64>,
  seen_data: Option<Arc<Value>>,
  /// Subscribed while the entry was stale; its data is hidden until a
  /// fetch issued after the invalidation settles.
  withhold_stale: bool,
  status: FetchStatus,
  data: Option<T>,
  error: Option<ApiError>,
  /// Why `seen_data` could not be decoded
  decode_error: Option<ApiError>,
}

impl<T: DeserializeOwned> Subscription<T> {
  pub(super) fn new(cache: ResourceCache, key: QueryKey, hash: String, withhold_stale: bool) -> Self {
    let mut subscription = Self {
      cache,
      key,
      hash,
      seen_revision: None,
      seen_data: None,
      withhold_stale,
      status: FetchStatus::Idle,
      data: None,
      error: None,
      decode_error: None,
    };
    let entry = subscription.cache.entry_by_hash(&subscription.hash);
    subscription.sync(entry);
    subscription
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Pick up changes from the cache. Returns true if anything changed.
  ///
  /// Also the access point for lazy refetching: a stale entry starts a
  /// fetch here.
  pub fn poll(&mut self) -> bool {
    let entry = self.cache.access(&self.hash);
    self.sync(entry)
  }

  /// Ask for fresh data now.
  pub fn refetch(&mut self) {
    self.cache.refetch(&self.hash);
    self.poll();
  }

  fn sync(&mut self, entry: Option<CacheEntry>) -> bool {
    let Some(entry) = entry else {
      return false;
    };
    if self.seen_revision == Some(entry.revision) {
      return false;
    }
    self.seen_revision = Some(entry.revision);
    self.status = entry.status;
    self.error = entry.error.clone();

    if self.withhold_stale {
      if entry.stale {
        return true;
      }
      self.withhold_stale = false;
    }

    let Some(value) = entry.data else {
      return true;
    };
    let unchanged = self
      .seen_data
      .as_ref()
      .is_some_and(|seen| Arc::ptr_eq(seen, &value));
    if unchanged {
      // Same undecodable payload: the entry's status alone would hide it
      if let Some(err) = &self.decode_error {
        if self.status != FetchStatus::Loading {
          self.status = FetchStatus::Error;
        }
        if self.error.is_none() {
          self.error = Some(err.clone());
        }
      }
      return true;
    }

    match serde_json::from_value::<T>(Value::clone(&value)) {
      Ok(data) => {
        self.data = Some(data);
        self.decode_error = None;
      }
      Err(e) => {
        warn!(query = %self.key.description(), error = %e, "cached response did not decode");
        let err = ApiError::from(e);
        self.status = FetchStatus::Error;
        self.error = Some(err.clone());
        self.decode_error = Some(err);
      }
    }
    self.seen_data = Some(value);
    true
  }
}

impl<T> Subscription<T> {
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn status(&self) -> FetchStatus {
    self.status
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.status == FetchStatus::Loading
  }

  pub fn is_error(&self) -> bool {
    self.status == FetchStatus::Error
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.cache.release(&self.hash);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{Book, ListResponse};
  use crate::api::Verb;
  use crate::cache::testing::{settle, FakeTransport};
  use crate::cache::Tag;
  use serde_json::json;

  #[tokio::test]
  async fn test_decodes_paginated_books() {
    let transport = FakeTransport::new();
    transport.respond(
      Verb::Get,
      "books/",
      Ok(json!({"count": 1, "results": [{"id": 1, "title": "Dune", "available": true}]})),
    );
    let cache = ResourceCache::new(transport.clone());

    let mut sub = cache.subscribe::<ListResponse<Book>>(QueryKey::new(Tag::Book, "books/"));
    settle().await;
    cache.poll();
    assert!(sub.poll());
    assert!(!sub.poll(), "no change without a new revision");

    let books = sub.data().unwrap();
    assert_eq!(books.total(), 1);
    assert_eq!(books.items()[0].title, "Dune");
  }

  #[tokio::test]
  async fn test_decode_failure_surfaces_as_error() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "genres/", Ok(json!({"unexpected": true})));
    let cache = ResourceCache::new(transport.clone());

    let mut sub = cache.subscribe::<Vec<u64>>(QueryKey::new(Tag::Genre, "genres/"));
    settle().await;
    cache.poll();
    sub.poll();

    assert!(sub.is_error());
    assert!(matches!(sub.error(), Some(ApiError::InvalidResponse { .. })));
    assert!(sub.data().is_none());
  }

  #[tokio::test]
  async fn test_decode_error_kept_across_revisions_of_same_payload() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "genres/", Ok(json!({"unexpected": true})));
    let cache = ResourceCache::new(transport.clone());

    let mut sub = cache.subscribe::<Vec<u64>>(QueryKey::new(Tag::Genre, "genres/"));
    settle().await;
    cache.poll();
    sub.poll();
    assert!(sub.is_error());

    // Refetch bumps the revision while the old payload is still cached
    let gate = transport.gate(Verb::Get, "genres/");
    sub.refetch();
    assert!(sub.is_loading());
    assert!(matches!(sub.error(), Some(ApiError::InvalidResponse { .. })));
    assert!(sub.data().is_none());

    gate.send(Ok(json!([1, 2]))).unwrap();
    settle().await;
    cache.poll();
    sub.poll();
    assert_eq!(sub.status(), FetchStatus::Success);
    assert!(sub.error().is_none());
    assert_eq!(sub.data(), Some(&vec![1, 2]));
  }

  #[tokio::test]
  async fn test_drop_releases_subscriber() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    let cache = ResourceCache::new(transport.clone());
    let key = QueryKey::new(Tag::Genre, "genres/");

    let a = cache.subscribe::<Value>(key.clone());
    let b = cache.subscribe::<Value>(key.clone());
    assert_eq!(cache.subscriber_count(&key), 2);
    drop(a);
    assert_eq!(cache.subscriber_count(&key), 1);
    drop(b);
    assert_eq!(cache.subscriber_count(&key), 0);
    // Still cached until retention runs out
    assert_eq!(cache.len(), 1);
  }
}
