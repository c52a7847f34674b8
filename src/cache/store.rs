//! In-memory resource cache with tag invalidation.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, FetchStatus};
use super::subscription::Subscription;
use super::tags::{QueryKey, Tag};
use crate::api::{ApiRequest, Transport};
use crate::error::ApiError;

/// How long an entry with no subscribers is kept by default.
pub const DEFAULT_KEEP_UNUSED_FOR: Duration = Duration::from_secs(60);

/// Result of a spawned fetch, delivered back to the UI thread.
struct Completion {
  hash: String,
  slot_id: u64,
  ticket: u64,
  result: Result<Value, ApiError>,
}

/// A write that succeeded on the server, waiting to be applied.
struct Settled {
  label: &'static str,
  tags: &'static [Tag],
}

/// Sending half of the cache's invalidation queue.
///
/// Spawned tasks report successful writes here. The tags are applied on
/// the next [`ResourceCache::poll`] or [`ResourceCache::apply_invalidations`],
/// whether or not anyone still waits for the write's outcome.
#[derive(Clone)]
pub struct Invalidations {
  tx: mpsc::UnboundedSender<Settled>,
}

impl Invalidations {
  pub fn succeeded(&self, label: &'static str, tags: &'static [Tag]) {
    // The cache may have been dropped
    let _ = self.tx.send(Settled { label, tags });
  }
}

struct Slot {
  id: u64,
  key: QueryKey,
  entry: CacheEntry,
  subscribers: usize,
  unused_since: Option<Instant>,
  in_flight: usize,
  /// Ticket of the most recently issued fetch
  last_ticket: Option<u64>,
  /// Fetches with a ticket at or above this were issued after the latest
  /// invalidation
  fresh_from: u64,
}

impl Slot {
  fn fresh_fetch_in_flight(&self) -> bool {
    self.in_flight > 0 && self.last_ticket.is_some_and(|t| t >= self.fresh_from)
  }

  /// Whether a new subscriber should trigger a fetch.
  fn needs_fetch(&self) -> bool {
    if self.fresh_fetch_in_flight() {
      return false;
    }
    if self.entry.stale {
      return true;
    }
    matches!(self.entry.status, FetchStatus::Idle | FetchStatus::Error)
  }

  /// Whether an access by an existing subscriber should refetch. Errors are
  /// not retried here.
  fn needs_refetch(&self) -> bool {
    self.entry.stale && !self.fresh_fetch_in_flight()
  }
}

struct CacheState {
  slots: HashMap<String, Slot>,
  next_ticket: u64,
  next_slot_id: u64,
  keep_unused_for: Duration,
  transport: Arc<dyn Transport>,
  tx: mpsc::UnboundedSender<Completion>,
  rx: mpsc::UnboundedReceiver<Completion>,
  settled_tx: mpsc::UnboundedSender<Settled>,
  settled_rx: mpsc::UnboundedReceiver<Settled>,
}

impl CacheState {
  fn ensure_slot(&mut self, hash: &str, key: &QueryKey) -> &mut Slot {
    let next_slot_id = &mut self.next_slot_id;
    self.slots.entry(hash.to_string()).or_insert_with(|| {
      let id = *next_slot_id;
      *next_slot_id += 1;
      debug!(query = %key.description(), "creating cache entry");
      Slot {
        id,
        key: key.clone(),
        entry: CacheEntry::new(),
        subscribers: 0,
        unused_since: None,
        in_flight: 0,
        last_ticket: None,
        fresh_from: 0,
      }
    })
  }

  fn start_fetch(&mut self, hash: &str) {
    let ticket = self.next_ticket;
    let Some(slot) = self.slots.get_mut(hash) else {
      return;
    };
    self.next_ticket += 1;

    slot.in_flight += 1;
    slot.last_ticket = Some(ticket);
    slot.entry.status = FetchStatus::Loading;
    slot.entry.touch();

    debug!(query = %slot.key.description(), ticket, "fetching");

    let request = ApiRequest::get(slot.key.path(), slot.key.params().clone());
    let future = self.transport.send(request);
    let tx = self.tx.clone();
    let completion_hash = hash.to_string();
    let slot_id = slot.id;

    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - the cache may have been dropped
      let _ = tx.send(Completion {
        hash: completion_hash,
        slot_id,
        ticket,
        result,
      });
    });
  }

  /// Apply a completion in arrival order. Whichever lands last owns the
  /// entry's data, regardless of which request was issued last.
  fn apply(&mut self, completion: Completion) -> bool {
    let Some(slot) = self.slots.get_mut(&completion.hash) else {
      debug!("dropping completion for an evicted entry");
      return false;
    };
    if slot.id != completion.slot_id {
      debug!("dropping completion for a previous generation of the entry");
      return false;
    }

    slot.in_flight = slot.in_flight.saturating_sub(1);
    let settles_staleness = completion.ticket >= slot.fresh_from;

    match completion.result {
      Ok(value) => {
        slot.entry.data = Some(Arc::new(value));
        slot.entry.status = FetchStatus::Success;
        slot.entry.error = None;
        slot.entry.fetched_at = Some(Utc::now());
        debug!(query = %slot.key.description(), ticket = completion.ticket, "fetch succeeded");
      }
      Err(err) => {
        warn!(query = %slot.key.description(), ticket = completion.ticket, error = %err, "fetch failed");
        slot.entry.status = FetchStatus::Error;
        slot.entry.error = Some(err);
      }
    }

    if settles_staleness {
      slot.entry.stale = false;
    }
    slot.entry.touch();
    true
  }

  fn invalidate(&mut self, tag: Tag) -> usize {
    let fresh_from = self.next_ticket;
    let mut count = 0;
    for slot in self.slots.values_mut().filter(|s| s.key.tag() == tag) {
      slot.entry.stale = true;
      slot.fresh_from = fresh_from;
      count += 1;
    }
    count
  }

  /// Invalidate each distinct tag once. Returns the tags and the number of
  /// entries affected.
  fn invalidate_tags(&mut self, tags: &[Tag]) -> (Vec<Tag>, usize) {
    let mut seen = Vec::with_capacity(tags.len());
    let mut count = 0;
    for tag in tags {
      if !seen.contains(tag) {
        seen.push(*tag);
        count += self.invalidate(*tag);
      }
    }
    (seen, count)
  }
}

/// Cache of server responses keyed by [`QueryKey`].
///
/// Owned by the application root and cloned into views; clones share
/// state. All mutation happens on the UI thread: fetches run on spawned
/// tasks and their results are applied by [`ResourceCache::poll`].
#[derive(Clone)]
pub struct ResourceCache {
  state: Rc<RefCell<CacheState>>,
}

impl ResourceCache {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let (settled_tx, settled_rx) = mpsc::unbounded_channel();
    Self {
      state: Rc::new(RefCell::new(CacheState {
        slots: HashMap::new(),
        next_ticket: 0,
        next_slot_id: 0,
        keep_unused_for: DEFAULT_KEEP_UNUSED_FOR,
        transport,
        tx,
        rx,
        settled_tx,
        settled_rx,
      })),
    }
  }

  /// Set how long entries without subscribers are retained.
  pub fn with_keep_unused_for(self, keep_unused_for: Duration) -> Self {
    self.state.borrow_mut().keep_unused_for = keep_unused_for;
    self
  }

  /// Subscribe to a query.
  ///
  /// A fresh entry is served as is. A missing, idle, failed or stale entry
  /// starts a fetch and reports `Loading` until it completes.
  pub fn subscribe<T: DeserializeOwned>(&self, key: QueryKey) -> Subscription<T> {
    let hash = key.cache_hash();
    let withhold_stale = {
      let mut state = self.state.borrow_mut();
      let slot = state.ensure_slot(&hash, &key);
      slot.subscribers += 1;
      slot.unused_since = None;
      let stale = slot.entry.stale;
      if slot.needs_fetch() {
        state.start_fetch(&hash);
      }
      stale
    };
    Subscription::new(self.clone(), key, hash, withhold_stale)
  }

  /// Look up an entry without side effects.
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
    self.entry_by_hash(&key.cache_hash())
  }

  /// Mark every entry under `tag` stale, whatever its parameters.
  /// Returns the number of entries affected.
  #[cfg_attr(not(test), allow(dead_code))]
  pub fn invalidate(&self, tag: Tag) -> usize {
    let count = self.state.borrow_mut().invalidate(tag);
    debug!(tag = %tag, count, "invalidated");
    count
  }

  pub fn invalidate_tags(&self, tags: &[Tag]) -> usize {
    let (seen, count) = self.state.borrow_mut().invalidate_tags(tags);
    if count > 0 {
      info!(tags = ?seen, count, "invalidated cache entries");
    }
    count
  }

  /// Handle for reporting successful writes from spawned tasks.
  pub fn invalidations(&self) -> Invalidations {
    Invalidations {
      tx: self.state.borrow().settled_tx.clone(),
    }
  }

  /// Apply the tags of every write reported through [`Invalidations`].
  /// Returns the number of entries marked stale.
  pub fn apply_invalidations(&self) -> usize {
    let mut state = self.state.borrow_mut();
    let mut total = 0;
    while let Ok(settled) = state.settled_rx.try_recv() {
      let (_, count) = state.invalidate_tags(settled.tags);
      info!(mutation = settled.label, invalidated = count, "mutation succeeded");
      total += count;
    }
    total
  }

  pub fn invalidate_all(&self) -> usize {
    self.invalidate_tags(&Tag::ALL)
  }

  /// Apply reported writes and finished fetches, then drop expired unused
  /// entries.
  ///
  /// Returns the number of completions applied. Call this on every tick.
  pub fn poll(&self) -> usize {
    self.apply_invalidations();
    let mut applied = 0;
    {
      let mut state = self.state.borrow_mut();
      while let Ok(completion) = state.rx.try_recv() {
        if state.apply(completion) {
          applied += 1;
        }
      }
    }
    self.prune(Instant::now());
    applied
  }

  /// Remove entries nobody subscribed to for longer than the retention
  /// timeout, as of `now`.
  pub fn prune(&self, now: Instant) -> usize {
    let mut state = self.state.borrow_mut();
    let keep_for = state.keep_unused_for;
    let before = state.slots.len();
    state.slots.retain(|_, slot| match slot.unused_since {
      Some(since) if slot.subscribers == 0 => now.saturating_duration_since(since) < keep_for,
      _ => true,
    });
    let removed = before - state.slots.len();
    if removed > 0 {
      debug!(removed, "pruned unused cache entries");
    }
    removed
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.state.borrow().slots.len()
  }

  #[cfg(test)]
  pub fn subscriber_count(&self, key: &QueryKey) -> usize {
    self
      .state
      .borrow()
      .slots
      .get(&key.cache_hash())
      .map(|s| s.subscribers)
      .unwrap_or(0)
  }

  // --------------------------------------------------------------------------
  // Subscription plumbing
  // --------------------------------------------------------------------------

  pub(super) fn entry_by_hash(&self, hash: &str) -> Option<CacheEntry> {
    self
      .state
      .borrow()
      .slots
      .get(hash)
      .map(|s| s.entry.clone())
  }

  /// Access by a subscriber: refetches lazily when the entry went stale.
  pub(super) fn access(&self, hash: &str) -> Option<CacheEntry> {
    let mut state = self.state.borrow_mut();
    let refetch = state.slots.get(hash).is_some_and(|s| s.needs_refetch());
    if refetch {
      state.start_fetch(hash);
    }
    state.slots.get(hash).map(|s| s.entry.clone())
  }

  /// Explicit refetch. Skipped when a fetch issued since the last
  /// invalidation is already in flight.
  pub(super) fn refetch(&self, hash: &str) {
    let mut state = self.state.borrow_mut();
    let busy = state
      .slots
      .get(hash)
      .map(|s| s.fresh_fetch_in_flight())
      .unwrap_or(true);
    if !busy {
      state.start_fetch(hash);
    }
  }

  pub(super) fn release(&self, hash: &str) {
    let Ok(mut state) = self.state.try_borrow_mut() else {
      warn!("cache busy while releasing a subscription");
      return;
    };
    if let Some(slot) = state.slots.get_mut(hash) {
      slot.subscribers = slot.subscribers.saturating_sub(1);
      if slot.subscribers == 0 {
        slot.unused_since = Some(Instant::now());
      }
    }
  }
}

impl fmt::Debug for ResourceCache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.borrow();
    f.debug_struct("ResourceCache")
      .field("entries", &state.slots.len())
      .field("next_ticket", &state.next_ticket)
      .field("keep_unused_for", &state.keep_unused_for)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Verb;
  use crate::cache::testing::{settle, FakeTransport};
  use serde_json::json;

  fn books_key() -> QueryKey {
    QueryKey::new(Tag::Book, "books/")
  }

  #[tokio::test]
  async fn test_miss_fetches_and_serves_result() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([1, 2, 3])));
    let cache = ResourceCache::new(transport.clone());

    let mut sub = cache.subscribe::<Vec<u64>>(books_key());
    assert!(sub.is_loading());
    assert!(sub.data().is_none());

    settle().await;
    cache.poll();

    assert!(sub.poll());
    assert_eq!(sub.status(), FetchStatus::Success);
    assert_eq!(sub.data(), Some(&vec![1, 2, 3]));
    assert_eq!(transport.count(Verb::Get, "books/"), 1);
  }

  #[tokio::test]
  async fn test_fresh_entry_is_served_without_fetch() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([1])));
    let cache = ResourceCache::new(transport.clone());

    let _first = cache.subscribe::<Vec<u64>>(books_key());
    settle().await;
    cache.poll();

    let second = cache.subscribe::<Vec<u64>>(books_key());
    assert_eq!(second.data(), Some(&vec![1]));
    assert_eq!(transport.count(Verb::Get, "books/"), 1);
    assert_eq!(cache.subscriber_count(&books_key()), 2);
  }

  #[tokio::test]
  async fn test_concurrent_subscribers_share_one_fetch() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([1])));
    let cache = ResourceCache::new(transport.clone());

    let _a = cache.subscribe::<Vec<u64>>(books_key());
    let _b = cache.subscribe::<Vec<u64>>(books_key());
    assert_eq!(transport.count(Verb::Get, "books/"), 1);
  }

  #[tokio::test]
  async fn test_invalidation_refetches_lazily_on_access() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([1])));
    let cache = ResourceCache::new(transport.clone());

    let mut sub = cache.subscribe::<Vec<u64>>(books_key());
    settle().await;
    cache.poll();
    sub.poll();

    assert_eq!(cache.invalidate(Tag::Book), 1);
    assert!(cache.get(&books_key()).unwrap().stale);
    // Nothing happens until someone looks at the entry
    assert_eq!(transport.count(Verb::Get, "books/"), 1);

    transport.respond(Verb::Get, "books/", Ok(json!([1, 2])));
    sub.poll();
    assert_eq!(transport.count(Verb::Get, "books/"), 2);
    // Existing subscriber keeps showing its data while refetching
    assert_eq!(sub.data(), Some(&vec![1]));

    settle().await;
    cache.poll();
    sub.poll();
    assert_eq!(sub.data(), Some(&vec![1, 2]));
    assert!(!cache.get(&books_key()).unwrap().stale);
  }

  #[tokio::test]
  async fn test_invalidation_is_coarse_per_tag() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([])));
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    let cache = ResourceCache::new(transport.clone());

    let search = books_key().with_param("search", "dune");
    let page = books_key().with_param("page_size", 10);
    let genres = QueryKey::new(Tag::Genre, "genres/");

    let _a = cache.subscribe::<Value>(search.clone());
    let _b = cache.subscribe::<Value>(page.clone());
    let _c = cache.subscribe::<Value>(genres.clone());
    settle().await;
    cache.poll();

    assert_eq!(cache.invalidate(Tag::Book), 2);
    assert!(cache.get(&search).unwrap().stale);
    assert!(cache.get(&page).unwrap().stale);
    assert!(!cache.get(&genres).unwrap().stale);
  }

  #[tokio::test]
  async fn test_new_subscriber_never_sees_stale_data() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([1])));
    let cache = ResourceCache::new(transport.clone());

    let mut first = cache.subscribe::<Vec<u64>>(books_key());
    settle().await;
    cache.poll();
    first.poll();

    cache.invalidate(Tag::Book);
    transport.respond(Verb::Get, "books/", Ok(json!([1, 2])));

    let mut second = cache.subscribe::<Vec<u64>>(books_key());
    assert!(second.data().is_none(), "stale data must be withheld");
    assert!(second.is_loading());
    assert_eq!(first.data(), Some(&vec![1]));

    settle().await;
    cache.poll();
    second.poll();
    first.poll();
    assert_eq!(second.data(), Some(&vec![1, 2]));
    assert_eq!(first.data(), Some(&vec![1, 2]));
    assert_eq!(transport.count(Verb::Get, "books/"), 2);
  }

  #[tokio::test]
  async fn test_error_is_stored_and_not_retried_automatically() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "genres/", Err(ApiError::network("offline")));
    let cache = ResourceCache::new(transport.clone());
    let key = QueryKey::new(Tag::Genre, "genres/");

    let mut sub = cache.subscribe::<Value>(key.clone());
    settle().await;
    cache.poll();
    sub.poll();

    assert!(sub.is_error());
    assert_eq!(sub.error(), Some(&ApiError::network("offline")));

    // Polling again does not retry
    settle().await;
    cache.poll();
    sub.poll();
    assert_eq!(transport.count(Verb::Get, "genres/"), 1);

    // A new subscription does
    transport.respond(Verb::Get, "genres/", Ok(json!([])));
    let _retry = cache.subscribe::<Value>(key.clone());
    assert_eq!(transport.count(Verb::Get, "genres/"), 2);
  }

  #[tokio::test]
  async fn test_failure_keeps_previous_data() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([5])));
    let cache = ResourceCache::new(transport.clone());

    let mut sub = cache.subscribe::<Vec<u64>>(books_key());
    settle().await;
    cache.poll();
    sub.poll();

    transport.respond(Verb::Get, "books/", Err(ApiError::server(500, "boom")));
    sub.refetch();
    settle().await;
    cache.poll();
    sub.poll();

    assert!(sub.is_error());
    assert_eq!(sub.data(), Some(&vec![5]));
    assert_eq!(
      cache.get(&books_key()).unwrap().data.as_deref(),
      Some(&json!([5]))
    );
  }

  /// Known race: completions are applied in arrival order, so a slow
  /// response to an older request overwrites a newer one.
  #[tokio::test]
  async fn test_last_completion_wins_not_last_request() {
    let transport = FakeTransport::new();
    let older = transport.gate(Verb::Get, "books/");
    let newer = transport.gate(Verb::Get, "books/");
    let cache = ResourceCache::new(transport.clone());

    let mut sub = cache.subscribe::<String>(books_key());
    cache.invalidate(Tag::Book);
    sub.poll();
    assert_eq!(transport.count(Verb::Get, "books/"), 2);

    newer.send(Ok(json!("newer"))).unwrap();
    settle().await;
    cache.poll();
    sub.poll();
    assert_eq!(sub.data().map(String::as_str), Some("newer"));

    older.send(Ok(json!("older"))).unwrap();
    settle().await;
    cache.poll();
    sub.poll();

    assert_eq!(sub.data().map(String::as_str), Some("older"));
    let entry = cache.get(&books_key()).unwrap();
    assert_eq!(entry.data.as_deref(), Some(&json!("older")));
    // The older request predates the invalidation and does not reset it
    assert!(!entry.stale);
  }

  #[tokio::test]
  async fn test_fetch_issued_before_invalidation_leaves_entry_stale() {
    let transport = FakeTransport::new();
    let gate = transport.gate(Verb::Get, "books/");
    let cache = ResourceCache::new(transport.clone());

    let sub = cache.subscribe::<Value>(books_key());
    cache.invalidate(Tag::Book);

    gate.send(Ok(json!([1]))).unwrap();
    settle().await;
    cache.poll();

    let entry = cache.get(&books_key()).unwrap();
    assert_eq!(entry.status, FetchStatus::Success);
    assert!(entry.stale);
    drop(sub);
  }

  #[tokio::test]
  async fn test_unused_entries_are_pruned_after_retention() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([])));
    let cache = ResourceCache::new(transport.clone()).with_keep_unused_for(Duration::from_secs(30));

    let sub = cache.subscribe::<Value>(books_key());
    settle().await;
    cache.poll();
    assert_eq!(cache.len(), 1);

    drop(sub);
    assert_eq!(cache.subscriber_count(&books_key()), 0);
    assert_eq!(cache.prune(Instant::now()), 0);
    assert_eq!(cache.prune(Instant::now() + Duration::from_secs(31)), 1);
    assert!(cache.get(&books_key()).is_none());
  }

  #[tokio::test]
  async fn test_resubscribe_cancels_eviction() {
    let transport = FakeTransport::new();
    transport.respond(Verb::Get, "books/", Ok(json!([])));
    let cache = ResourceCache::new(transport.clone()).with_keep_unused_for(Duration::from_secs(30));

    drop(cache.subscribe::<Value>(books_key()));
    let _again = cache.subscribe::<Value>(books_key());

    assert_eq!(cache.prune(Instant::now() + Duration::from_secs(120)), 0);
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test]
  async fn test_completion_for_evicted_entry_is_dropped() {
    let transport = FakeTransport::new();
    let gate = transport.gate(Verb::Get, "books/");
    let cache = ResourceCache::new(transport.clone()).with_keep_unused_for(Duration::ZERO);

    drop(cache.subscribe::<Value>(books_key()));
    cache.prune(Instant::now() + Duration::from_secs(1));

    gate.send(Ok(json!([1]))).unwrap();
    settle().await;
    assert_eq!(cache.poll(), 0);
    assert!(cache.get(&books_key()).is_none());
  }
}
