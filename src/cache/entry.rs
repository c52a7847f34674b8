use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ApiError;

/// Where an entry is in its fetch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
  /// Created but nothing requested yet
  Idle,
  /// A fetch is in flight
  Loading,
  /// The last completed fetch succeeded
  Success,
  /// The last completed fetch failed
  Error,
}

/// Snapshot of one cached server response and its fetch state.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// Last successfully fetched payload. Kept across failures.
  pub data: Option<Arc<Value>>,
  pub status: FetchStatus,
  /// Error of the last failed fetch, cleared by the next success
  pub error: Option<ApiError>,
  /// Set by invalidation, cleared when a fetch issued after it settles
  pub stale: bool,
  /// Bumped on every change to data or status
  pub revision: u64,
  pub fetched_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
  pub(super) fn new() -> Self {
    Self {
      data: None,
      status: FetchStatus::Idle,
      error: None,
      stale: false,
      revision: 0,
      fetched_at: None,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.status == FetchStatus::Loading
  }

  /// Successful, not stale.
  #[cfg(test)]
  pub fn is_fresh(&self) -> bool {
    self.status == FetchStatus::Success && !self.stale
  }

  pub(super) fn touch(&mut self) {
    self.revision = self.revision.wrapping_add(1);
  }
}
