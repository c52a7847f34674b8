//! Resource tags and query keys.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Query parameters, ordered so equal parameter sets hash equally.
pub type Params = BTreeMap<String, String>;

/// Category of server-side data. Invalidation works on whole tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
  Book,
  Borrow,
  User,
  Genre,
  Review,
}

impl Tag {
  pub const ALL: [Tag; 5] = [Tag::Book, Tag::Borrow, Tag::User, Tag::Genre, Tag::Review];

  pub fn as_str(&self) -> &'static str {
    match self {
      Tag::Book => "Book",
      Tag::Borrow => "Borrow",
      Tag::User => "User",
      Tag::Genre => "Genre",
      Tag::Review => "Review",
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identifies one cache entry: the tag it provides, the endpoint path and
/// the query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  tag: Tag,
  path: String,
  params: Params,
}

impl QueryKey {
  pub fn new(tag: Tag, path: impl Into<String>) -> Self {
    Self {
      tag,
      path: path.into(),
      params: Params::new(),
    }
  }

  /// Add a query parameter. Empty values are dropped so that an unset
  /// filter and a missing filter share one entry.
  pub fn with_param(mut self, name: &str, value: impl ToString) -> Self {
    let value = value.to_string();
    if !value.trim().is_empty() {
      self.params.insert(name.to_string(), value);
    }
    self
  }

  pub fn tag(&self) -> Tag {
    self.tag
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  /// Stable, fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut input = format!("{}:{}", self.tag, self.path);
    for (name, value) in &self.params {
      input.push_str(&format!("&{}={}", name, value));
    }

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Short human-readable form for logs.
  pub fn description(&self) -> String {
    if self.params.is_empty() {
      format!("{} {}", self.tag, self.path)
    } else {
      let params: Vec<String> = self
        .params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
      format!("{} {}?{}", self.tag, self.path, params.join("&"))
    }
  }
}
