//! Serde types matching the library API's JSON documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// List envelopes
// ============================================================================

/// A list endpoint response.
///
/// Paginated endpoints answer `{"count": n, "results": [...]}`, others a bare
/// array. Both decode into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
  Paginated {
    count: u64,
    results: Vec<T>,
  },
  Bare(Vec<T>),
}

impl<T> ListResponse<T> {
  /// Total number of items on the server (`count` for envelopes).
  pub fn total(&self) -> u64 {
    match self {
      Self::Paginated { count, .. } => *count,
      Self::Bare(items) => items.len() as u64,
    }
  }

  /// Items delivered in this response.
  pub fn items(&self) -> &[T] {
    match self {
      Self::Paginated { results, .. } => results,
      Self::Bare(items) => items,
    }
  }

  pub fn into_items(self) -> Vec<T> {
    match self {
      Self::Paginated { results, .. } => results,
      Self::Bare(items) => items,
    }
  }
}

impl<T> Default for ListResponse<T> {
  fn default() -> Self {
    Self::Bare(Vec::new())
  }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
  pub id: u64,
  pub name: String,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub created_at: Option<DateTime<Utc>>,
}

/// A book's genre, which the API sends either nested or as a bare id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BookGenre {
  Nested { id: u64, name: String },
  Id(u64),
}

impl BookGenre {
  pub fn id(&self) -> u64 {
    match self {
      Self::Nested { id, .. } => *id,
      Self::Id(id) => *id,
    }
  }

  pub fn name(&self) -> Option<&str> {
    match self {
      Self::Nested { name, .. } => Some(name),
      Self::Id(_) => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
  pub id: u64,
  pub title: String,
  #[serde(default)]
  pub author: String,
  #[serde(default)]
  pub genre: Option<BookGenre>,
  #[serde(default)]
  pub genre_name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub available: bool,
  #[serde(default)]
  pub read_count: u64,
  #[serde(default)]
  pub average_rating: Option<f64>,
  #[serde(default)]
  pub image: Option<String>,
}

/// `GET books/recommendations/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub books: Vec<Book>,
}

// ============================================================================
// Lending
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Borrow {
  pub id: u64,
  pub book: Book,
  #[serde(deserialize_with = "timestamp::required")]
  pub borrowed_on: DateTime<Utc>,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub returned_on: Option<DateTime<Utc>>,
  #[serde(default)]
  pub returned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  pub id: u64,
  pub book: u64,
  /// Username of the reviewer.
  pub user: String,
  pub rating: u8,
  #[serde(default)]
  pub comment: String,
  #[serde(default, deserialize_with = "timestamp::optional")]
  pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreCount {
  #[serde(rename = "book__genre__name")]
  pub name: String,
  #[serde(default)]
  pub count: u64,
}

/// `GET profile/stats/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
  #[serde(default)]
  pub currently_borrowed: u64,
  #[serde(default)]
  pub total_books_borrowed: u64,
  #[serde(default)]
  pub reviews_written: u64,
  #[serde(default)]
  pub favorite_genres: Vec<GenreCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
  #[serde(default)]
  pub id: u64,
  pub username: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  #[serde(default)]
  pub is_staff: bool,
  #[serde(default)]
  pub is_superuser: bool,
}

impl User {
  pub fn is_admin(&self) -> bool {
    self.is_staff || self.is_superuser
  }

  /// First name when known, username otherwise.
  pub fn display_name(&self) -> &str {
    if self.first_name.is_empty() {
      &self.username
    } else {
      &self.first_name
    }
  }
}

/// Response of `login/` and `register/`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
  pub user: User,
  pub access: String,
  #[serde(default)]
  #[allow(dead_code)]
  pub refresh: Option<String>,
}

/// Timestamps as the API writes them: RFC 3339, a naive date-time, or a
/// bare date taken as midnight UTC.
mod timestamp {
  use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
  use serde::de::Error;
  use serde::{Deserialize, Deserializer};

  pub fn parse(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
      return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
      return Some(at.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
      .ok()
      .and_then(|date| date.and_hms_opt(0, 0, 0))
      .map(|at| at.and_utc())
  }

  pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse(&text).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", text)))
  }

  pub fn optional<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
      None => Ok(None),
      Some(text) => parse(&text)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", text))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{NaiveDate, TimeZone};
  use serde_json::json;

  #[test]
  fn test_date_only_borrows_decode() {
    let borrows: ListResponse<Borrow> = serde_json::from_value(json!({
      "count": 2,
      "results": [
        {"id": 1, "book": {"id": 1, "title": "Dune"}, "borrowed_on": "2024-01-15"},
        {"id": 2, "book": {"id": 2, "title": "Emma"},
          "borrowed_on": "2024-01-10T09:30:00Z", "returned_on": "2024-01-20T18:00:00.123456"}
      ]
    }))
    .unwrap();

    let items = borrows.items();
    assert_eq!(items[0].borrowed_on, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
    assert_eq!(items[0].returned_on, None);
    assert_eq!(items[1].borrowed_on, Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap());
    assert_eq!(
      items[1].returned_on.map(|at| at.date_naive()),
      NaiveDate::from_ymd_opt(2024, 1, 20)
    );
  }

  #[test]
  fn test_created_at_null_or_date() {
    let genre: Genre =
      serde_json::from_value(json!({"id": 1, "name": "Fiction", "created_at": null})).unwrap();
    assert_eq!(genre.created_at, None);

    let review: Review = serde_json::from_value(json!({
      "id": 1, "book": 1, "user": "ada", "rating": 4, "created_at": "2024-02-01"
    }))
    .unwrap();
    assert_eq!(review.created_at, Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));
  }

  #[test]
  fn test_garbage_timestamp_rejected() {
    let result = serde_json::from_value::<Borrow>(json!({
      "id": 1, "book": {"id": 1, "title": "Dune"}, "borrowed_on": "last tuesday"
    }));
    assert!(result.is_err());
  }

  #[test]
  fn test_paginated_and_bare_lists_agree() {
    let paginated: ListResponse<u64> =
      serde_json::from_value(json!({"count": 2, "results": [7, 9]})).unwrap();
    let bare: ListResponse<u64> = serde_json::from_value(json!([7, 9])).unwrap();

    assert_eq!(paginated.total(), 2);
    assert_eq!(bare.total(), 2);
    assert_eq!(paginated.items(), &[7, 9]);
    assert_eq!(paginated.items(), bare.items());
  }

  #[test]
  fn test_paginated_total_can_exceed_page() {
    let page: ListResponse<u64> =
      serde_json::from_value(json!({"count": 40, "results": [1, 2, 3]})).unwrap();
    assert_eq!(page.total(), 40);
    assert_eq!(page.items().len(), 3);
  }

  #[test]
  fn test_book_genre_nested_or_id() {
    let nested: Book = serde_json::from_value(json!({
      "id": 1, "title": "Dune", "genre": {"id": 4, "name": "Science Fiction"}
    }))
    .unwrap();
    let flat: Book = serde_json::from_value(json!({
      "id": 2, "title": "Emma", "genre": 3, "genre_name": "Romance"
    }))
    .unwrap();

    assert_eq!(nested.genre.as_ref().map(BookGenre::id), Some(4));
    assert_eq!(
      nested.genre.as_ref().and_then(BookGenre::name),
      Some("Science Fiction")
    );
    assert_eq!(flat.genre.as_ref().map(BookGenre::id), Some(3));
    assert_eq!(flat.genre_name.as_deref(), Some("Romance"));
    assert!(!flat.available);
  }

  #[test]
  fn test_user_stats_favorite_genres() {
    let stats: UserStats = serde_json::from_value(json!({
      "currently_borrowed": 1,
      "total_books_borrowed": 5,
      "reviews_written": 2,
      "favorite_genres": [{"book__genre__name": "Fantasy", "count": 3}]
    }))
    .unwrap();
    assert_eq!(stats.favorite_genres[0].name, "Fantasy");
    assert_eq!(stats.favorite_genres[0].count, 3);
  }

  #[test]
  fn test_admin_flags() {
    let user = User {
      username: "ada".to_string(),
      is_superuser: true,
      ..Default::default()
    };
    assert!(user.is_admin());
    assert_eq!(user.display_name(), "ada");
  }
}
