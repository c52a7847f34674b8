//! Query keys for the read endpoints.

use crate::cache::{QueryKey, Tag};

/// Availability filter on the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
  #[default]
  All,
  Available,
  Borrowed,
}

impl Availability {
  pub fn next(self) -> Self {
    match self {
      Self::All => Self::Available,
      Self::Available => Self::Borrowed,
      Self::Borrowed => Self::All,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::All => "all",
      Self::Available => "available",
      Self::Borrowed => "borrowed",
    }
  }

  fn param(self) -> Option<&'static str> {
    match self {
      Self::All => None,
      Self::Available => Some("true"),
      Self::Borrowed => Some("false"),
    }
  }
}

/// Catalog filters. Unset fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilters {
  pub search: String,
  pub genre: Option<String>,
  pub author: String,
  pub availability: Availability,
  pub page_size: Option<u32>,
}

impl BookFilters {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

pub fn books(filters: &BookFilters) -> QueryKey {
  let mut key = QueryKey::new(Tag::Book, "books/")
    .with_param("search", &filters.search)
    .with_param("author", &filters.author);
  if let Some(genre) = &filters.genre {
    key = key.with_param("genre__name", genre);
  }
  if let Some(available) = filters.availability.param() {
    key = key.with_param("available", available);
  }
  if let Some(page_size) = filters.page_size {
    key = key.with_param("page_size", page_size);
  }
  key
}

pub fn book(id: u64) -> QueryKey {
  QueryKey::new(Tag::Book, format!("books/{}/", id))
}

pub fn recommendations() -> QueryKey {
  QueryKey::new(Tag::Book, "books/recommendations/")
}

/// Borrows not yet returned, large enough a page to hold them all.
pub fn active_borrows(page_size: u32) -> QueryKey {
  QueryKey::new(Tag::Borrow, "borrows/")
    .with_param("returned", false)
    .with_param("page_size", page_size)
}

pub fn borrow_history() -> QueryKey {
  QueryKey::new(Tag::Borrow, "borrows/history/")
}

pub fn genres() -> QueryKey {
  QueryKey::new(Tag::Genre, "genres/")
}

pub fn user_stats() -> QueryKey {
  QueryKey::new(Tag::User, "profile/stats/")
}

pub fn reviews(book_id: u64) -> QueryKey {
  QueryKey::new(Tag::Review, "reviews/").with_param("book", book_id)
}
