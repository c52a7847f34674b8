//! Values computed from cached responses for display.
//!
//! Everything here is pure and recomputed from the current subscription
//! data on each render.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::api::types::{Book, Borrow, ListResponse, Review, UserStats};
use crate::mutation::{MutationDescriptor, BORROW_BOOK, RETURN_BOOK};

/// Days a borrower may keep a book.
pub const LOAN_PERIOD_DAYS: i64 = 30;

/// Books shown in the dashboard's popular list.
pub const POPULAR_LIMIT: usize = 3;

/// Ids of books the user currently holds.
pub fn borrowed_book_ids(borrows: &[Borrow]) -> HashSet<u64> {
  borrows
    .iter()
    .filter(|b| !b.returned)
    .map(|b| b.book.id)
    .collect()
}

pub fn is_borrowed_by_user(borrowed_ids: &HashSet<u64>, book_id: u64) -> bool {
  borrowed_ids.contains(&book_id)
}

/// Most read books first. Ties keep their server order.
pub fn popular_books(books: &[Book], limit: usize) -> Vec<&Book> {
  let mut sorted: Vec<&Book> = books.iter().collect();
  sorted.sort_by(|a, b| b.read_count.cmp(&a.read_count));
  sorted.truncate(limit);
  sorted
}

pub fn has_reviewed(reviews: &[Review], username: &str) -> bool {
  reviews.iter().any(|r| r.user == username)
}

pub fn due_date(borrowed_on: DateTime<Utc>) -> DateTime<Utc> {
  borrowed_on + Duration::days(LOAN_PERIOD_DAYS)
}

pub fn is_overdue(borrowed_on: DateTime<Utc>, now: DateTime<Utc>) -> bool {
  now > due_date(borrowed_on)
}

/// `genre_name`, else the nested genre's name, else "Unknown".
pub fn genre_label(book: &Book) -> &str {
  book
    .genre_name
    .as_deref()
    .or_else(|| book.genre.as_ref().and_then(|g| g.name()))
    .unwrap_or("Unknown")
}

pub fn rating_stars(rating: f64) -> String {
  let full = rating.round().clamp(0.0, 5.0) as usize;
  format!("{}{}", "★".repeat(full), "☆".repeat(5 - full))
}

/// What the borrow key does for a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowAction {
  Borrow,
  Return,
  Unavailable,
}

impl BorrowAction {
  pub fn for_book(book: &Book, borrowed_by_user: bool) -> Self {
    if borrowed_by_user {
      Self::Return
    } else if book.available {
      Self::Borrow
    } else {
      Self::Unavailable
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Borrow => "Borrow",
      Self::Return => "Return",
      Self::Unavailable => "Unavailable",
    }
  }

  pub fn descriptor(self) -> Option<&'static MutationDescriptor> {
    match self {
      Self::Borrow => Some(&BORROW_BOOK),
      Self::Return => Some(&RETURN_BOOK),
      Self::Unavailable => None,
    }
  }
}

/// Numbers on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
  pub library_books: u64,
  pub total_read: u64,
  pub reviews_written: u64,
  pub currently_borrowed: u64,
}

impl DashboardStats {
  pub fn new(books: Option<&ListResponse<Book>>, stats: Option<&UserStats>) -> Self {
    Self {
      library_books: books.map(ListResponse::total).unwrap_or(0),
      total_read: stats.map(|s| s.total_books_borrowed).unwrap_or(0),
      reviews_written: stats.map(|s| s.reviews_written).unwrap_or(0),
      currently_borrowed: stats.map(|s| s.currently_borrowed).unwrap_or(0),
    }
  }
}
