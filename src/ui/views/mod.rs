mod book_detail;
mod book_form;
mod book_list;
mod borrowed;
mod dashboard;
mod genre_list;
mod recommendations;

pub use book_detail::BookDetailView;
pub use book_form::BookFormView;
pub use book_list::BookListView;
pub use borrowed::BorrowedView;
pub use dashboard::DashboardView;
pub use genre_list::GenreListView;
pub use recommendations::RecommendationsView;

use crate::api::types::{Book, Borrow, ListResponse};
use crate::cache::{FetchStatus, Subscription};
use crate::derive::{borrowed_book_ids, is_borrowed_by_user, BorrowAction};
use crate::mutation::MutationArgs;
use crate::ui::components::MutationSlot;
use crate::ui::AppContext;
use std::collections::HashSet;

/// Ids of the books the user holds, from the active-borrows subscription.
fn held_book_ids(borrows: &Subscription<ListResponse<Borrow>>) -> HashSet<u64> {
  borrows
    .data()
    .map(|b| borrowed_book_ids(b.items()))
    .unwrap_or_default()
}

fn borrow_action(book: &Book, held: &HashSet<u64>) -> BorrowAction {
  BorrowAction::for_book(book, is_borrowed_by_user(held, book.id))
}

/// Borrow or return `book`, whichever applies.
fn toggle_borrow(ctx: &AppContext, slot: &mut MutationSlot, book: &Book, held: &HashSet<u64>) {
  match borrow_action(book, held).descriptor() {
    Some(descriptor) => slot.start(ctx.mutations.submit(descriptor, MutationArgs::id(book.id))),
    None => slot.set_error(format!("\"{}\" is not available", book.title)),
  }
}

/// Block title with the fetch state appended.
fn titled<T>(label: &str, subscription: &Subscription<T>, count: Option<usize>) -> String {
  match subscription.status() {
    FetchStatus::Loading | FetchStatus::Idle if subscription.data().is_none() => {
      format!(" {} (loading...) ", label)
    }
    FetchStatus::Loading => format!(" {} (refreshing...) ", label),
    FetchStatus::Error => match subscription.error() {
      Some(err) => format!(" {} (error: {}) ", label, err.user_message()),
      None => format!(" {} (error) ", label),
    },
    _ => match count {
      Some(count) => format!(" {} ({}) ", label, count),
      None => format!(" {} ", label),
    },
  }
}

/// Second press of a destructive key within the same selection confirms it.
#[derive(Debug, Default)]
struct ConfirmDelete {
  armed: Option<u64>,
}

impl ConfirmDelete {
  /// Returns true when `id` was already armed.
  fn press(&mut self, id: u64) -> bool {
    if self.armed == Some(id) {
      self.armed = None;
      true
    } else {
      self.armed = Some(id);
      false
    }
  }

  fn reset(&mut self) {
    self.armed = None;
  }
}

#[cfg(test)]
mod test_support {
  use crate::api::Verb;
  use crate::cache::testing::FakeTransport;
  use crate::cache::ResourceCache;
  use crate::mutation::MutationExecutor;
  use crate::ui::AppContext;
  use crate::api::types::User;
  use std::sync::Arc;

  pub fn context(transport: &Arc<FakeTransport>, admin: bool) -> AppContext {
    let cache = ResourceCache::new(transport.clone());
    AppContext {
      mutations: MutationExecutor::new(transport.clone(), cache.clone()),
      cache,
      user: Some(User {
        username: "ada".to_string(),
        is_staff: admin,
        ..Default::default()
      }),
      borrow_page_size: 100,
    }
  }

  /// Responses for the catalog and borrows lists every list view reads.
  pub fn library(transport: &FakeTransport) {
    transport.respond(
      Verb::Get,
      "books/",
      Ok(serde_json::json!({"count": 2, "results": [
        {"id": 1, "title": "Dune", "author": "Herbert", "genre_name": "Science Fiction",
         "available": true, "read_count": 4},
        {"id": 2, "title": "Emma", "author": "Austen", "genre_name": "Romance",
         "available": false, "read_count": 9}
      ]})),
    );
    transport.respond(
      Verb::Get,
      "borrows/",
      Ok(serde_json::json!({"count": 1, "results": [
        {"id": 7, "book": {"id": 2, "title": "Emma", "available": false},
         "borrowed_on": "2024-01-02T10:00:00Z", "returned": false}
      ]})),
    );
  }
}
