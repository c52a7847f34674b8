//! Sample catalog for an empty library.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::api::types::{Genre, ListResponse};
use crate::api::{endpoints, ApiRequest, Transport};
use crate::cache::Invalidations;
use crate::error::ApiError;
use crate::mutation::{MutationExecutor, PendingMutation, CREATE_BOOK, CREATE_GENRE};

pub const SAMPLE_GENRES: [&str; 5] = ["Fiction", "Science Fiction", "Romance", "Mystery", "Fantasy"];

pub struct SampleBook {
  pub title: &'static str,
  pub author: &'static str,
  pub genre: &'static str,
  pub description: &'static str,
}

pub static SAMPLE_BOOKS: [SampleBook; 5] = [
  SampleBook {
    title: "The Great Gatsby",
    author: "F. Scott Fitzgerald",
    genre: "Fiction",
    description: "A classic American novel",
  },
  SampleBook {
    title: "1984",
    author: "George Orwell",
    genre: "Science Fiction",
    description: "A dystopian masterpiece",
  },
  SampleBook {
    title: "Pride and Prejudice",
    author: "Jane Austen",
    genre: "Romance",
    description: "A timeless romance",
  },
  SampleBook {
    title: "The Hobbit",
    author: "J.R.R. Tolkien",
    genre: "Fantasy",
    description: "An epic fantasy adventure",
  },
  SampleBook {
    title: "Sherlock Holmes",
    author: "Arthur Conan Doyle",
    genre: "Mystery",
    description: "Classic detective stories",
  },
];

/// Create the missing sample genres, then every sample book, one request at
/// a time. Stops at the first failure.
///
/// Each successful create reports its own tags, so the steps that went
/// through before a failure are still invalidated.
pub async fn create_sample_data(
  transport: Arc<dyn Transport>,
  invalidations: Invalidations,
) -> Result<Value, ApiError> {
  let genres_key = endpoints::genres();
  let listing = transport
    .send(ApiRequest::get(genres_key.path(), genres_key.params().clone()))
    .await?;
  let existing = serde_json::from_value::<ListResponse<Genre>>(listing)?.into_items();

  let mut genre_ids: HashMap<&str, u64> = HashMap::new();
  let mut genres_created = 0;

  for name in SAMPLE_GENRES {
    if let Some(genre) = existing.iter().find(|g| g.name == name) {
      genre_ids.insert(name, genre.id);
      continue;
    }
    let request = ApiRequest::new(CREATE_GENRE.verb, CREATE_GENRE.path, Some(json!({ "name": name })));
    let created = transport.send(request).await?;
    invalidations.succeeded(CREATE_GENRE.name, CREATE_GENRE.invalidates);
    let genre: Genre = serde_json::from_value(created)?;
    genre_ids.insert(name, genre.id);
    genres_created += 1;
  }

  for book in &SAMPLE_BOOKS {
    let genre = genre_ids
      .get(book.genre)
      .copied()
      .ok_or_else(|| ApiError::validation(format!("no genre for {}", book.title)))?;
    let body = json!({
      "title": book.title,
      "author": book.author,
      "description": book.description,
      "genre": genre,
    });
    transport
      .send(ApiRequest::new(CREATE_BOOK.verb, CREATE_BOOK.path, Some(body)))
      .await?;
    invalidations.succeeded(CREATE_BOOK.name, CREATE_BOOK.invalidates);
  }

  info!(genres_created, books_created = SAMPLE_BOOKS.len(), "sample data created");
  Ok(json!({
    "genres_created": genres_created,
    "books_created": SAMPLE_BOOKS.len(),
  }))
}

/// Run the seeding as one background operation. Genres and books are
/// invalidated by the individual creates.
pub fn submit(executor: &MutationExecutor) -> PendingMutation {
  let invalidations = executor.cache().invalidations();
  executor.submit_task(
    "create sample data",
    &[],
    create_sample_data(executor.transport(), invalidations),
  )
}
