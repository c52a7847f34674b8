//! Input forms for the write endpoints.

use serde_json::{json, Value};

use crate::api::types::{Book, Genre};
use crate::derive::genre_label;
use crate::error::ApiError;

fn required(value: &str, field: &str) -> Result<(), ApiError> {
  if value.trim().is_empty() {
    Err(ApiError::validation(format!("{} is required", field)))
  } else {
    Ok(())
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookForm {
  pub title: String,
  pub author: String,
  /// Genre name, resolved against the genre list on submit
  pub genre: String,
  pub description: String,
}

impl BookForm {
  pub fn from_book(book: &Book) -> Self {
    let genre = match genre_label(book) {
      "Unknown" => String::new(),
      name => name.to_string(),
    };
    Self {
      title: book.title.clone(),
      author: book.author.clone(),
      genre,
      description: book.description.clone().unwrap_or_default(),
    }
  }

  /// Id of the named genre, matched case-insensitively.
  pub fn resolve_genre(&self, genres: &[Genre]) -> Result<u64, ApiError> {
    let wanted = self.genre.trim();
    genres
      .iter()
      .find(|g| g.name.eq_ignore_ascii_case(wanted))
      .map(|g| g.id)
      .ok_or_else(|| ApiError::validation(format!("Unknown genre \"{}\"", wanted)))
  }

  pub fn validate(&self, genres: &[Genre]) -> Result<(), ApiError> {
    required(&self.title, "Title")?;
    required(&self.author, "Author")?;
    required(&self.genre, "Genre")?;
    self.resolve_genre(genres).map(|_| ())
  }

  pub fn payload(&self, genres: &[Genre]) -> Result<Value, ApiError> {
    self.validate(genres)?;
    Ok(json!({
      "title": self.title.trim(),
      "author": self.author.trim(),
      "genre": self.resolve_genre(genres)?,
      "description": self.description.trim(),
    }))
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenreForm {
  pub name: String,
}

impl GenreForm {
  pub fn validate(&self) -> Result<(), ApiError> {
    required(&self.name, "Name")
  }

  pub fn payload(&self) -> Result<Value, ApiError> {
    self.validate()?;
    Ok(json!({ "name": self.name.trim() }))
  }
}

pub const DEFAULT_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewForm {
  pub book: u64,
  pub rating: u8,
  pub comment: String,
}

impl ReviewForm {
  pub fn new(book: u64) -> Self {
    Self {
      book,
      rating: DEFAULT_RATING,
      comment: String::new(),
    }
  }

  /// Parse a typed rating, `"4"` or `"****"`.
  pub fn parse_rating(text: &str) -> Result<u8, ApiError> {
    let text = text.trim();
    if text.is_empty() {
      return Ok(DEFAULT_RATING);
    }
    let rating = if text.chars().all(|c| c == '*') {
      // Saturates, so a long run of stars stays out of range
      u8::try_from(text.len()).unwrap_or(u8::MAX)
    } else {
      text
        .parse::<u8>()
        .map_err(|_| ApiError::validation(format!("Rating must be a number, got \"{}\"", text)))?
    };
    if (1..=5).contains(&rating) {
      Ok(rating)
    } else {
      Err(ApiError::validation("Rating must be between 1 and 5"))
    }
  }

  pub fn validate(&self) -> Result<(), ApiError> {
    if (1..=5).contains(&self.rating) {
      Ok(())
    } else {
      Err(ApiError::validation("Rating must be between 1 and 5"))
    }
  }

  pub fn payload(&self) -> Result<Value, ApiError> {
    self.validate()?;
    Ok(json!({
      "book": self.book,
      "rating": self.rating,
      "comment": self.comment.trim(),
    }))
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginForm {
  pub username: String,
  pub password: String,
}

impl LoginForm {
  pub fn payload(&self) -> Result<Value, ApiError> {
    required(&self.username, "Username")?;
    required(&self.password, "Password")?;
    Ok(json!({
      "username": self.username.trim(),
      "password": self.password,
    }))
  }
}

/// The email doubles as the username.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterForm {
  pub email: String,
  pub password: String,
  pub first_name: String,
  pub last_name: String,
}

impl RegisterForm {
  pub fn payload(&self) -> Result<Value, ApiError> {
    required(&self.email, "Email")?;
    if !self.email.contains('@') {
      return Err(ApiError::validation("Email is not valid"));
    }
    required(&self.password, "Password")?;
    let email = self.email.trim();
    Ok(json!({
      "username": email,
      "email": email,
      "password": self.password,
      "first_name": self.first_name.trim(),
      "last_name": self.last_name.trim(),
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn genres() -> Vec<Genre> {
    vec![
      Genre {
        id: 1,
        name: "Fiction".to_string(),
        created_at: None,
      },
      Genre {
        id: 2,
        name: "Science Fiction".to_string(),
        created_at: None,
      },
    ]
  }

  #[test]
  fn test_book_payload_resolves_genre_name() {
    let form = BookForm {
      title: " 1984 ".to_string(),
      author: "George Orwell".to_string(),
      genre: "science fiction".to_string(),
      description: String::new(),
    };
    let payload = form.payload(&genres()).unwrap();
    assert_eq!(payload["genre"], 2);
    assert_eq!(payload["title"], "1984");
  }

  #[test]
  fn test_book_requires_fields_and_known_genre() {
    let mut form = BookForm {
      title: "Emma".to_string(),
      ..Default::default()
    };
    assert_eq!(
      form.validate(&genres()),
      Err(ApiError::validation("Author is required"))
    );
    form.author = "Jane Austen".to_string();
    form.genre = "Romance".to_string();
    assert!(matches!(form.validate(&genres()), Err(ApiError::Validation { .. })));
  }

  #[test]
  fn test_book_form_prefills_from_book() {
    let book: Book = serde_json::from_value(json!({
      "id": 4, "title": "The Hobbit", "author": "J.R.R. Tolkien",
      "genre": {"id": 5, "name": "Fantasy"}, "description": "There and back"
    }))
    .unwrap();
    let form = BookForm::from_book(&book);
    assert_eq!(form.genre, "Fantasy");
    assert_eq!(form.description, "There and back");
  }

  #[test]
  fn test_rating_parsing() {
    assert_eq!(ReviewForm::parse_rating(""), Ok(5));
    assert_eq!(ReviewForm::parse_rating("3"), Ok(3));
    assert_eq!(ReviewForm::parse_rating("**"), Ok(2));
    assert!(ReviewForm::parse_rating("0").is_err());
    assert!(ReviewForm::parse_rating("6").is_err());
    assert!(ReviewForm::parse_rating("great").is_err());
    assert_eq!(
      ReviewForm::parse_rating(&"*".repeat(261)),
      Err(ApiError::validation("Rating must be between 1 and 5"))
    );
    assert!(ReviewForm::parse_rating("******").is_err());
  }

  #[test]
  fn test_review_defaults_and_payload() {
    let mut form = ReviewForm::new(9);
    assert_eq!(form.rating, 5);
    form.comment = "  Loved it ".to_string();
    assert_eq!(
      form.payload().unwrap(),
      json!({"book": 9, "rating": 5, "comment": "Loved it"})
    );
    form.rating = 0;
    assert!(form.payload().is_err());
  }

  #[test]
  fn test_register_uses_email_as_username() {
    let form = RegisterForm {
      email: "ada@example.com".to_string(),
      password: "pw".to_string(),
      first_name: "Ada".to_string(),
      last_name: "Lovelace".to_string(),
    };
    let payload = form.payload().unwrap();
    assert_eq!(payload["username"], "ada@example.com");
    assert_eq!(payload["email"], "ada@example.com");

    let bad = RegisterForm {
      email: "ada".to_string(),
      ..form
    };
    assert!(bad.payload().is_err());
  }

  #[test]
  fn test_genre_and_login_require_values() {
    assert!(GenreForm::default().payload().is_err());
    assert!(LoginForm {
      username: "ada".to_string(),
      password: String::new()
    }
    .payload()
    .is_err());
  }
}
