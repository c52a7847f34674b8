use chrono::{DateTime, Utc};
use ratatui::prelude::Color;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for a book's availability
pub fn availability_color(available: bool) -> Color {
  if available {
    Color::Green
  } else {
    Color::Red
  }
}

pub fn format_date(date: DateTime<Utc>) -> String {
  date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Cien años de soledad", 10), "Cien añ...");
  }

  #[test]
  fn test_availability_color() {
    assert_eq!(availability_color(true), Color::Green);
    assert_eq!(availability_color(false), Color::Red);
  }

  #[test]
  fn test_format_date() {
    let date = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap();
    assert_eq!(format_date(date), "2024-03-09");
  }
}
