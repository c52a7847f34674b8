use crate::api::types::User;
use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with logo, server, signed-in user and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  user: Option<&User>,
  notice: Option<&str>,
  shortcuts: &[ShortcutInfo],
) {
  let line = header_line(title, user, notice, shortcuts);
  let paragraph = Paragraph::new(line).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

fn header_line(
  title: &str,
  user: Option<&User>,
  notice: Option<&str>,
  shortcuts: &[ShortcutInfo],
) -> Line<'static> {
  let mut spans = vec![
    Span::styled(" booklend ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", title), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
  ];

  match user {
    Some(user) => {
      spans.push(Span::styled(
        format!(" {} ", user.display_name()),
        Style::default().fg(Color::Yellow).bold(),
      ));
      if user.is_admin() {
        spans.push(Span::styled("[admin] ", Style::default().fg(Color::Magenta)));
      }
    }
    None => spans.push(Span::styled(" signed out ", Style::default().fg(Color::DarkGray))),
  }

  if let Some(notice) = notice {
    spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(format!(" {} ", notice), Style::default().fg(Color::Red)));
  }

  spans.push(Span::raw(" "));

  let mut shortcuts: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  shortcuts.sort_by_key(|s| s.priority);
  // Shortcuts - keys and brackets highlighted, descriptions dimmed
  for shortcut in shortcuts {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  Line::from(spans)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn text(line: &Line) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
  }

  #[test]
  fn test_shortcuts_sorted_by_priority() {
    let shortcuts = [
      ShortcutInfo::new("q", "back").with_priority(90),
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("b", "borrow"),
    ];
    let line = text(&header_line("library", None, None, &shortcuts));
    let command = line.find("<:>").unwrap();
    let back = line.find("<q>").unwrap();
    let borrow = line.find("<b>").unwrap();
    assert!(command < back && back < borrow);
    assert!(line.contains("signed out"));
  }

  #[test]
  fn test_admin_badge_and_notice() {
    let admin = User {
      username: "root".to_string(),
      is_staff: true,
      ..Default::default()
    };
    let line = text(&header_line("library", Some(&admin), Some("Signed out"), &[]));
    assert!(line.contains("root"));
    assert!(line.contains("[admin]"));
    assert!(line.contains("Signed out"));
  }
}
