use super::input::{InputResult, TextInput};
use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

/// Events emitted by the form that parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  /// Enter on the last field; values in field order
  Submitted(Vec<String>),
  Cancelled,
}

#[derive(Debug, Clone)]
struct FormField {
  label: &'static str,
  input: TextInput,
}

/// Multi-field form. Stays open after submitting so the parent can show an
/// error, and is hidden by the parent once the submission succeeds.
#[derive(Debug, Clone, Default)]
pub struct FormPanel {
  title: String,
  fields: Vec<FormField>,
  focused: usize,
  active: bool,
  busy: bool,
  hint: Option<String>,
  error: Option<String>,
}

impl FormPanel {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Open with `(label, initial value)` fields.
  pub fn show(&mut self, title: impl Into<String>, fields: &[(&'static str, &str)]) {
    self.title = title.into();
    self.fields = fields
      .iter()
      .map(|(label, value)| FormField {
        label,
        input: TextInput::with_value(*value),
      })
      .collect();
    self.focused = 0;
    self.active = true;
    self.busy = false;
    self.hint = None;
    self.error = None;
  }

  pub fn hide(&mut self) {
    self.active = false;
    self.busy = false;
    self.fields.clear();
    self.error = None;
  }

  /// Extra line under the fields, e.g. valid choices
  pub fn set_hint(&mut self, hint: impl Into<String>) {
    self.hint = Some(hint.into());
  }

  pub fn set_error(&mut self, error: impl Into<String>) {
    self.busy = false;
    self.error = Some(error.into());
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn set_busy(&mut self) {
    self.busy = true;
    self.error = None;
  }

  pub fn values(&self) -> Vec<String> {
    self.fields.iter().map(|f| f.input.value().to_string()).collect()
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    if !self.active {
      return KeyResult::NotHandled;
    }
    if self.busy {
      // Only allow closing while a submission is in flight
      if key.code == KeyCode::Esc {
        self.hide();
        return KeyResult::Event(FormEvent::Cancelled);
      }
      return KeyResult::Handled;
    }

    match key.code {
      KeyCode::Tab | KeyCode::Down => {
        self.focused = (self.focused + 1) % self.fields.len().max(1);
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        let count = self.fields.len().max(1);
        self.focused = (self.focused + count - 1) % count;
        return KeyResult::Handled;
      }
      _ => {}
    }

    let last = self.fields.len().saturating_sub(1);
    let Some(field) = self.fields.get_mut(self.focused) else {
      return KeyResult::Handled;
    };

    match field.input.handle_key(key) {
      InputResult::Cancelled => {
        self.hide();
        KeyResult::Event(FormEvent::Cancelled)
      }
      InputResult::Submitted(_) if self.focused < last => {
        self.focused += 1;
        KeyResult::Handled
      }
      InputResult::Submitted(_) => KeyResult::Event(FormEvent::Submitted(self.values())),
      InputResult::Consumed | InputResult::NotHandled => KeyResult::Handled,
    }
  }

  /// Render centered over `area`.
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }
    let width = (area.width * 70 / 100).clamp(40, 80).min(area.width);
    let height = (self.fields.len() as u16 + 6).min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);
    self.render_in(frame, overlay_area);
  }

  /// Render filling `area`.
  pub fn render_in(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let label_width = self.fields.iter().map(|f| f.label.len()).max().unwrap_or(0) + 2;
    let mut lines: Vec<Line> = self
      .fields
      .iter()
      .enumerate()
      .map(|(i, field)| {
        let focused = i == self.focused;
        let label_style = if focused {
          Style::default().fg(Color::Yellow).bold()
        } else {
          Style::default().fg(Color::DarkGray)
        };
        let mut spans = vec![Span::styled(
          format!("{:>width$}: ", field.label, width = label_width),
          label_style,
        )];
        if focused {
          let (before, after) = field.input.split_at_cursor();
          spans.push(Span::raw(before.to_string()));
          spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
          spans.push(Span::raw(after.to_string()));
        } else {
          spans.push(Span::raw(field.input.value().to_string()));
        }
        Line::from(spans)
      })
      .collect();

    lines.push(Line::raw(""));
    if let Some(hint) = &self.hint {
      lines.push(Line::styled(hint.clone(), Style::default().fg(Color::DarkGray)));
    }
    if let Some(error) = &self.error {
      lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    } else if self.busy {
      lines.push(Line::styled("Saving...", Style::default().fg(Color::Yellow)));
    } else {
      lines.push(Line::styled(
        "Tab: next field  Enter: next/submit  Esc: cancel",
        Style::default().fg(Color::DarkGray),
      ));
    }

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
  }
}
