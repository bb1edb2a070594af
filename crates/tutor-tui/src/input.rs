use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use tutor_core::history::CommandHistory;

/// Actions produced by key input handling.
#[derive(Debug, PartialEq, Eq)]
pub enum InputAction {
    /// Enter pressed; carries the trimmed line, possibly empty.
    Submit(String),
    /// Esc: abort whatever is in flight.
    Cancel,
    /// Ctrl+C: cancel if busy, otherwise quit.
    Interrupt,
    ScrollUp,
    ScrollDown,
    /// No-op (key was handled internally).
    None,
}

/// Single-line input buffer with history recall.
///
/// `cursor` is a byte offset that always sits on a char boundary.
pub struct InputHandler {
    pub buffer: String,
    pub cursor: usize,
    history: CommandHistory,
}

impl InputHandler {
    pub fn new(history: CommandHistory) -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            history,
        }
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Column of the cursor in characters.
    pub fn cursor_column(&self) -> usize {
        self.buffer[..self.cursor].chars().count()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        match key.code {
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.buffer);
                self.cursor = 0;
                self.history.add(&text);
                self.history.reset_navigation();

                InputAction::Submit(text.trim().to_string())
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                InputAction::Interrupt
            }
            KeyCode::Esc => InputAction::Cancel,
            KeyCode::Up => {
                let recalled = self.history.navigate_up(&self.buffer);
                self.set_buffer(recalled);
                InputAction::None
            }
            KeyCode::Down => {
                let recalled = self.history.navigate_down(&self.buffer);
                self.set_buffer(recalled);
                InputAction::None
            }
            KeyCode::Char(c) => {
                self.buffer.insert(self.cursor, c);
                self.cursor += c.len_utf8();
                InputAction::None
            }
            KeyCode::Backspace => {
                if let Some(prev) = self.prev_boundary() {
                    self.buffer.remove(prev);
                    self.cursor = prev;
                }
                InputAction::None
            }
            KeyCode::Delete => {
                if self.cursor < self.buffer.len() {
                    self.buffer.remove(self.cursor);
                }
                InputAction::None
            }
            KeyCode::Left => {
                if let Some(prev) = self.prev_boundary() {
                    self.cursor = prev;
                }
                InputAction::None
            }
            KeyCode::Right => {
                if let Some(c) = self.buffer[self.cursor..].chars().next() {
                    self.cursor += c.len_utf8();
                }
                InputAction::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                InputAction::None
            }
            KeyCode::End => {
                self.cursor = self.buffer.len();
                InputAction::None
            }
            KeyCode::PageUp => InputAction::ScrollUp,
            KeyCode::PageDown => InputAction::ScrollDown,
            _ => InputAction::None,
        }
    }

    fn set_buffer(&mut self, text: String) {
        self.buffer = text;
        self.cursor = self.buffer.len();
    }

    fn prev_boundary(&self) -> Option<usize> {
        self.buffer[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
    }
}
