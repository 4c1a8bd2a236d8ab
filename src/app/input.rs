use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::*;

const SCROLL_STEP: u16 = 5;

impl App {
    pub(super) fn handle_key_event(&mut self, key: KeyEvent) {
        match self.mode {
            Mode::Confirm => self.handle_confirm_key(key),
            Mode::Normal => self.handle_normal_key(key),
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => self.confirm_pending(),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.cancel_pending(),
            _ => {}
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter
                if key.modifiers.contains(KeyModifiers::SHIFT)
                    || key.modifiers.contains(KeyModifiers::ALT) =>
            {
                self.insert_input_str("\n");
            }
            KeyCode::Enter => self.submit_current_line(),
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Char('y') if ctrl => self.copy_latest_snippet(),
            KeyCode::Char('t') if ctrl => self.toggle_latest_reasoning(),
            KeyCode::Char('u') if ctrl => self.clear_input_buffer(),
            KeyCode::Char(ch) => self.insert_input_char(ch),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Left => self.move_cursor_left(),
            KeyCode::Right => self.move_cursor_right(),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.input.len(),
            KeyCode::Up => self.history_prev(),
            KeyCode::Down => self.history_next(),
            KeyCode::PageUp => self.scroll_up(SCROLL_STEP),
            KeyCode::PageDown => self.scroll_down(SCROLL_STEP),
            KeyCode::Esc => self.clear_input_buffer(),
            _ => {}
        }
    }

    pub(super) fn handle_paste_event(&mut self, data: &str) {
        let normalized = data.replace("\r\n", "\n").replace('\r', "\n");
        self.insert_input_str(&normalized);
    }

    fn insert_input_char(&mut self, ch: char) {
        self.input.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn insert_input_str(&mut self, s: &str) {
        self.input.insert_str(self.cursor, s);
        self.cursor += s.len();
    }

    pub(super) fn clear_input_buffer(&mut self) {
        self.input.clear();
        self.cursor = 0;
        self.history_pos = None;
    }

    fn prev_char_boundary(&self) -> usize {
        self.input[..self.cursor]
            .char_indices()
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let start = self.prev_char_boundary();
        self.input.replace_range(start..self.cursor, "");
        self.cursor = start;
    }

    fn delete_forward(&mut self) {
        if self.cursor >= self.input.len() {
            return;
        }
        let len = self.input[self.cursor..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(0);
        self.input
            .replace_range(self.cursor..self.cursor + len, "");
    }

    fn move_cursor_left(&mut self) {
        if self.cursor > 0 {
            self.cursor = self.prev_char_boundary();
        }
    }

    fn move_cursor_right(&mut self) {
        if let Some(ch) = self.input[self.cursor..].chars().next() {
            self.cursor += ch.len_utf8();
        }
    }

    pub(super) fn push_history(&mut self, line: String) {
        if self.history.last() != Some(&line) {
            self.history.push(line);
        }
        self.history_pos = None;
    }

    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let pos = match self.history_pos {
            None => self.history.len() - 1,
            Some(0) => 0,
            Some(p) => p - 1,
        };
        self.history_pos = Some(pos);
        self.input = self.history[pos].clone();
        self.cursor = self.input.len();
    }

    fn history_next(&mut self) {
        match self.history_pos {
            Some(p) if p + 1 < self.history.len() => {
                self.history_pos = Some(p + 1);
                self.input = self.history[p + 1].clone();
                self.cursor = self.input.len();
            }
            Some(_) => {
                self.history_pos = None;
                self.input.clear();
                self.cursor = 0;
            }
            None => {}
        }
    }
}
