/// Single-line text field with a character-based cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    text: String,
    cursor: usize,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl TextInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, s: &str) {
        for c in s.chars().filter(|c| !c.is_control()) {
            self.insert(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    /// Take the text out, leaving the field empty
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn clear(&mut self) {
        self.take();
    }

    /// Visible slice and cursor column for a field `width` characters wide.
    /// Scrolls horizontally so the cursor stays in view.
    pub fn visible(&self, width: usize) -> (String, usize) {
        let offset = if width == 0 || self.cursor < width {
            0
        } else {
            self.cursor - width + 1
        };
        let slice = self.text.chars().skip(offset).take(width).collect();
        (slice, self.cursor - offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(s: &str) -> TextInput {
        let mut input = TextInput::new();
        input.insert_str(s);
        input
    }

    #[test]
    fn test_insert_and_backspace_multibyte() {
        let mut input = typed("añb");
        input.left();
        input.backspace();
        assert_eq!(input.text(), "ab");
        assert_eq!(input.cursor(), 1);
    }

    #[test]
    fn test_delete_at_cursor() {
        let mut input = typed("abc");
        input.home();
        input.delete();
        assert_eq!(input.text(), "bc");
        input.end();
        input.delete();
        assert_eq!(input.text(), "bc");
    }

    #[test]
    fn test_paste_drops_control_characters() {
        let input = typed("line one\nline two\r");
        assert_eq!(input.text(), "line oneline two");
    }

    #[test]
    fn test_take_resets_cursor() {
        let mut input = typed("hello");
        assert_eq!(input.take(), "hello");
        assert_eq!(input.cursor(), 0);
        assert!(input.is_blank());
    }

    #[test]
    fn test_visible_scrolls_with_cursor() {
        let input = typed("abcdefgh");
        let (slice, col) = input.visible(4);
        assert_eq!(slice, "fgh");
        assert_eq!(col, 3);

        let mut input = input;
        input.home();
        let (slice, col) = input.visible(4);
        assert_eq!(slice, "abcd");
        assert_eq!(col, 0);
    }
}
