//! Statement splitting for multi-statement migration SQL.

use std::iter::Peekable;
use std::str::Chars;

/// Splits `sql` on `;` outside quotes, comments and trigger bodies.
///
/// Returned statements are trimmed and carry no trailing `;`. Pieces made
/// only of whitespace and comments are dropped.
pub(crate) fn split_statements(sql: &str) -> Vec<String> {
    let mut splitter = Splitter::default();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            splitter.word.push(ch);
            splitter.push_code(ch);
            continue;
        }
        splitter.close_word();

        match ch {
            '\'' | '"' | '`' => {
                splitter.push_code(ch);
                splitter.copy_until(&mut chars, ch);
            }
            '[' => {
                splitter.push_code(ch);
                splitter.copy_until(&mut chars, ']');
            }
            '-' if chars.peek() == Some(&'-') => {
                splitter.current.push(ch);
                splitter.copy_until(&mut chars, '\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                splitter.current.push(ch);
                splitter.copy_block_comment(&mut chars);
            }
            ';' if splitter.depth == 0 => splitter.finish_statement(),
            other if other.is_whitespace() => splitter.current.push(other),
            other => splitter.push_code(other),
        }
    }

    splitter.close_word();
    splitter.finish_statement();
    splitter.statements
}

#[derive(Default)]
struct Splitter {
    statements: Vec<String>,
    current: String,
    word: String,
    has_code: bool,
    in_trigger: bool,
    depth: usize,
}

impl Splitter {
    fn push_code(&mut self, ch: char) {
        self.current.push(ch);
        self.has_code = true;
    }

    /// Tracks `BEGIN ... END` in trigger bodies and `CASE ... END` anywhere.
    fn close_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let word = self.word.to_ascii_uppercase();
        match word.as_str() {
            "TRIGGER" => self.in_trigger = true,
            "BEGIN" if self.in_trigger => self.depth += 1,
            "CASE" => self.depth += 1,
            "END" if self.depth > 0 => self.depth -= 1,
            _ => {}
        }
        self.word.clear();
    }

    /// Copies through the closing `end` character, inclusive.
    fn copy_until(&mut self, chars: &mut Peekable<Chars<'_>>, end: char) {
        for ch in chars.by_ref() {
            self.current.push(ch);
            if ch == end {
                return;
            }
        }
    }

    fn copy_block_comment(&mut self, chars: &mut Peekable<Chars<'_>>) {
        // Opening `*`; it must not pair with a following `/`.
        if let Some(star) = chars.next() {
            self.current.push(star);
        }
        let mut previous = '\0';
        for ch in chars.by_ref() {
            self.current.push(ch);
            if previous == '*' && ch == '/' {
                return;
            }
            previous = ch;
        }
    }

    fn finish_statement(&mut self) {
        let statement = self.current.trim();
        if self.has_code && !statement.is_empty() {
            self.statements.push(statement.to_string());
        }
        self.current.clear();
        self.has_code = false;
        self.in_trigger = false;
        self.depth = 0;
    }
}
