//! Language-agnostic tokenizer.
//!
//! Produces identifiers, string literals, numbers and single-character
//! punctuation with 1-based line/column positions. Comments are kept aside
//! so route documentation can be recovered from them.

use crate::frameworks::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    /// `text` holds the literal's contents without quotes
    Str,
    Number,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.len() == c.len_utf8() && self.text.starts_with(c)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

impl Lexed {
    /// Comment block ending on the line right above `line`, with adjacent
    /// line comments merged.
    pub fn documentation_above(&self, line: u32) -> Option<String> {
        let idx = self
            .comments
            .iter()
            .rposition(|c| c.end_line + 1 == line)?;
        let mut start = idx;
        while start > 0 && self.comments[start - 1].end_line + 1 == self.comments[start].start_line
        {
            start -= 1;
        }
        let text = self.comments[start..=idx]
            .iter()
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentStyle {
    /// `#` line comments (Python)
    Hash,
    /// `//` and `/* */`
    CLike,
    /// `//`, `#` and `/* */`
    Php,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    language: Language,
    style: CommentStyle,
}

impl Lexer {
    pub fn new(source: &str, language: Language) -> Self {
        let style = match language {
            Language::Python => CommentStyle::Hash,
            Language::Php => CommentStyle::Php,
            _ => CommentStyle::CLike,
        };
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            language,
            style,
        }
    }

    pub fn tokenize(source: &str, language: Language) -> Lexed {
        Lexer::new(source, language).run()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn run(mut self) -> Lexed {
        let mut out = Lexed::default();

        while let Some(c) = self.peek(0) {
            let (line, column) = (self.line, self.column);

            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if let Some(comment) = self.try_comment() {
                out.comments.push(comment);
                continue;
            }

            if let Some(text) = self.try_string() {
                out.tokens.push(Token {
                    kind: TokenKind::Str,
                    text,
                    line,
                    column,
                });
                continue;
            }

            if is_ident_start(c) {
                let mut text = String::new();
                while let Some(c) = self.peek(0).filter(|c| is_ident_continue(*c)) {
                    text.push(c);
                    self.bump();
                }
                out.tokens.push(Token {
                    kind: TokenKind::Ident,
                    text,
                    line,
                    column,
                });
                continue;
            }

            if c.is_ascii_digit() {
                let mut text = String::new();
                while let Some(c) = self
                    .peek(0)
                    .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_')
                {
                    text.push(c);
                    self.bump();
                }
                out.tokens.push(Token {
                    kind: TokenKind::Number,
                    text,
                    line,
                    column,
                });
                continue;
            }

            self.bump();
            out.tokens.push(Token {
                kind: TokenKind::Punct,
                text: c.to_string(),
                line,
                column,
            });
        }

        out
    }

    fn try_comment(&mut self) -> Option<Comment> {
        let c = self.peek(0)?;
        let next = self.peek(1);
        let start_line = self.line;

        let line_comment = match self.style {
            CommentStyle::Hash => c == '#',
            CommentStyle::CLike => c == '/' && next == Some('/'),
            // `#[` opens a PHP 8 attribute
            CommentStyle::Php => (c == '/' && next == Some('/')) || (c == '#' && next != Some('[')),
        };
        if line_comment {
            let mut text = String::new();
            while let Some(c) = self.peek(0).filter(|c| *c != '\n') {
                text.push(c);
                self.bump();
            }
            return Some(Comment {
                text: strip_comment_markers(&text),
                start_line,
                end_line: start_line,
            });
        }

        if self.style != CommentStyle::Hash && c == '/' && next == Some('*') {
            self.bump();
            self.bump();
            let mut text = String::new();
            while let Some(c) = self.peek(0) {
                if c == '*' && self.peek(1) == Some('/') {
                    self.bump();
                    self.bump();
                    break;
                }
                text.push(c);
                self.bump();
            }
            let end_line = self.line;
            let text = text
                .lines()
                .map(|l| l.trim().trim_start_matches('*').trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            return Some(Comment {
                text,
                start_line,
                end_line,
            });
        }

        None
    }

    fn try_string(&mut self) -> Option<String> {
        let c = self.peek(0)?;
        match self.language {
            Language::Python => self.try_python_string(),
            Language::Rust => {
                if c == 'r' || c == 'b' {
                    return self.try_rust_prefixed_string();
                }
                if c == '\'' {
                    return self.try_rust_char();
                }
                if c == '"' {
                    return Some(self.quoted('"'));
                }
                None
            }
            Language::Go => match c {
                '"' | '\'' => Some(self.quoted(c)),
                '`' => Some(self.raw_until('`')),
                _ => None,
            },
            Language::JavaScript => match c {
                '"' | '\'' | '`' => Some(self.quoted(c)),
                _ => None,
            },
            Language::Php => match c {
                '"' | '\'' => Some(self.quoted(c)),
                _ => None,
            },
        }
    }

    /// Consumes a quoted literal with backslash escapes, opening quote
    /// included. Unterminated literals end at end of input.
    fn quoted(&mut self, quote: char) -> String {
        self.bump();
        let mut text = String::new();
        while let Some(c) = self.bump() {
            if c == '\\' {
                if let Some(escaped) = self.bump() {
                    text.push('\\');
                    text.push(escaped);
                }
                continue;
            }
            if c == quote {
                break;
            }
            text.push(c);
        }
        text
    }

    fn raw_until(&mut self, quote: char) -> String {
        self.bump();
        let mut text = String::new();
        while let Some(c) = self.bump() {
            if c == quote {
                break;
            }
            text.push(c);
        }
        text
    }

    fn try_python_string(&mut self) -> Option<String> {
        // Up to two prefix letters: r, b, u, f in any combination
        let mut prefix_len = 0;
        while prefix_len < 2
            && self
                .peek(prefix_len)
                .map(|c| matches!(c.to_ascii_lowercase(), 'r' | 'b' | 'u' | 'f'))
                .unwrap_or(false)
        {
            prefix_len += 1;
        }
        let quote = self.peek(prefix_len).filter(|c| *c == '"' || *c == '\'')?;
        if prefix_len > 0 {
            // Part of a longer identifier such as `bar'`
            if self.pos > 0 && self.chars.get(self.pos - 1).map(|c| is_ident_continue(*c)) == Some(true) {
                return None;
            }
        }
        let raw = (0..prefix_len).any(|i| self.peek(i).map(|c| c.eq_ignore_ascii_case(&'r')) == Some(true));
        for _ in 0..prefix_len {
            self.bump();
        }

        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        if triple {
            self.bump();
            self.bump();
            self.bump();
            let mut text = String::new();
            while self.peek(0).is_some() {
                if self.peek(0) == Some(quote)
                    && self.peek(1) == Some(quote)
                    && self.peek(2) == Some(quote)
                {
                    self.bump();
                    self.bump();
                    self.bump();
                    break;
                }
                if let Some(c) = self.bump() {
                    text.push(c);
                }
            }
            return Some(text);
        }

        if raw {
            return Some(self.raw_until(quote));
        }
        Some(self.quoted(quote))
    }

    fn try_rust_prefixed_string(&mut self) -> Option<String> {
        let mut offset = 0;
        if self.peek(offset) == Some('b') {
            offset += 1;
        }
        let is_raw = self.peek(offset) == Some('r');
        if is_raw {
            offset += 1;
        }
        let mut hashes = 0;
        while is_raw && self.peek(offset + hashes) == Some('#') {
            hashes += 1;
        }
        if self.peek(offset + hashes) != Some('"') || offset == 0 {
            return None;
        }
        if self.pos > 0 && self.chars.get(self.pos - 1).map(|c| is_ident_continue(*c)) == Some(true) {
            return None;
        }
        for _ in 0..offset {
            self.bump();
        }
        if !is_raw {
            return Some(self.quoted('"'));
        }
        for _ in 0..hashes {
            self.bump();
        }
        self.bump();
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            if c == '"' && (0..hashes).all(|i| self.peek(1 + i) == Some('#')) {
                for _ in 0..=hashes {
                    self.bump();
                }
                break;
            }
            text.push(c);
            self.bump();
        }
        Some(text)
    }

    /// Char literals only; a lone `'` is a lifetime or label marker.
    fn try_rust_char(&mut self) -> Option<String> {
        let is_char = match self.peek(1) {
            Some('\\') => true,
            Some(_) => self.peek(2) == Some('\''),
            None => false,
        };
        if is_char {
            Some(self.quoted('\''))
        } else {
            None
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn strip_comment_markers(text: &str) -> String {
    text.trim_start_matches('/')
        .trim_start_matches('#')
        .trim_start_matches('!')
        .trim()
        .to_string()
}
