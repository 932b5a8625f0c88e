use super::Value;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    /// `data_<name>` block header
    Data(String),
    Loop,
    Tag(String),
    Value(Value),
    /// `save_`, `global_` and `stop_`, none of which occur in PDB archive files
    Reserved(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character of the token
    pub start: usize,
    /// Byte offset one past the last character of the token
    pub end: usize,
    pub line: usize,
}

/// Splits CIF 1.1 text into tokens while remembering their byte spans.
///
/// All delimiters in CIF are ASCII, so byte offsets found here are always
/// valid `str` boundaries even when values contain UTF-8.
pub(crate) struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    /// Offset of the first character after an optional byte order mark
    first: usize,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        let first = if src.starts_with('\u{feff}') { '\u{feff}'.len_utf8() } else { 0 };
        Self {
            src,
            bytes: src.as_bytes(),
            first,
            pos: first,
            line: 1,
        }
    }

    fn at_line_start(&self) -> bool {
        self.pos == self.first || matches!(self.bytes[self.pos - 1], b'\n' | b'\r')
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'#' => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn text_field(&mut self) -> Result<Token, Error> {
        let start = self.pos;
        let line = self.line;
        let body_start = start + 1;
        let Some(offset) = self.src[body_start..].find("\n;") else {
            return Err(Error::parse(line, "unterminated ';' text field"));
        };
        let body = &self.src[body_start..body_start + offset];
        let body = body.strip_suffix('\r').unwrap_or(body);

        self.line += body.matches('\n').count() + 1;
        self.pos = body_start + offset + 2;
        Ok(Token {
            kind: TokenKind::Value(Value::Text(body.to_string())),
            start,
            end: self.pos,
            line,
        })
    }

    fn quoted(&mut self, quote: u8) -> Result<Token, Error> {
        let start = self.pos;
        let mut i = start + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\n' | b'\r' => break,
                c if c == quote => {
                    let closes = self
                        .bytes
                        .get(i + 1)
                        .map_or(true, |next| next.is_ascii_whitespace());
                    if closes {
                        self.pos = i + 1;
                        return Ok(Token {
                            kind: TokenKind::Value(Value::Text(self.src[start + 1..i].to_string())),
                            start,
                            end: self.pos,
                            line: self.line,
                        });
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(Error::parse(self.line, "unterminated quoted string"))
    }

    fn bare(&mut self) -> Token {
        let start = self.pos;
        while self.pos < self.bytes.len() && !self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        let lower = text.to_ascii_lowercase();

        let kind = if lower.starts_with("data_") {
            TokenKind::Data(text[5..].to_string())
        } else if lower == "loop_" {
            TokenKind::Loop
        } else if lower.starts_with("save_") || lower.starts_with("global_") || lower == "stop_" {
            TokenKind::Reserved(text.to_string())
        } else if text.starts_with('_') {
            TokenKind::Tag(text.to_string())
        } else if text == "?" {
            TokenKind::Value(Value::Unknown)
        } else if text == "." {
            TokenKind::Value(Value::Inapplicable)
        } else {
            TokenKind::Value(Value::Text(text.to_string()))
        };

        Token {
            kind,
            start,
            end: self.pos,
            line: self.line,
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.bytes.len() {
            return None;
        }

        let token = match self.bytes[self.pos] {
            b';' if self.at_line_start() => self.text_field(),
            q @ (b'\'' | b'"') => self.quoted(q),
            _ => Ok(self.bare()),
        };
        if token.is_err() {
            // Stop after the first error instead of resynchronising
            self.pos = self.bytes.len();
        }
        Some(token)
    }
}
