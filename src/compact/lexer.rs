//! Lexical analyzer for compact syntax schemas.
//!
//! Whitespace, comments (including `##` documentation) and annotations
//! (`[...]` blocks and `>> name [...]` follow annotations) are dropped. Token
//! positions count columns in UTF-16 units; CR, LF and CRLF all end a line.

use super::CompactError;
use super::token::{Pos, RncToken, Token, lookup_keyword};

/// Lexes `source` into tokens ending with [`RncToken::Eof`]. The first
/// lexical error stops the scan.
pub fn lex(source: &str) -> Result<Vec<Token>, CompactError> {
    let mut lexer = Lexer {
        source,
        pos: 0,
        line: 1,
        column: 1,
    };
    lexer.lex_all()
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl Lexer<'_> {
    fn lex_all(&mut self) -> Result<Vec<Token>, CompactError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let here = self.here();
            match self.peek() {
                Some(c) => tokens.push(self.next_token(c, here)?),
                None => {
                    tokens.push(Token::new(RncToken::Eof, here, ""));
                    return Ok(tokens);
                }
            }
        }
    }

    fn here(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\r' if self.peek() != Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            _ => self.column += c.len_utf16() as u32,
        }
        Some(c)
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.bump();
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.bump();
        }
    }

    fn skip_trivia(&mut self) -> Result<(), CompactError> {
        loop {
            self.skip_spaces();
            match self.peek() {
                Some('#') => self.skip_line(),
                Some('[') => self.skip_annotation()?,
                Some('>') if self.peek_at(1) == Some('>') => {
                    let start = self.here();
                    self.bump();
                    self.bump();
                    self.skip_spaces();
                    let name_len = self.source[self.pos..]
                        .chars()
                        .take_while(|&c| is_name_char(c) || c == ':')
                        .count();
                    if name_len == 0 {
                        return Err(CompactError::new(start, "expected an annotation name after '>>'"));
                    }
                    for _ in 0..name_len {
                        self.bump();
                    }
                    self.skip_spaces();
                    if self.peek() != Some('[') {
                        return Err(CompactError::new(start, "expected '[' after annotation name"));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_annotation(&mut self) -> Result<(), CompactError> {
        let start = self.here();
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '[' => {
                    depth += 1;
                    self.bump();
                }
                ']' => {
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                '"' | '\'' => {
                    let here = self.here();
                    self.lex_literal(here)?;
                }
                '#' => self.skip_line(),
                _ => {
                    self.bump();
                }
            }
        }
        Err(CompactError::new(start, "unterminated annotation"))
    }

    fn next_token(&mut self, c: char, here: Pos) -> Result<Token, CompactError> {
        let punct = |lexer: &mut Self, kind: RncToken, len: usize| -> Result<Token, CompactError> {
            for _ in 0..len {
                lexer.bump();
            }
            Ok(Token::new(kind, here, ""))
        };
        match c {
            '=' => punct(self, RncToken::Assign, 1),
            '|' if self.peek_at(1) == Some('=') => punct(self, RncToken::ChoiceAssign, 2),
            '&' if self.peek_at(1) == Some('=') => punct(self, RncToken::InterleaveAssign, 2),
            '|' => punct(self, RncToken::Pipe, 1),
            '&' => punct(self, RncToken::Amp, 1),
            '{' => punct(self, RncToken::LeftBrace, 1),
            '}' => punct(self, RncToken::RightBrace, 1),
            '(' => punct(self, RncToken::LeftParen, 1),
            ')' => punct(self, RncToken::RightParen, 1),
            ',' => punct(self, RncToken::Comma, 1),
            '?' => punct(self, RncToken::Question, 1),
            '*' => punct(self, RncToken::Star, 1),
            '+' => punct(self, RncToken::Plus, 1),
            '-' => punct(self, RncToken::Minus, 1),
            '~' => punct(self, RncToken::Tilde, 1),
            '"' | '\'' => {
                let value = self.lex_literal(here)?;
                Ok(Token::new(RncToken::Literal, here, value))
            }
            '\\' => {
                self.bump();
                match self.peek() {
                    Some(c) if is_name_start(c) => {
                        let name = self.lex_ncname();
                        Ok(Token::new(RncToken::Identifier, here, name))
                    }
                    _ => Err(CompactError::new(here, "expected a name after '\\'")),
                }
            }
            c if is_name_start(c) => Ok(self.lex_name(here)),
            c => Err(CompactError::new(here, format!("unexpected character '{c}'"))),
        }
    }

    fn lex_ncname(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !is_name_char(c) {
                break;
            }
            name.push(c);
            self.bump();
        }
        name
    }

    fn lex_name(&mut self, here: Pos) -> Token {
        let name = self.lex_ncname();
        if self.peek() == Some(':') {
            match self.peek_at(1) {
                Some('*') => {
                    self.bump();
                    self.bump();
                    return Token::new(RncToken::NsName, here, name);
                }
                Some(c) if is_name_start(c) => {
                    self.bump();
                    let local = self.lex_ncname();
                    return Token::new(RncToken::CName, here, format!("{name}:{local}"));
                }
                _ => {}
            }
        }
        let kind = lookup_keyword(&name).unwrap_or(RncToken::Identifier);
        Token::new(kind, here, name)
    }

    /// Reads a single- or triple-quoted literal and returns its value with
    /// `\x{...}` escapes decoded.
    fn lex_literal(&mut self, here: Pos) -> Result<String, CompactError> {
        let Some(quote) = self.bump() else {
            return Err(CompactError::new(here, "expected a literal"));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(CompactError::new(here, "unterminated literal"));
            };
            if c == quote {
                if !triple {
                    return Ok(value);
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.bump();
                    self.bump();
                    return Ok(value);
                }
            } else if !triple && (c == '\n' || c == '\r') {
                return Err(CompactError::new(here, "newline in literal"));
            } else if c == '\\' {
                value.push(self.lex_escape()?);
                continue;
            }
            value.push(c);
        }
    }

    /// Decodes `\x{HEX}` after the backslash; a backslash starting anything
    /// else stands for itself.
    fn lex_escape(&mut self) -> Result<char, CompactError> {
        let here = self.here();
        let mut xs = 0;
        while self.peek_at(xs) == Some('x') {
            xs += 1;
        }
        if xs == 0 || self.peek_at(xs) != Some('{') {
            return Ok('\\');
        }
        for _ in 0..=xs {
            self.bump();
        }
        let mut hex = String::new();
        loop {
            match self.bump() {
                Some('}') => break,
                Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                _ => return Err(CompactError::new(here, "malformed character escape")),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| CompactError::new(here, format!("invalid character escape \\x{{{hex}}}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<RncToken> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(kinds(""), vec![RncToken::Eof]);
        assert_eq!(kinds("  \t\r\n # comment\n## doc\n"), vec![RncToken::Eof]);
    }

    #[test]
    fn test_keywords_names_and_escapes() {
        assert_eq!(
            kinds(r"element \element doc db:title db:* start-tag"),
            vec![
                RncToken::Element,
                RncToken::Identifier,
                RncToken::Identifier,
                RncToken::CName,
                RncToken::NsName,
                RncToken::Identifier,
                RncToken::Eof,
            ]
        );
        let tokens = lex(r"\element db:title db:*").unwrap();
        assert_eq!(tokens[0].text, "element");
        assert_eq!(tokens[1].text, "db:title");
        assert_eq!(tokens[2].text, "db");
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds("= |= &= | & {}(),?*+-~"),
            vec![
                RncToken::Assign,
                RncToken::ChoiceAssign,
                RncToken::InterleaveAssign,
                RncToken::Pipe,
                RncToken::Amp,
                RncToken::LeftBrace,
                RncToken::RightBrace,
                RncToken::LeftParen,
                RncToken::RightParen,
                RncToken::Comma,
                RncToken::Question,
                RncToken::Star,
                RncToken::Plus,
                RncToken::Minus,
                RncToken::Tilde,
                RncToken::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        let tokens = lex("\"a'b\" 'c\"d' \"\"\"one\ntwo\"\"\" \"\\x{48}\\x{1F600}\\n\"").unwrap();
        assert_eq!(tokens[0].text, "a'b");
        assert_eq!(tokens[1].text, "c\"d");
        assert_eq!(tokens[2].text, "one\ntwo");
        assert_eq!(tokens[3].text, "H\u{1F600}\\n");
        assert!(tokens[..4].iter().all(|t| t.kind == RncToken::Literal));
    }

    #[test]
    fn test_annotations_are_dropped() {
        assert_eq!(
            kinds("[ a:doc = \"]\" [ nested ] ] element x { text >> a:note [ \"n\" ] }"),
            vec![
                RncToken::Element,
                RncToken::Identifier,
                RncToken::LeftBrace,
                RncToken::Text,
                RncToken::RightBrace,
                RncToken::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_count_utf16_columns() {
        let err = lex("\u{1F600} = text").unwrap_err();
        assert_eq!(err.pos, Pos::new(1, 1));

        let tokens = lex("x = \"\u{1F600}\" ~ text\r\n  a\rb").unwrap();
        let positions: Vec<Pos> = tokens.iter().map(|t| t.pos).collect();
        assert_eq!(
            positions,
            vec![
                Pos::new(1, 1),
                Pos::new(1, 3),
                Pos::new(1, 5),
                Pos::new(1, 10),
                Pos::new(1, 12),
                Pos::new(2, 3),
                Pos::new(3, 1),
                Pos::new(3, 2),
            ]
        );
    }

    #[test]
    fn test_lexical_errors() {
        let err = lex("start = \"open").unwrap_err();
        assert_eq!(err.pos, Pos::new(1, 9));
        assert_eq!(err.message, "unterminated literal");

        let err = lex("start =\n  \"a\nb\"").unwrap_err();
        assert_eq!(err.pos, Pos::new(2, 3));
        assert_eq!(err.message, "newline in literal");

        let err = lex("start = [ a:b = \"x\" ").unwrap_err();
        assert_eq!(err.message, "unterminated annotation");

        let err = lex("x = \"\\x{D800}\"").unwrap_err();
        assert!(err.message.starts_with("invalid character escape"));
    }
}
