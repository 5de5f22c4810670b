use std::str::Chars;

use itertools::{self, MultiPeek};
use thiserror::Error;

use crate::token::{Kind, Position, Token};

/// Error while scanning source code.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// A string literal is unterminated
    #[error("{0} Error: Unterminated string.")]
    UnterminatedString(Position),
    /// Invalid character
    #[error("{0} Error: Unexpected character '{1}'.")]
    UnexpectedCharacter(Position, char),
}

/// Scanner reads characters from the source code and groups them in to a
/// sequence of tokens.
///
/// Whitespace separates tokens and `--` starts a comment running to the end
/// of the line. String literals may span lines; the token carries the body
/// without the surrounding quotes.
#[derive(Debug)]
pub struct Scanner<'a> {
    src: MultiPeek<Chars<'a>>,
    lexeme: String,
    pos: Position,
}

impl<'a> IntoIterator for Scanner<'a> {
    type Item = Result<Token, ScanError>;
    type IntoIter = Iter<'a>;
    fn into_iter(self) -> Self::IntoIter {
        Iter { scanner: self }
    }
}

impl<'a> Scanner<'a> {
    /// Create a new scanner.
    pub fn new(src: &'a str) -> Self {
        let src = itertools::multipeek(src.chars());
        Self {
            src,
            lexeme: String::new(),
            pos: Position::default(),
        }
    }

    /// Consume and return the next token from source.
    pub fn scan(&mut self) -> Result<Option<Token>, ScanError> {
        self.skip_whitespace();
        self.lexeme.clear();
        let c = match self.advance() {
            None => return Ok(None),
            Some(c) => c,
        };

        Ok(Some(match c {
            '(' => self.make_token(Kind::LParen),
            ')' => self.make_token(Kind::RParen),
            '{' => self.make_token(Kind::LBrace),
            '}' => self.make_token(Kind::RBrace),
            ';' => self.make_token(Kind::Semicolon),
            ',' => self.make_token(Kind::Comma),
            '.' => self.make_token(Kind::Dot),
            '-' => self.make_token(Kind::Minus),
            '+' => self.make_token(Kind::Plus),
            '/' => self.make_token(Kind::Slash),
            '*' => self.make_token(Kind::Star),
            '!' => {
                if self.consume('=') {
                    self.make_token(Kind::BangEqual)
                } else {
                    self.make_token(Kind::Bang)
                }
            }
            '=' => {
                if self.consume('=') {
                    self.make_token(Kind::EqualEqual)
                } else {
                    self.make_token(Kind::Equal)
                }
            }
            '<' => {
                if self.consume('=') {
                    self.make_token(Kind::LessEqual)
                } else {
                    self.make_token(Kind::Less)
                }
            }
            '>' => {
                if self.consume('=') {
                    self.make_token(Kind::GreaterEqual)
                } else {
                    self.make_token(Kind::Greater)
                }
            }
            '"' => self.string()?,
            n if is_digit(n) => self.number(),
            c if is_alpha(c) => self.identifier(),
            c => {
                return Err(ScanError::UnexpectedCharacter(self.pos, c));
            }
        }))
    }

    fn identifier(&mut self) -> Token {
        while self.peek_check(|c| is_alpha(c) || is_digit(c)) {
            self.advance();
        }
        self.make_token(match self.lexeme.as_ref() {
            "and" => Kind::And,
            "break" => Kind::Break,
            "do" => Kind::Do,
            "else" => Kind::Else,
            "elseif" => Kind::Elseif,
            "end" => Kind::End,
            "false" => Kind::False,
            "for" => Kind::For,
            "function" => Kind::Function,
            "if" => Kind::If,
            "in" => Kind::In,
            "local" => Kind::Local,
            "nil" => Kind::Nil,
            "not" => Kind::Not,
            "or" => Kind::Or,
            "repeat" => Kind::Repeat,
            "return" => Kind::Return,
            "then" => Kind::Then,
            "true" => Kind::True,
            "until" => Kind::Until,
            "while" => Kind::While,
            _ => Kind::Ident,
        })
    }

    fn number(&mut self) -> Token {
        while self.peek_check(is_digit) {
            self.advance();
        }
        if self.peek_check(|c| c == '.') && self.peek_next_check(is_digit) {
            self.advance();
            while self.peek_check(is_digit) {
                self.advance();
            }
        }
        self.make_token(Kind::Number)
    }

    fn string(&mut self) -> Result<Token, ScanError> {
        while self.peek_check(|c| c != '"') {
            self.advance();
        }
        if self.peek().is_none() {
            return Err(ScanError::UnterminatedString(self.pos));
        }
        self.advance();
        // The token carries the body only, not the delimiters.
        let body = self.lexeme[1..self.lexeme.len() - 1].to_string();
        self.lexeme.clear();
        Ok(Token {
            kind: Kind::String,
            lexeme: body,
            pos: self.pos,
        })
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\r' | '\t' | '\n' => {
                    self.advance();
                }
                '-' => {
                    if !self.peek_next_check(|c| c == '-') {
                        return;
                    }
                    while self.peek_check(|c| c != '\n') {
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn peek_check<F: Fn(char) -> bool>(&mut self, check: F) -> bool {
        self.peek().map(check).unwrap_or(false)
    }

    fn peek_next_check<F: Fn(char) -> bool>(&mut self, check: F) -> bool {
        self.peek_next().map(check).unwrap_or(false)
    }

    fn peek(&mut self) -> Option<char> {
        self.src.reset_peek();
        self.src.peek().copied()
    }

    fn peek_next(&mut self) -> Option<char> {
        self.src.reset_peek();
        match self.src.peek() {
            None => None,
            Some(_) => self.src.peek().copied(),
        }
    }

    fn advance(&mut self) -> Option<char> {
        self.src.next().map(|c| {
            self.lexeme.push(c);
            if c == '\n' {
                self.pos.next_line();
            } else {
                self.pos.next_column();
            }
            c
        })
    }

    fn consume(&mut self, expected: char) -> bool {
        match self.peek() {
            None => false,
            Some(c) if c != expected => false,
            _ => {
                self.advance();
                true
            }
        }
    }

    fn make_token(&mut self, kind: Kind) -> Token {
        Token {
            kind,
            lexeme: self.lexeme.drain(..).collect(),
            pos: self.pos,
        }
    }
}

/// An iterator over the scanner's tokens.
#[derive(Debug)]
pub struct Iter<'a> {
    scanner: Scanner<'a>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<Token, ScanError>;
    fn next(&mut self) -> Option<Self::Item> {
        self.scanner.scan().transpose()
    }
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Kind> {
        Scanner::new(src)
            .into_iter()
            .map(|t| t.unwrap().kind)
            .collect()
    }

    #[test]
    fn operators_use_maximal_munch() {
        assert_eq!(
            kinds("! != = == < <= > >="),
            vec![
                Kind::Bang,
                Kind::BangEqual,
                Kind::Equal,
                Kind::EqualEqual,
                Kind::Less,
                Kind::LessEqual,
                Kind::Greater,
                Kind::GreaterEqual,
            ],
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(kinds("1 -- two three\n4"), vec![Kind::Number, Kind::Number]);
    }

    #[test]
    fn a_single_minus_is_not_a_comment() {
        assert_eq!(
            kinds("1 - 2"),
            vec![Kind::Number, Kind::Minus, Kind::Number],
        );
    }

    #[test]
    fn keywords_are_reserved() {
        assert_eq!(
            kinds("while done do end"),
            vec![Kind::While, Kind::Ident, Kind::Do, Kind::End],
        );
    }

    #[test]
    fn string_lexeme_drops_the_quotes() {
        let token = Scanner::new("\"hi there\"").scan().unwrap().unwrap();
        assert_eq!(token.kind, Kind::String);
        assert_eq!(token.lexeme, "hi there");
    }

    #[test]
    fn newlines_inside_strings_advance_the_line() {
        let mut scanner = Scanner::new("\"a\nb\" x");
        scanner.scan().unwrap();
        let x = scanner.scan().unwrap().unwrap();
        assert_eq!(x.pos.line, 2);
    }

    #[test]
    fn unterminated_strings_are_an_error() {
        let err = Scanner::new("\"oops").scan().unwrap_err();
        assert!(matches!(err, ScanError::UnterminatedString(_)));
    }

    #[test]
    fn numbers_take_an_optional_fraction() {
        let token = Scanner::new("3.14").scan().unwrap().unwrap();
        assert_eq!(token.kind, Kind::Number);
        assert_eq!(token.lexeme, "3.14");
    }

    #[test]
    fn a_dot_without_digits_stays_a_dot() {
        assert_eq!(kinds("1.x"), vec![Kind::Number, Kind::Dot, Kind::Ident]);
    }
}
