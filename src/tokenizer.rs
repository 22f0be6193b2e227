use std::{iter::Peekable, str::CharIndices};

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Minus,
    Plus,
    Slash,
    Star,
    Less,
    Greater,

    // One or two character tokens
    Bang,
    BangEqual,
    Assign,
    EqualEqual,

    // Literals
    Identifier,
    Int,

    // Keywords
    Let,
    Function,
    True,
    False,
    If,
    Else,
    Return,

    Illegal,
    Eof,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenType::LeftParen => "(",
            TokenType::RightParen => ")",
            TokenType::LeftBrace => "{",
            TokenType::RightBrace => "}",
            TokenType::Comma => ",",
            TokenType::Semicolon => ";",
            TokenType::Minus => "-",
            TokenType::Plus => "+",
            TokenType::Slash => "/",
            TokenType::Star => "*",
            TokenType::Less => "<",
            TokenType::Greater => ">",
            TokenType::Bang => "!",
            TokenType::BangEqual => "!=",
            TokenType::Assign => "=",
            TokenType::EqualEqual => "==",
            TokenType::Identifier => "IDENT",
            TokenType::Int => "INT",
            TokenType::Let => "LET",
            TokenType::Function => "FUNCTION",
            TokenType::True => "TRUE",
            TokenType::False => "FALSE",
            TokenType::If => "IF",
            TokenType::Else => "ELSE",
            TokenType::Return => "RETURN",
            TokenType::Illegal => "ILLEGAL",
            TokenType::Eof => "EOF",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            token_type,
            lexeme: lexeme.into(),
            span,
        }
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }
}

/// Splits source text into tokens on demand.
///
/// `next_token` keeps returning [`TokenType::Eof`] once the input is
/// exhausted. As an [`Iterator`] the tokenizer yields the first `Eof` token
/// and then stops.
pub struct Tokenizer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            finished: false,
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let (line, column) = (self.line, self.column);
        let Some((start, c)) = self.advance() else {
            return Token::new(TokenType::Eof, "", Span::new(line, column, 0));
        };

        let token_type = match c {
            '=' => self.either('=', TokenType::EqualEqual, TokenType::Assign),
            '!' => self.either('=', TokenType::BangEqual, TokenType::Bang),
            ';' => TokenType::Semicolon,
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            ',' => TokenType::Comma,
            '+' => TokenType::Plus,
            '-' => TokenType::Minus,
            '/' => TokenType::Slash,
            '*' => TokenType::Star,
            '<' => TokenType::Less,
            '>' => TokenType::Greater,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            c if is_letter(c) => {
                self.advance_while(is_letter);
                keyword(&self.source[start..self.offset()]).unwrap_or(TokenType::Identifier)
            }
            c if c.is_ascii_digit() => {
                self.advance_while(|c| c.is_ascii_digit());
                TokenType::Int
            }
            _ => TokenType::Illegal,
        };

        let lexeme = &self.source[start..self.offset()];
        let width = lexeme.chars().count();
        Token::new(token_type, lexeme, Span::new(line, column, width))
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let (index, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some((index, c))
    }

    fn advance_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(&(_, c)) = self.chars.peek() {
            if !predicate(c) {
                break;
            }
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        self.advance_while(char::is_whitespace);
    }

    fn either(&mut self, next: char, matched: TokenType, otherwise: TokenType) -> TokenType {
        match self.chars.peek() {
            Some(&(_, c)) if c == next => {
                self.advance();
                matched
            }
            _ => otherwise,
        }
    }

    /// Byte offset of the next unread character.
    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map_or(self.source.len(), |&(index, _)| index)
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if token.token_type == TokenType::Eof {
            self.finished = true;
        }
        Some(token)
    }
}

pub fn tokens(source: &str) -> Vec<Token> {
    Tokenizer::new(source).collect()
}

fn is_letter(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn keyword(text: &str) -> Option<TokenType> {
    match text {
        "let" => Some(TokenType::Let),
        "fn" => Some(TokenType::Function),
        "true" => Some(TokenType::True),
        "false" => Some(TokenType::False),
        "if" => Some(TokenType::If),
        "else" => Some(TokenType::Else),
        "return" => Some(TokenType::Return),
        _ => None,
    }
}
