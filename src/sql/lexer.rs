//! # Lexer
//!
//! Single-pass tokenizer for the mini SQL dialect. Identifiers, string
//! literals, and numbers are borrowed slices of the input. Keywords are
//! recognized case-insensitively through the perfect hash table in
//! `token`.

use super::token::{Token, KEYWORDS};

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Tokenizes the whole input, ending with `Token::Eof`.
    pub fn tokenize(mut self) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace();

        let Some(byte) = self.peek() else {
            return Token::Eof;
        };

        match byte {
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b',' => self.single(Token::Comma),
            b';' => self.single(Token::Semicolon),
            b'*' => self.single(Token::Star),
            b'\'' => self.string_literal(),
            b'0'..=b'9' | b'-' => self.number(),
            b if is_ident_start(b) => self.ident_or_keyword(),
            other => self.single(Token::Illegal(other as char)),
        }
    }

    fn single(&mut self, token: Token<'a>) -> Token<'a> {
        self.pos += 1;
        token
    }

    fn string_literal(&mut self) -> Token<'a> {
        let start = self.pos + 1;
        self.pos = start;
        while let Some(b) = self.peek() {
            if b == b'\'' {
                let token = Token::StringLit(&self.input[start..self.pos]);
                self.pos += 1;
                return token;
            }
            self.pos += 1;
        }
        Token::Illegal('\'')
    }

    fn number(&mut self) -> Token<'a> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Token::Illegal('-');
            }
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        Token::Number(&self.input[start..self.pos])
    }

    fn ident_or_keyword(&mut self) -> Token<'a> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        let text = &self.input[start..self.pos];
        match KEYWORDS.get(text.to_ascii_uppercase().as_str()) {
            Some(keyword) => Token::Keyword(*keyword),
            None => Token::Ident(text),
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::token::Keyword;

    #[test]
    fn tokenizes_create_table_statement() {
        let tokens = Lexer::new("CREATE TABLE users (id int, PRIMARY KEY (id));").tokenize();

        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Create),
                Token::Keyword(Keyword::Table),
                Token::Ident("users"),
                Token::LParen,
                Token::Ident("id"),
                Token::Ident("int"),
                Token::Comma,
                Token::Keyword(Keyword::Primary),
                Token::Keyword(Keyword::Key),
                Token::LParen,
                Token::Ident("id"),
                Token::RParen,
                Token::RParen,
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = Lexer::new("select From iNsErT").tokenize();

        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Select),
                Token::Keyword(Keyword::From),
                Token::Keyword(Keyword::Insert),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn string_literals_strip_quotes() {
        let tokens = Lexer::new("'hello world'").tokenize();

        assert_eq!(tokens, vec![Token::StringLit("hello world"), Token::Eof]);
    }

    #[test]
    fn unterminated_string_is_illegal() {
        let tokens = Lexer::new("'oops").tokenize();

        assert_eq!(tokens[0], Token::Illegal('\''));
    }

    #[test]
    fn numbers_include_negative() {
        let tokens = Lexer::new("42, -17").tokenize();

        assert_eq!(
            tokens,
            vec![
                Token::Number("42"),
                Token::Comma,
                Token::Number("-17"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn star_and_punctuation() {
        let tokens = Lexer::new("select * from t").tokenize();

        assert_eq!(tokens[1], Token::Star);
    }

    #[test]
    fn unknown_byte_is_illegal_not_fatal() {
        let tokens = Lexer::new("a % b").tokenize();

        assert_eq!(
            tokens,
            vec![
                Token::Ident("a"),
                Token::Illegal('%'),
                Token::Ident("b"),
                Token::Eof,
            ]
        );
    }
}
