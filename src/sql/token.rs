//! # Tokens
//!
//! Token and keyword definitions for the mini SQL dialect. Keywords are
//! matched through a compile-time perfect hash map, and string-carrying
//! tokens borrow from the input, so tokenization never allocates except
//! for the output vector.

use phf::phf_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Create,
    Table,
    Index,
    Primary,
    Key,
    Insert,
    Into,
    Values,
    Select,
    From,
}

pub static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "CREATE" => Keyword::Create,
    "TABLE" => Keyword::Table,
    "INDEX" => Keyword::Index,
    "PRIMARY" => Keyword::Primary,
    "KEY" => Keyword::Key,
    "INSERT" => Keyword::Insert,
    "INTO" => Keyword::Into,
    "VALUES" => Keyword::Values,
    "SELECT" => Keyword::Select,
    "FROM" => Keyword::From,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Keyword(Keyword),
    Ident(&'a str),
    /// Single-quoted string literal, quotes stripped.
    StringLit(&'a str),
    /// Integer literal, still as source text.
    Number(&'a str),
    LParen,
    RParen,
    Comma,
    Semicolon,
    Star,
    Eof,
    /// A byte the lexer does not understand; the parser reports it.
    Illegal(char),
}
