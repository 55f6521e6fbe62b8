//! # SQL Front End
//!
//! A deliberately small SQL-ish surface over the relational layer:
//! `CREATE TABLE`, multi-row `INSERT INTO ... VALUES`, and
//! `SELECT * FROM`. The lexer borrows from the input; the parser produces
//! owned [`ast::Statement`] values that `Database::execute` dispatches.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{CreateTableStmt, InsertStmt, Literal, SelectStmt, Statement};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Keyword, Token};

use eyre::Result;

/// Tokenizes and parses a single statement.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    Parser::new(Lexer::new(sql).tokenize()).parse_statement()
}
