//! # Parser
//!
//! Recursive-descent parser over the token stream. The grammar:
//!
//! ```text
//! statement   := create_table | insert | select | ';'? EOF
//! create_table:= CREATE TABLE ident '(' column_defs ')' ';'?
//! column_defs := (ident ident | PRIMARY KEY '(' ident (',' ident)* ')')
//!                (',' ...)*
//! insert      := INSERT INTO ident '(' ident_list ')' VALUES
//!                '(' literal_list ')' (',' '(' literal_list ')')* ';'?
//! select      := SELECT '*' FROM ident ';'?
//! ```

use eyre::{bail, ensure, Result};

use super::ast::{ColumnSpec, CreateTableStmt, InsertStmt, Literal, SelectStmt, Statement};
use super::token::{Keyword, Token};

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> Token<'a> {
        self.tokens.get(self.pos).copied().unwrap_or(Token::Eof)
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.current();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let got = self.advance();
        ensure!(got == expected, "expected {:?}, got {:?}", expected, got);
        Ok(())
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        match self.advance() {
            Token::Ident(name) => Ok(name.to_string()),
            other => bail!("expected {}, got {:?}", what, other),
        }
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Eof | Token::Semicolon => Ok(Statement::NoOp),
            Token::Keyword(Keyword::Create) => self.parse_create(),
            Token::Keyword(Keyword::Insert) => self.parse_insert(),
            Token::Keyword(Keyword::Select) => self.parse_select(),
            Token::Illegal(c) => bail!("unexpected character '{}'", c),
            other => bail!("expected a statement, got {:?}", other),
        }
    }

    fn finish_statement(&mut self) -> Result<()> {
        if self.current() == Token::Semicolon {
            self.advance();
        }
        let trailing = self.current();
        ensure!(
            trailing == Token::Eof,
            "trailing input after statement: {:?}",
            trailing
        );
        Ok(())
    }

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect(Token::Keyword(Keyword::Create))?;
        self.expect(Token::Keyword(Keyword::Table))?;

        let mut stmt = CreateTableStmt {
            table: self.ident("table name")?,
            ..Default::default()
        };

        self.expect(Token::LParen)?;
        loop {
            match self.current() {
                Token::Keyword(Keyword::Primary) => {
                    self.advance();
                    self.expect(Token::Keyword(Keyword::Key))?;
                    self.expect(Token::LParen)?;
                    loop {
                        stmt.primary_keys.push(self.ident("primary key column")?);
                        match self.advance() {
                            Token::Comma => continue,
                            Token::RParen => break,
                            other => bail!("expected ',' or ')', got {:?}", other),
                        }
                    }
                }
                Token::Ident(_) => {
                    let name = self.ident("column name")?;
                    let type_name = self.ident("column type")?;
                    stmt.columns.push(ColumnSpec { name, type_name });
                }
                other => bail!("expected a column definition, got {:?}", other),
            }

            match self.advance() {
                Token::Comma => continue,
                Token::RParen => break,
                other => bail!("expected ',' or ')', got {:?}", other),
            }
        }

        ensure!(
            !stmt.columns.is_empty(),
            "table '{}' has no columns",
            stmt.table
        );
        self.finish_statement()?;
        Ok(Statement::CreateTable(stmt))
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect(Token::Keyword(Keyword::Insert))?;
        self.expect(Token::Keyword(Keyword::Into))?;

        let mut stmt = InsertStmt {
            table: self.ident("table name")?,
            ..Default::default()
        };

        self.expect(Token::LParen)?;
        loop {
            stmt.columns.push(self.ident("column name")?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => break,
                other => bail!("expected ',' or ')', got {:?}", other),
            }
        }

        self.expect(Token::Keyword(Keyword::Values))?;
        loop {
            self.expect(Token::LParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.literal()?);
                match self.advance() {
                    Token::Comma => continue,
                    Token::RParen => break,
                    other => bail!("expected ',' or ')', got {:?}", other),
                }
            }
            ensure!(
                row.len() == stmt.columns.len(),
                "row has {} values for {} columns",
                row.len(),
                stmt.columns.len()
            );
            stmt.rows.push(row);

            if self.current() == Token::Comma {
                self.advance();
                continue;
            }
            break;
        }

        self.finish_statement()?;
        Ok(Statement::Insert(stmt))
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.advance() {
            Token::StringLit(s) => Ok(Literal::Str(s.to_string())),
            // Bare identifiers double as string values, matching the
            // dialect's unquoted insert style.
            Token::Ident(s) => Ok(Literal::Str(s.to_string())),
            Token::Number(n) => {
                let value: i64 = n
                    .parse()
                    .map_err(|_| eyre::eyre!("integer literal '{}' out of range", n))?;
                Ok(Literal::Int(value))
            }
            other => bail!("expected a value, got {:?}", other),
        }
    }

    fn parse_select(&mut self) -> Result<Statement> {
        self.expect(Token::Keyword(Keyword::Select))?;
        self.expect(Token::Star)?;
        self.expect(Token::Keyword(Keyword::From))?;
        let table = self.ident("table name")?;
        self.finish_statement()?;
        Ok(Statement::Select(SelectStmt { table }))
    }
}
