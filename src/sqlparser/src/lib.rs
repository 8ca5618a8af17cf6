// Copyright 2026 rengine Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SQL lexer and parser for the rengine query subset and stream DDL.
//!
//! Standalone by design: this crate knows nothing about catalogs, plans or
//! the runtime. It turns text into the AST in [`ast`] and nothing more.

pub mod ast;
pub mod lexer;
pub mod parser;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParserError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Parse a single statement (query or DDL).
pub fn parse(sql: &str) -> Result<ast::Statement> {
    parser::Parser::parse_statement(sql)
}

/// Parse a statement that must be a SELECT.
pub fn parse_select(sql: &str) -> Result<ast::SelectStatement> {
    match parser::Parser::parse_statement(sql)? {
        ast::Statement::Select(stmt) => Ok(stmt),
        other => Err(ParserError::Parse(format!(
            "expected a SELECT statement, found {other:?}"
        ))),
    }
}
