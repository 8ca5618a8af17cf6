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

use crate::ast::*;
use crate::lexer::{tokenize, Token};
use crate::{ParserError, Result};

/// Words that end an expression or alias position.
const RESERVED: &[&str] = &[
    "from", "where", "group", "having", "order", "limit", "join", "inner", "left", "right",
    "full", "cross", "on", "as", "and", "or", "not", "by", "asc", "desc", "case", "when",
    "then", "else", "end", "like", "filter",
];

pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    pub fn parse_statement(sql: &str) -> Result<Statement> {
        let mut parser = Parser {
            tokens: tokenize(sql)?,
            index: 0,
        };
        let stmt = if parser.parse_keyword("select") {
            Statement::Select(parser.parse_select()?)
        } else if parser.parse_keyword("create") {
            Statement::CreateStream(parser.parse_create()?)
        } else if parser.parse_keyword("drop") {
            parser.parse_drop()?
        } else if parser.parse_keyword("show") {
            parser.parse_show()?
        } else if parser.parse_keyword("describe") {
            parser.parse_describe()?
        } else {
            return Err(parser.expected("a statement"));
        };
        if let Some(tok) = parser.peek() {
            return Err(ParserError::Parse(format!(
                "unexpected trailing input at {tok:?}"
            )));
        }
        Ok(stmt)
    }

    // ------------------------------------------------------------------ query

    fn parse_select(&mut self) -> Result<SelectStatement> {
        let fields = self.parse_field_list()?;
        self.expect_keyword("from")?;
        let mut sources = vec![self.parse_table_ref()?];
        while self.consume(&Token::Comma) {
            sources.push(self.parse_table_ref()?);
        }
        let joins = self.parse_joins()?;
        let condition = if self.parse_keyword("where") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let (dimensions, window) = if self.parse_keyword("group") {
            self.expect_keyword("by")?;
            self.parse_group_by()?
        } else {
            (vec![], None)
        };
        let having = if self.parse_keyword("having") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let sort_fields = if self.parse_keyword("order") {
            self.expect_keyword("by")?;
            self.parse_sort_fields()?
        } else {
            vec![]
        };
        let limit = if self.parse_keyword("limit") {
            Some(self.parse_unsigned()? as usize)
        } else {
            None
        };
        Ok(SelectStatement {
            fields,
            sources,
            joins,
            condition,
            dimensions,
            window,
            having,
            sort_fields,
            limit,
        })
    }

    fn parse_field_list(&mut self) -> Result<Vec<Field>> {
        let mut fields = vec![];
        loop {
            let expr = self.parse_expr()?;
            let alias = if self.parse_keyword("as") {
                Some(self.parse_identifier()?)
            } else {
                // implicit alias, unless the word is a clause keyword
                let implicit = matches!(
                    self.peek(),
                    Some(Token::Ident(w))
                        if !RESERVED.iter().any(|kw| w.eq_ignore_ascii_case(kw))
                );
                if implicit {
                    Some(self.parse_identifier()?)
                } else {
                    None
                }
            };
            fields.push(Field { expr, alias });
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        Ok(fields)
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let name = self.parse_identifier()?;
        let alias = if self.parse_keyword("as") {
            Some(self.parse_identifier()?)
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    fn parse_joins(&mut self) -> Result<Vec<Join>> {
        let mut joins = vec![];
        loop {
            let join_type = if self.parse_keyword("inner") {
                JoinType::Inner
            } else if self.parse_keyword("left") {
                self.parse_keyword("outer");
                JoinType::Left
            } else if self.parse_keyword("right") {
                self.parse_keyword("outer");
                JoinType::Right
            } else if self.parse_keyword("full") {
                self.parse_keyword("outer");
                JoinType::Full
            } else if self.parse_keyword("cross") {
                JoinType::Cross
            } else if matches!(self.peek(), Some(t) if t.is_keyword("join")) {
                JoinType::Inner
            } else {
                break;
            };
            self.expect_keyword("join")?;
            let table = self.parse_table_ref()?;
            let on = if self.parse_keyword("on") {
                Some(self.parse_expr()?)
            } else if join_type == JoinType::Cross {
                None
            } else {
                return Err(self.expected("ON clause"));
            };
            joins.push(Join {
                table,
                join_type,
                on,
            });
        }
        Ok(joins)
    }

    fn parse_group_by(&mut self) -> Result<(Vec<Expr>, Option<WindowSpec>)> {
        let mut dimensions = vec![];
        let mut window = None;
        loop {
            let expr = self.parse_expr()?;
            match Self::window_from_call(&expr)? {
                Some(mut spec) => {
                    if window.is_some() {
                        return Err(ParserError::Parse(
                            "at most one window dimension is allowed".into(),
                        ));
                    }
                    if self.parse_keyword("filter") {
                        self.expect(&Token::LParen)?;
                        self.expect_keyword("where")?;
                        spec.filter = Some(self.parse_expr()?);
                        self.expect(&Token::RParen)?;
                    }
                    window = Some(spec);
                }
                None => dimensions.push(expr),
            }
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        Ok((dimensions, window))
    }

    /// Recognize `TUMBLINGWINDOW(ss, 10)` style calls among the GROUP BY
    /// expressions. Time units: ms, s/ss, mi, hh, dd.
    fn window_from_call(expr: &Expr) -> Result<Option<WindowSpec>> {
        let Expr::Function { name, args } = expr else {
            return Ok(None);
        };
        let wtype = match name.as_str() {
            "tumblingwindow" => WindowType::Tumbling,
            "hoppingwindow" => WindowType::Hopping,
            "slidingwindow" => WindowType::Sliding,
            "sessionwindow" => WindowType::Session,
            "countwindow" => WindowType::Count,
            _ => return Ok(None),
        };
        let arg_int = |e: &Expr| -> Result<i64> {
            match e {
                Expr::Literal(Literal::Integer(i)) => Ok(*i),
                other => Err(ParserError::Parse(format!(
                    "window argument must be an integer, found {other:?}"
                ))),
            }
        };
        if wtype == WindowType::Count {
            let (length, interval) = match args.len() {
                1 => (arg_int(&args[0])?, arg_int(&args[0])?),
                2 => (arg_int(&args[0])?, arg_int(&args[1])?),
                n => {
                    return Err(ParserError::Parse(format!(
                        "COUNTWINDOW expects 1 or 2 arguments, found {n}"
                    )))
                }
            };
            return Ok(Some(WindowSpec {
                wtype,
                length,
                interval,
                filter: None,
            }));
        }
        let unit = match args.first() {
            Some(Expr::FieldRef { source: None, name }) => match name.as_str() {
                "ms" => 1,
                "s" | "ss" => 1_000,
                "mi" => 60_000,
                "hh" => 3_600_000,
                "dd" => 86_400_000,
                other => {
                    return Err(ParserError::Parse(format!(
                        "unknown window time unit {other}"
                    )))
                }
            },
            _ => {
                return Err(ParserError::Parse(
                    "window call must start with a time unit".into(),
                ))
            }
        };
        let expect_args = match wtype {
            WindowType::Hopping => 3,
            _ => 2,
        };
        if args.len() != expect_args {
            return Err(ParserError::Parse(format!(
                "window call expects {expect_args} arguments, found {}",
                args.len()
            )));
        }
        let length = arg_int(&args[1])? * unit;
        let interval = if wtype == WindowType::Hopping {
            arg_int(&args[2])? * unit
        } else {
            length
        };
        Ok(Some(WindowSpec {
            wtype,
            length,
            interval,
            filter: None,
        }))
    }

    fn parse_sort_fields(&mut self) -> Result<Vec<SortField>> {
        let mut out = vec![];
        loop {
            let first = self.parse_identifier()?;
            let (source, name) = if self.consume(&Token::Period) {
                (Some(first), self.parse_identifier()?)
            } else {
                (None, first)
            };
            let ascending = if self.parse_keyword("desc") {
                false
            } else {
                self.parse_keyword("asc");
                true
            };
            out.push(SortField {
                source,
                name,
                ascending,
            });
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------- expressions

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.parse_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.parse_keyword("and") {
            let right = self.parse_not()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.parse_keyword("not") {
            let expr = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(BinaryOperator::Eq),
            Some(Token::NotEq) => Some(BinaryOperator::NotEq),
            Some(Token::Gt) => Some(BinaryOperator::Gt),
            Some(Token::GtEq) => Some(BinaryOperator::GtEq),
            Some(Token::Lt) => Some(BinaryOperator::Lt),
            Some(Token::LtEq) => Some(BinaryOperator::LtEq),
            Some(t) if t.is_keyword("like") => Some(BinaryOperator::Like),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let right = self.parse_additive()?;
                Ok(Expr::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }
            None => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOperator::Plus,
                Some(Token::Minus) => BinaryOperator::Minus,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Asterisk) => BinaryOperator::Multiply,
                Some(Token::Slash) => BinaryOperator::Divide,
                Some(Token::Percent) => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.consume(&Token::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                if n.contains('.') {
                    let v = n
                        .parse::<f64>()
                        .map_err(|e| ParserError::Parse(format!("bad number {n}: {e}")))?;
                    Ok(Expr::Literal(Literal::Decimal(v)))
                } else {
                    let v = n
                        .parse::<i64>()
                        .map_err(|e| ParserError::Parse(format!("bad number {n}: {e}")))?;
                    Ok(Expr::Literal(Literal::Integer(v)))
                }
            }
            Some(Token::SingleQuotedString(s)) | Some(Token::DoubleQuotedString(s)) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Asterisk) => {
                self.advance();
                Ok(Expr::Wildcard)
            }
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("case") => {
                self.advance();
                self.parse_case()
            }
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("true") => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("false") => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("null") => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Some(Token::Ident(_)) | Some(Token::QuotedIdent(_)) => {
                let name = self.parse_identifier()?;
                if self.consume(&Token::LParen) {
                    let mut args = vec![];
                    if !self.consume(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.consume(&Token::Comma) {
                                break;
                            }
                        }
                        self.expect(&Token::RParen)?;
                    }
                    Ok(Expr::Function {
                        name: name.to_ascii_lowercase(),
                        args,
                    })
                } else if self.consume(&Token::Period) {
                    let field = self.parse_identifier()?;
                    Ok(Expr::FieldRef {
                        source: Some(name),
                        name: field,
                    })
                } else {
                    Ok(Expr::FieldRef { source: None, name })
                }
            }
            _ => Err(self.expected("an expression")),
        }
    }

    /// Searched CASE, with the operand form desugared into equality tests.
    fn parse_case(&mut self) -> Result<Expr> {
        let operand = if matches!(self.peek(), Some(t) if t.is_keyword("when")) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let mut when_clauses = vec![];
        while self.parse_keyword("when") {
            let mut when = self.parse_expr()?;
            if let Some(operand) = &operand {
                when = Expr::BinaryOp {
                    left: Box::new(operand.clone()),
                    op: BinaryOperator::Eq,
                    right: Box::new(when),
                };
            }
            self.expect_keyword("then")?;
            let then = self.parse_expr()?;
            when_clauses.push((when, then));
        }
        if when_clauses.is_empty() {
            return Err(self.expected("WHEN clause"));
        }
        let else_clause = if self.parse_keyword("else") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword("end")?;
        Ok(Expr::Case {
            when_clauses,
            else_clause,
        })
    }

    // --------------------------------------------------------------------- ddl

    fn parse_create(&mut self) -> Result<CreateStreamStmt> {
        let is_table = if self.parse_keyword("table") {
            true
        } else {
            self.expect_keyword("stream")?;
            false
        };
        let name = self.parse_identifier()?;
        let mut columns = vec![];
        if self.consume(&Token::LParen) && !self.consume(&Token::RParen) {
            loop {
                let col_name = self.parse_identifier()?;
                let type_word = self.parse_identifier()?;
                let data_type = Self::type_name(&type_word)?;
                columns.push(ColumnDef {
                    name: col_name,
                    data_type,
                });
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        let mut options = vec![];
        if self.parse_keyword("with") {
            self.expect(&Token::LParen)?;
            loop {
                let key = self.parse_identifier()?.to_ascii_lowercase();
                self.expect(&Token::Eq)?;
                let value = match self.peek().cloned() {
                    Some(Token::SingleQuotedString(s)) | Some(Token::DoubleQuotedString(s)) => {
                        self.advance();
                        s
                    }
                    Some(Token::Number(n)) => {
                        self.advance();
                        n
                    }
                    Some(Token::Ident(w)) => {
                        self.advance();
                        w
                    }
                    _ => return Err(self.expected("an option value")),
                };
                options.push((key, value));
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        Ok(CreateStreamStmt {
            name,
            is_table,
            columns,
            options,
        })
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        let is_table = if self.parse_keyword("table") {
            true
        } else {
            self.expect_keyword("stream")?;
            false
        };
        let name = self.parse_identifier()?;
        Ok(Statement::DropStream { name, is_table })
    }

    fn parse_show(&mut self) -> Result<Statement> {
        if self.parse_keyword("tables") {
            Ok(Statement::ShowStreams { tables: true })
        } else {
            self.expect_keyword("streams")?;
            Ok(Statement::ShowStreams { tables: false })
        }
    }

    fn parse_describe(&mut self) -> Result<Statement> {
        if !self.parse_keyword("stream") {
            self.expect_keyword("table")?;
        }
        let name = self.parse_identifier()?;
        Ok(Statement::DescribeStream { name })
    }

    fn type_name(word: &str) -> Result<TypeName> {
        match word.to_ascii_lowercase().as_str() {
            "bigint" => Ok(TypeName::Bigint),
            "float" => Ok(TypeName::Float),
            "string" => Ok(TypeName::String),
            "boolean" => Ok(TypeName::Boolean),
            "datetime" => Ok(TypeName::Datetime),
            "bytea" => Ok(TypeName::Bytea),
            "array" => Ok(TypeName::Array),
            "struct" => Ok(TypeName::Struct),
            other => Err(ParserError::Parse(format!("unknown column type {other}"))),
        }
    }

    // ----------------------------------------------------------------- helpers

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn advance(&mut self) {
        self.index += 1;
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.consume(token) {
            Ok(())
        } else {
            Err(self.expected(&format!("{token:?}")))
        }
    }

    fn parse_keyword(&mut self, kw: &str) -> bool {
        match self.peek() {
            Some(t) if t.is_keyword(kw) => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.parse_keyword(kw) {
            Ok(())
        } else {
            Err(self.expected(&kw.to_ascii_uppercase()))
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Ident(w)) => {
                self.advance();
                Ok(w)
            }
            Some(Token::QuotedIdent(w)) => {
                self.advance();
                Ok(w)
            }
            _ => Err(self.expected("an identifier")),
        }
    }

    fn parse_unsigned(&mut self) -> Result<u64> {
        match self.peek().cloned() {
            Some(Token::Number(n)) if !n.contains('.') => {
                self.advance();
                n.parse()
                    .map_err(|e| ParserError::Parse(format!("bad number {n}: {e}")))
            }
            _ => Err(self.expected("an unsigned integer")),
        }
    }

    fn expected(&self, what: &str) -> ParserError {
        match self.peek() {
            Some(tok) => ParserError::Parse(format!("expected {what}, found {tok:?}")),
            None => ParserError::Parse(format!("expected {what}, found end of input")),
        }
    }
}
