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

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    CreateStream(CreateStreamStmt),
    DropStream { name: String, is_table: bool },
    ShowStreams { tables: bool },
    DescribeStream { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub fields: Vec<Field>,
    pub sources: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub condition: Option<Expr>,
    /// GROUP BY expressions, window call excluded.
    pub dimensions: Vec<Expr>,
    pub window: Option<WindowSpec>,
    pub having: Option<Expr>,
    pub sort_fields: Vec<SortField>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    /// All referenced source names, FROM first, joins in declaration order.
    pub fn stream_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        names.extend(self.joins.iter().map(|j| j.table.name.as_str()));
        names
    }
}

/// A select-list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl Field {
    /// The output column name: the alias, or the bare column name for plain
    /// references. `None` means the planner assigns a generated name.
    pub fn output_name(&self) -> Option<&str> {
        if let Some(alias) = &self.alias {
            return Some(alias);
        }
        match &self.expr {
            Expr::FieldRef { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: TableRef,
    pub join_type: JoinType,
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Tumbling,
    Hopping,
    Sliding,
    Session,
    Count,
}

/// A window dimension. `length` and `interval` are ms for time windows and
/// element counts for count windows. For session windows `length` is the
/// inactivity timeout. Count windows default `interval` to `length`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub wtype: WindowType,
    pub length: i64,
    pub interval: i64,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub source: Option<String>,
    pub name: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Decimal(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    And,
    Or,
    Like,
}

impl BinaryOperator {
    pub fn is_arithmetic(&self) -> bool {
        use BinaryOperator::*;
        matches!(self, Plus | Minus | Multiply | Divide | Modulo)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOperator::*;
        let s = match self {
            Plus => "+",
            Minus => "-",
            Multiply => "*",
            Divide => "/",
            Modulo => "%",
            Eq => "=",
            NotEq => "!=",
            Gt => ">",
            GtEq => ">=",
            Lt => "<",
            LtEq => "<=",
            And => "AND",
            Or => "OR",
            Like => "LIKE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// A column reference, optionally qualified by source name.
    FieldRef {
        source: Option<String>,
        name: String,
    },
    /// `*` in a select list or inside `count(*)`.
    Wildcard,
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Function call; names are normalized to lower case.
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Case {
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Walk the expression tree, visiting every node.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::UnaryOp { expr, .. } => expr.walk(visit),
            Expr::BinaryOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::Case {
                when_clauses,
                else_clause,
            } => {
                for (when, then) in when_clauses {
                    when.walk(visit);
                    then.walk(visit);
                }
                if let Some(e) = else_clause {
                    e.walk(visit);
                }
            }
            Expr::Literal(_) | Expr::FieldRef { .. } | Expr::Wildcard => {}
        }
    }

    /// Field names referenced by this expression, with qualifiers.
    pub fn field_refs(&self) -> Vec<(Option<&str>, &str)> {
        let mut refs = vec![];
        self.walk(&mut |e| {
            if let Expr::FieldRef { source, name } = e {
                refs.push((source.as_deref(), name.as_str()));
            }
        });
        refs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Bigint,
    Float,
    String,
    Boolean,
    Datetime,
    Bytea,
    Array,
    Struct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: TypeName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateStreamStmt {
    pub name: String,
    pub is_table: bool,
    /// Empty means schemaless.
    pub columns: Vec<ColumnDef>,
    /// WITH options, keys lower-cased.
    pub options: Vec<(String, String)>,
}
