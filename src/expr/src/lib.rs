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

//! Expression evaluation over tuples and groups.
//!
//! Evaluation is a pure function from (expression, context) to [`Value`].
//! Arithmetic follows the `int64 ⊂ float64` lattice; any other mixing is an
//! evaluation error whose message format is part of the user contract.

mod error;
pub mod eval;
mod functions;

pub use error::{ExprError, Result};
pub use eval::{eval, eval_grouped, EvalContext};

use rengine_sqlparser::ast::{Expr, SelectStatement};

/// Names understood as aggregate functions.
pub const AGGREGATE_FUNCTIONS: &[&str] = &["count", "sum", "avg", "min", "max"];

pub fn is_aggregate_function(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(&name)
}

/// Does the expression contain an aggregate function call anywhere?
pub fn has_agg_funcs(expr: &Expr) -> bool {
    let mut found = false;
    expr.walk(&mut |e| {
        if let Expr::Function { name, .. } = e {
            if is_aggregate_function(name) {
                found = true;
            }
        }
    });
    found
}

/// A statement is aggregated when it has group dimensions or calls an
/// aggregate in its select list or HAVING clause. A window alone does not
/// aggregate: its contents still project per tuple.
pub fn is_agg_statement(stmt: &SelectStatement) -> bool {
    if !stmt.dimensions.is_empty() {
        return true;
    }
    if stmt.fields.iter().any(|f| has_agg_funcs(&f.expr)) {
        return true;
    }
    stmt.having.as_ref().is_some_and(has_agg_funcs)
}
