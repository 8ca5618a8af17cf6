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

use rengine_common::tuple::{DataRow, JoinTuple, Tuple};
use rengine_common::Value;
use rengine_sqlparser::ast::{BinaryOperator, Expr, Literal, UnaryOperator};

use crate::functions;
use crate::{is_aggregate_function, ExprError, Result};

/// Field and metadata resolution for one row.
pub trait EvalContext {
    fn field(&self, source: Option<&str>, name: &str) -> Option<Value>;
    fn meta_value(&self, key: &str) -> Option<Value>;
}

impl EvalContext for Tuple {
    fn field(&self, source: Option<&str>, name: &str) -> Option<Value> {
        match source {
            Some(emitter) if emitter != self.emitter => None,
            _ => self.value(name).cloned(),
        }
    }

    fn meta_value(&self, key: &str) -> Option<Value> {
        self.meta(key).cloned()
    }
}

impl EvalContext for JoinTuple {
    fn field(&self, source: Option<&str>, name: &str) -> Option<Value> {
        self.value(source, name).cloned()
    }

    fn meta_value(&self, key: &str) -> Option<Value> {
        self.tuples.first().and_then(|t| t.meta(key).cloned())
    }
}

impl EvalContext for DataRow {
    fn field(&self, source: Option<&str>, name: &str) -> Option<Value> {
        self.value(source, name).cloned()
    }

    fn meta_value(&self, key: &str) -> Option<Value> {
        self.meta(key).cloned()
    }
}

/// Evaluate a scalar expression against one row. Missing fields evaluate to
/// null; aggregate calls are rejected.
pub fn eval(expr: &Expr, ctx: &dyn EvalContext) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::FieldRef { source, name } => {
            Ok(ctx.field(source.as_deref(), name).unwrap_or(Value::Null))
        }
        Expr::Wildcard => Err(ExprError::Eval(
            "* is only valid in a select list or count(*)".into(),
        )),
        Expr::UnaryOp { op, expr } => unary(*op, eval(expr, ctx)?),
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And | BinaryOperator::Or => {
                // short-circuit on a decided left side
                let l = eval(left, ctx)?;
                match (op, truthy(&l)) {
                    (BinaryOperator::And, Some(false)) => Ok(Value::Bool(false)),
                    (BinaryOperator::Or, Some(true)) => Ok(Value::Bool(true)),
                    _ => logical(*op, &l, &eval(right, ctx)?),
                }
            }
            _ => binary(&eval(left, ctx)?, *op, &eval(right, ctx)?),
        },
        Expr::Function { name, args } => {
            if name == "meta" {
                return eval_meta(args, ctx);
            }
            if is_aggregate_function(name) {
                return Err(ExprError::AggregateOutsideGroup(name.clone()));
            }
            let args = args
                .iter()
                .map(|a| eval(a, ctx))
                .collect::<Result<Vec<_>>>()?;
            functions::call(name, &args)
        }
        Expr::Case {
            when_clauses,
            else_clause,
        } => {
            for (when, then) in when_clauses {
                if truthy(&eval(when, ctx)?) == Some(true) {
                    return eval(then, ctx);
                }
            }
            match else_clause {
                Some(e) => eval(e, ctx),
                None => Ok(Value::Null),
            }
        }
    }
}

/// Evaluate a condition: anything but `true` fails the row.
pub fn eval_condition(expr: &Expr, ctx: &dyn EvalContext) -> Result<bool> {
    Ok(truthy(&eval(expr, ctx)?) == Some(true))
}

/// Evaluate an expression over one group. Aggregate calls fold the whole
/// group; everything outside an aggregate is evaluated on the first row.
pub fn eval_grouped(expr: &Expr, rows: &[DataRow]) -> Result<Value> {
    if !crate::has_agg_funcs(expr) {
        return match rows.first() {
            Some(row) => eval(expr, row),
            None => Ok(Value::Null),
        };
    }
    match expr {
        Expr::Function { name, args } if is_aggregate_function(name) => {
            eval_aggregate(name, args, rows)
        }
        Expr::Function { name, args } => {
            let args = args
                .iter()
                .map(|a| eval_grouped(a, rows))
                .collect::<Result<Vec<_>>>()?;
            functions::call(name, &args)
        }
        Expr::BinaryOp { left, op, right } => {
            let l = eval_grouped(left, rows)?;
            let r = eval_grouped(right, rows)?;
            match op {
                BinaryOperator::And | BinaryOperator::Or => logical(*op, &l, &r),
                _ => binary(&l, *op, &r),
            }
        }
        Expr::UnaryOp { op, expr } => unary(*op, eval_grouped(expr, rows)?),
        Expr::Case {
            when_clauses,
            else_clause,
        } => {
            for (when, then) in when_clauses {
                if truthy(&eval_grouped(when, rows)?) == Some(true) {
                    return eval_grouped(then, rows);
                }
            }
            match else_clause {
                Some(e) => eval_grouped(e, rows),
                None => Ok(Value::Null),
            }
        }
        other => match rows.first() {
            Some(row) => eval(other, row),
            None => Ok(Value::Null),
        },
    }
}

fn eval_aggregate(name: &str, args: &[Expr], rows: &[DataRow]) -> Result<Value> {
    if name == "count" {
        let counts_rows = args.is_empty() || matches!(args[0], Expr::Wildcard);
        if counts_rows {
            return Ok(Value::Bigint(rows.len() as i64));
        }
    }
    let arg = args.first().ok_or_else(|| ExprError::InvalidArgument {
        func: name.to_owned(),
        reason: "expects one argument".into(),
    })?;
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let v = eval(arg, row)?;
        if !v.is_null() {
            values.push(v);
        }
    }
    match name {
        "count" => Ok(Value::Bigint(values.len() as i64)),
        "sum" => sum(&values, name),
        "avg" => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            match sum(&values, name)? {
                Value::Bigint(total) => Ok(Value::Bigint(total / values.len() as i64)),
                Value::Float(total) => Ok(Value::Float(total / values.len() as f64)),
                other => Ok(other),
            }
        }
        "min" => Ok(values
            .into_iter()
            .min_by(|a, b| a.sort_cmp(b))
            .unwrap_or(Value::Null)),
        "max" => Ok(values
            .into_iter()
            .max_by(|a, b| a.sort_cmp(b))
            .unwrap_or(Value::Null)),
        other => Err(ExprError::UnknownFunction(other.to_owned())),
    }
}

fn sum(values: &[Value], func: &str) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    if values.iter().all(|v| matches!(v, Value::Bigint(_))) {
        let mut total: i64 = 0;
        for v in values {
            total = total
                .checked_add(v.as_i64().unwrap())
                .ok_or_else(|| ExprError::Eval("numeric overflow in sum".into()))?;
        }
        return Ok(Value::Bigint(total));
    }
    let mut total = 0.0;
    for v in values {
        total += v.as_f64().ok_or_else(|| ExprError::InvalidArgument {
            func: func.to_owned(),
            reason: format!("expects numeric values, found {}", v.type_name()),
        })?;
    }
    Ok(Value::Float(total))
}

fn eval_meta(args: &[Expr], ctx: &dyn EvalContext) -> Result<Value> {
    let key = match args.first() {
        Some(Expr::FieldRef { source: None, name }) => name.clone(),
        Some(Expr::Literal(Literal::String(s))) => s.clone(),
        _ => {
            return Err(ExprError::InvalidArgument {
                func: "meta".into(),
                reason: "expects a metadata key".into(),
            })
        }
    };
    Ok(ctx.meta_value(&key).unwrap_or(Value::Null))
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Integer(i) => Value::Bigint(*i),
        Literal::Decimal(x) => Value::Float(*x),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn truthy(v: &Value) -> Option<bool> {
    v.as_bool()
}

fn unary(op: UnaryOperator, v: Value) -> Result<Value> {
    match op {
        UnaryOperator::Not => match v {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null => Ok(Value::Null),
            other => Err(ExprError::Eval(format!(
                "NOT expects a boolean, found {}({})",
                other.type_name(),
                other
            ))),
        },
        UnaryOperator::Minus => match v {
            Value::Bigint(i) => Ok(Value::Bigint(-i)),
            Value::Float(x) => Ok(Value::Float(-x)),
            Value::Null => Ok(Value::Null),
            other => Err(ExprError::Eval(format!(
                "unary minus expects a number, found {}({})",
                other.type_name(),
                other
            ))),
        },
    }
}

fn logical(op: BinaryOperator, l: &Value, r: &Value) -> Result<Value> {
    let (Some(l), Some(r)) = (truthy(l), truthy(r)) else {
        return Ok(Value::Null);
    };
    Ok(Value::Bool(match op {
        BinaryOperator::And => l && r,
        BinaryOperator::Or => l || r,
        _ => unreachable!("logical() only handles AND/OR"),
    }))
}

/// Apply a non-logical binary operator to two values.
pub(crate) fn binary(l: &Value, op: BinaryOperator, r: &Value) -> Result<Value> {
    use BinaryOperator::*;
    match op {
        Plus | Minus | Multiply | Divide | Modulo => arithmetic(l, op, r),
        Eq | NotEq | Gt | GtEq | Lt | LtEq => compare(l, op, r),
        Like => like(l, r),
        And | Or => logical(op, l, r),
    }
}

fn arithmetic(l: &Value, op: BinaryOperator, r: &Value) -> Result<Value> {
    use BinaryOperator::*;
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
        let out = match op {
            Plus => a.checked_add(b),
            Minus => a.checked_sub(b),
            Multiply => a.checked_mul(b),
            Divide => {
                if b == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                a.checked_div(b)
            }
            Modulo => {
                if b == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                a.checked_rem(b)
            }
            _ => unreachable!(),
        };
        return out
            .map(Value::Bigint)
            .ok_or_else(|| ExprError::Eval("numeric overflow".into()));
    }
    if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
        let out = match op {
            Plus => a + b,
            Minus => a - b,
            Multiply => a * b,
            Divide => a / b,
            Modulo => a % b,
            _ => unreachable!(),
        };
        return Ok(Value::Float(out));
    }
    Err(ExprError::invalid_operation(l, op, r))
}

fn compare(l: &Value, op: BinaryOperator, r: &Value) -> Result<Value> {
    use BinaryOperator::*;
    use std::cmp::Ordering;
    if l.is_null() || r.is_null() {
        return Ok(Value::Bool(match op {
            Eq => l.is_null() && r.is_null(),
            NotEq => l.is_null() != r.is_null(),
            _ => false,
        }));
    }
    let ord: Ordering = if l.is_numeric() && r.is_numeric() {
        l.as_f64()
            .unwrap()
            .partial_cmp(&r.as_f64().unwrap())
            .unwrap_or(Ordering::Equal)
    } else {
        match (l, r) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => return Err(ExprError::invalid_operation(l, op, r)),
        }
    };
    Ok(Value::Bool(match op {
        Eq => ord == Ordering::Equal,
        NotEq => ord != Ordering::Equal,
        Gt => ord == Ordering::Greater,
        GtEq => ord != Ordering::Less,
        Lt => ord == Ordering::Less,
        LtEq => ord != Ordering::Greater,
        _ => unreachable!(),
    }))
}

fn like(l: &Value, r: &Value) -> Result<Value> {
    match (l, r) {
        (Value::String(s), Value::String(p)) => {
            let s: Vec<char> = s.chars().collect();
            let p: Vec<char> = p.chars().collect();
            Ok(Value::Bool(like_match(&s, &p)))
        }
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Bool(false)),
        _ => Err(ExprError::invalid_operation(l, BinaryOperator::Like, r)),
    }
}

/// SQL LIKE with `%` (any run) and `_` (any one char) wildcards.
fn like_match(s: &[char], p: &[char]) -> bool {
    match p.first() {
        None => s.is_empty(),
        Some('%') => like_match(s, &p[1..]) || (!s.is_empty() && like_match(&s[1..], p)),
        Some('_') => !s.is_empty() && like_match(&s[1..], &p[1..]),
        Some(&c) => s.first() == Some(&c) && like_match(&s[1..], &p[1..]),
    }
}

#[cfg(test)]
mod tests {
    use rengine_common::Map;
    use rengine_sqlparser::parse_select;

    use super::*;

    fn tuple(pairs: &[(&str, Value)]) -> Tuple {
        let message: Map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        let mut metadata = Map::new();
        metadata.insert("topic".into(), "mock".into());
        Tuple::new("demo", message, metadata, 0)
    }

    fn field_expr(sql: &str) -> Expr {
        parse_select(&format!("SELECT {sql} FROM demo"))
            .unwrap()
            .fields
            .remove(0)
            .expr
    }

    #[test]
    fn test_arithmetic_lattice() {
        let t = tuple(&[("size", Value::Bigint(6)), ("ratio", Value::Float(0.5))]);
        assert_eq!(
            eval(&field_expr("size * 5"), &t).unwrap(),
            Value::Bigint(30)
        );
        assert_eq!(
            eval(&field_expr("size * ratio"), &t).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(eval(&field_expr("size / 4"), &t).unwrap(), Value::Bigint(1));
        assert_eq!(eval(&field_expr("size % 4"), &t).unwrap(), Value::Bigint(2));
    }

    #[test]
    fn test_invalid_operation_message() {
        let t = tuple(&[("size", Value::String("string".into()))]);
        let err = eval(&field_expr("size * 5"), &t).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid operation string(string) * int64(5)"
        );
    }

    #[test]
    fn test_division_by_zero() {
        let t = tuple(&[("size", Value::Bigint(6))]);
        assert_eq!(
            eval(&field_expr("size / 0"), &t).unwrap_err(),
            ExprError::DivisionByZero
        );
    }

    #[test]
    fn test_comparisons_and_logic() {
        let t = tuple(&[("size", Value::Bigint(6)), ("color", "blue".into())]);
        assert_eq!(
            eval_condition(&field_expr("size > 3 AND color = 'blue'"), &t).unwrap(),
            true
        );
        assert_eq!(
            eval_condition(&field_expr("size < 3 OR color != 'blue'"), &t).unwrap(),
            false
        );
        assert_eq!(
            eval_condition(&field_expr("NOT (size > 3)"), &t).unwrap(),
            false
        );
        // missing field is null, comparisons against it are not true
        assert_eq!(eval_condition(&field_expr("missing > 3"), &t).unwrap(), false);
    }

    #[test]
    fn test_string_number_comparison_errors() {
        let t = tuple(&[("color", "blue".into())]);
        let err = eval(&field_expr("color > 3"), &t).unwrap_err();
        assert_eq!(err.to_string(), "invalid operation string(blue) > int64(3)");
    }

    #[test]
    fn test_meta_and_case() {
        let t = tuple(&[("size", Value::Bigint(6))]);
        assert_eq!(
            eval(&field_expr("meta(topic)"), &t).unwrap(),
            Value::String("mock".into())
        );
        assert_eq!(
            eval(
                &field_expr("CASE WHEN size > 3 THEN 'big' ELSE 'small' END"),
                &t
            )
            .unwrap(),
            Value::String("big".into())
        );
        // branches not taken are never evaluated
        assert_eq!(
            eval(
                &field_expr("CASE WHEN size > 3 THEN 'big' ELSE size / 0 END"),
                &t
            )
            .unwrap(),
            Value::String("big".into())
        );
    }

    #[test]
    fn test_like() {
        let t = tuple(&[("color", "yellow".into())]);
        assert_eq!(eval_condition(&field_expr("color LIKE 'ye%'"), &t).unwrap(), true);
        assert_eq!(
            eval_condition(&field_expr("color LIKE 'y_llow'"), &t).unwrap(),
            true
        );
        assert_eq!(eval_condition(&field_expr("color LIKE 'red'"), &t).unwrap(), false);
    }

    #[test]
    fn test_grouped_aggregates() {
        let rows: Vec<DataRow> = [1i64, 2, 3]
            .iter()
            .map(|i| {
                DataRow::Tuple(tuple(&[
                    ("size", Value::Bigint(*i)),
                    ("color", "red".into()),
                ]))
            })
            .collect();
        assert_eq!(
            eval_grouped(&field_expr("count(*)"), &rows).unwrap(),
            Value::Bigint(3)
        );
        assert_eq!(
            eval_grouped(&field_expr("sum(size)"), &rows).unwrap(),
            Value::Bigint(6)
        );
        assert_eq!(
            eval_grouped(&field_expr("avg(size)"), &rows).unwrap(),
            Value::Bigint(2)
        );
        assert_eq!(
            eval_grouped(&field_expr("min(size)"), &rows).unwrap(),
            Value::Bigint(1)
        );
        assert_eq!(
            eval_grouped(&field_expr("max(size) + 10"), &rows).unwrap(),
            Value::Bigint(13)
        );
        // non-aggregate parts resolve on the first row of the group
        assert_eq!(
            eval_grouped(&field_expr("color"), &rows).unwrap(),
            Value::String("red".into())
        );
    }

    #[test]
    fn test_aggregate_outside_group_rejected() {
        let t = tuple(&[("size", Value::Bigint(6))]);
        assert!(matches!(
            eval(&field_expr("count(*)"), &t).unwrap_err(),
            ExprError::AggregateOutsideGroup(_)
        ));
    }
}
