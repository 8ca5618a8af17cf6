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

//! Built-in scalar functions. Aggregates live in the evaluator since they
//! need the whole group; `meta()` is handled there too since it needs the
//! metadata mapping rather than values.

use rengine_common::Value;

use crate::{ExprError, Result};

pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    match name {
        "abs" => numeric_1(name, args, |x| x.abs(), |i| Some(i.abs())),
        "ceil" => numeric_1(name, args, |x| x.ceil(), Some),
        "floor" => numeric_1(name, args, |x| x.floor(), Some),
        "round" => numeric_1(name, args, |x| x.round(), Some),
        "sqrt" => {
            let x = float_arg(name, args, 0)?;
            Ok(Value::Float(x.sqrt()))
        }
        "power" => {
            let base = float_arg(name, args, 0)?;
            let exp = float_arg(name, args, 1)?;
            Ok(Value::Float(base.powf(exp)))
        }
        "lower" => Ok(Value::String(str_arg(name, args, 0)?.to_lowercase())),
        "upper" => Ok(Value::String(str_arg(name, args, 0)?.to_uppercase())),
        "trim" => Ok(Value::String(str_arg(name, args, 0)?.trim().to_owned())),
        "length" => {
            let v = args.first().ok_or_else(|| missing_arg(name))?;
            let len = match v {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Bytes(b) => b.len(),
                other => {
                    return Err(ExprError::InvalidArgument {
                        func: name.to_owned(),
                        reason: format!("expects a string or array, found {}", other.type_name()),
                    })
                }
            };
            Ok(Value::Bigint(len as i64))
        }
        "concat" => {
            let mut out = String::new();
            for v in args {
                out.push_str(&v.to_string());
            }
            Ok(Value::String(out))
        }
        other => Err(ExprError::UnknownFunction(other.to_owned())),
    }
}

fn missing_arg(func: &str) -> ExprError {
    ExprError::InvalidArgument {
        func: func.to_owned(),
        reason: "missing argument".into(),
    }
}

fn numeric_1(
    func: &str,
    args: &[Value],
    apply_f: impl Fn(f64) -> f64,
    apply_i: impl Fn(i64) -> Option<i64>,
) -> Result<Value> {
    match args.first().ok_or_else(|| missing_arg(func))? {
        Value::Bigint(i) => apply_i(*i)
            .map(Value::Bigint)
            .ok_or_else(|| ExprError::Eval("numeric overflow".into())),
        Value::Float(x) => Ok(Value::Float(apply_f(*x))),
        other => Err(ExprError::InvalidArgument {
            func: func.to_owned(),
            reason: format!("expects a number, found {}", other.type_name()),
        }),
    }
}

fn float_arg(func: &str, args: &[Value], idx: usize) -> Result<f64> {
    args.get(idx)
        .and_then(Value::as_f64)
        .ok_or_else(|| ExprError::InvalidArgument {
            func: func.to_owned(),
            reason: format!("expects a numeric argument at position {idx}"),
        })
}

fn str_arg<'a>(func: &str, args: &'a [Value], idx: usize) -> Result<&'a str> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| ExprError::InvalidArgument {
            func: func.to_owned(),
            reason: format!("expects a string argument at position {idx}"),
        })
}
