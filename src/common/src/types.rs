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

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An insertion-ordered field mapping. Field order is what the user wrote in
/// the SELECT list (or the source payload) and is preserved end to end.
pub type Map = IndexMap<String, Value>;

/// The dynamic value set carried by tuples.
///
/// Arithmetic coercion follows the lattice `int64 ⊂ float64`; everything else
/// is a hard mismatch surfaced by the evaluator. Variant order matters for
/// the untagged deserialization: integers must be tried before floats, and
/// `Array`/`Struct` before `Bytes` so JSON arrays never decode as bytea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Bigint(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Struct(Map),
    Bytes(Vec<u8>),
}

impl Value {
    /// The user-facing type name, used verbatim in evaluation errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "nil",
            Value::Bool(_) => "bool",
            Value::Bigint(_) => "int64",
            Value::Float(_) => "float64",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Bytes(_) => "bytea",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bigint(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view over the `int64 ⊂ float64` lattice.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bigint(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Bigint(_) | Value::Float(_))
    }

    /// Total-ish comparison used by ORDER BY and MIN/MAX: nulls sort first,
    /// numerics compare across the lattice, then strings, then bools.
    /// Incomparable kinds fall back to their type names so sorts stay stable.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (a, b) if a.is_numeric() && b.is_numeric() => a
                .as_f64()
                .unwrap()
                .partial_cmp(&b.as_f64().unwrap())
                .unwrap_or(Ordering::Equal),
            (String(a), String(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (a, b) => a.type_name().cmp(b.type_name()),
        }
    }

    /// Lossless conversion from a decoded JSON document.
    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Bigint(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Struct(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Bigint(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Struct(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Bigint(i) => write!(f, "{i}"),
            // Whole floats render without the trailing fraction, so template
            // output of `add` over decoded JSON numbers stays integral.
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{}", *x as i64)
            }
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Bigint(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip_keeps_integers() {
        let v: Value =
            serde_json::from_str(r#"{"color":"red","size":3,"ratio":0.5,"tags":[1,2]}"#).unwrap();
        let Value::Struct(m) = &v else {
            panic!("expected struct")
        };
        assert_eq!(m["size"], Value::Bigint(3));
        assert_eq!(m["ratio"], Value::Float(0.5));
        assert_eq!(m["tags"], Value::Array(vec![1i64.into(), 2i64.into()]));
        // insertion order survives
        assert_eq!(
            m.keys().collect::<Vec<_>>(),
            vec!["color", "size", "ratio", "tags"]
        );
    }

    #[test]
    fn test_display_matches_wire_format() {
        assert_eq!(Value::Bigint(103).to_string(), "103");
        assert_eq!(Value::Float(103.0).to_string(), "103");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::String("red".into()).to_string(), "red");
    }

    #[test]
    fn test_sort_cmp() {
        assert_eq!(
            Value::Bigint(2).sort_cmp(&Value::Float(2.5)),
            Ordering::Less
        );
        assert_eq!(Value::Null.sort_cmp(&Value::Bigint(-7)), Ordering::Less);
        assert_eq!(
            Value::String("blue".into()).sort_cmp(&Value::String("red".into())),
            Ordering::Less
        );
    }
}
