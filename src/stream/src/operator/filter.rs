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

use rengine_common::tuple::{JoinBatch, WindowBatch};
use rengine_expr::eval::eval_condition;
use rengine_sqlparser::ast::Expr;

use super::{OpResult, Operation, OperationError};
use crate::message::StreamData;

/// Drops tuples whose condition does not evaluate to true. Inside window and
/// join batches the condition filters the contained rows; a batch filtered
/// down to nothing emits nothing.
pub struct FilterOp {
    pub condition: Expr,
}

impl FilterOp {
    fn err(e: impl std::fmt::Display) -> OperationError {
        OperationError(format!("run Where error: {e}"))
    }
}

impl Operation for FilterOp {
    fn apply(&self, data: StreamData) -> OpResult {
        match data {
            StreamData::Tuple(t) => {
                if eval_condition(&self.condition, &t).map_err(Self::err)? {
                    Ok(vec![StreamData::Tuple(t)])
                } else {
                    Ok(vec![])
                }
            }
            StreamData::Window(batch) => {
                let mut out = WindowBatch::new();
                for (emitter, tuples) in batch.emitters {
                    let mut kept = vec![];
                    for t in tuples {
                        if eval_condition(&self.condition, &t).map_err(Self::err)? {
                            kept.push(t);
                        }
                    }
                    if !kept.is_empty() {
                        out.emitters.push((emitter, kept));
                    }
                }
                if out.is_empty() {
                    Ok(vec![])
                } else {
                    Ok(vec![StreamData::Window(out)])
                }
            }
            StreamData::Join(batch) => {
                let mut rows = vec![];
                for row in batch.rows {
                    if eval_condition(&self.condition, &row).map_err(Self::err)? {
                        rows.push(row);
                    }
                }
                if rows.is_empty() {
                    Ok(vec![])
                } else {
                    Ok(vec![StreamData::Join(JoinBatch { rows })])
                }
            }
            other => Ok(vec![other]),
        }
    }
}

#[cfg(test)]
mod tests {
    use rengine_common::tuple::Tuple;
    use rengine_common::{Map, Value};
    use rengine_sqlparser::parse_select;

    use super::*;

    fn tuple(size: Value) -> Tuple {
        let mut m = Map::new();
        m.insert("size".into(), size);
        Tuple::new("demo", m, Map::new(), 0)
    }

    fn filter(sql_cond: &str) -> FilterOp {
        FilterOp {
            condition: parse_select(&format!("SELECT * FROM demo WHERE {sql_cond}"))
                .unwrap()
                .condition
                .unwrap(),
        }
    }

    #[test]
    fn test_filter_tuple() {
        let op = filter("size > 3");
        assert_eq!(
            op.apply(StreamData::Tuple(tuple(Value::Bigint(6))))
                .unwrap()
                .len(),
            1
        );
        assert!(op
            .apply(StreamData::Tuple(tuple(Value::Bigint(2))))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_filter_window_batch() {
        let op = filter("size > 3");
        let mut batch = WindowBatch::new();
        for i in [1i64, 4, 6] {
            batch.push(tuple(Value::Bigint(i)));
        }
        let out = op.apply(StreamData::Window(batch)).unwrap();
        let [StreamData::Window(b)] = out.as_slice() else {
            panic!("expected a batch")
        };
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_filter_error_message() {
        let op = filter("size * 5 > 3");
        let err = op
            .apply(StreamData::Tuple(tuple(Value::String("string".into()))))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "run Where error: invalid operation string(string) * int64(5)"
        );
    }

    #[test]
    fn test_all_filtered_emits_nothing() {
        let op = filter("size > 100");
        let mut batch = WindowBatch::new();
        batch.push(tuple(Value::Bigint(1)));
        assert!(op.apply(StreamData::Window(batch)).unwrap().is_empty());
    }
}
