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

use rengine_common::tuple::{JoinBatch, JoinTuple, Tuple};
use rengine_expr::eval::eval_condition;
use rengine_sqlparser::ast::{Join, JoinType};

use super::{OpResult, Operation, OperationError};
use crate::message::StreamData;

/// Evaluates each join clause against the aligned tuple sets of one batch,
/// producing one output row per qualifying combination. Joins fold left to
/// right in declaration order.
pub struct JoinOp {
    pub from_name: String,
    pub joins: Vec<Join>,
}

impl JoinOp {
    fn err(e: impl std::fmt::Display) -> OperationError {
        OperationError(format!("run Join error: {e}"))
    }

    fn matches(&self, join: &Join, candidate: &JoinTuple) -> Result<bool, OperationError> {
        match &join.on {
            Some(cond) => eval_condition(cond, candidate).map_err(Self::err),
            None => Ok(true),
        }
    }

    fn merge(
        &self,
        left: Vec<JoinTuple>,
        right: &[Tuple],
        join: &Join,
    ) -> Result<Vec<JoinTuple>, OperationError> {
        let mut out = vec![];
        let mut right_matched = vec![false; right.len()];
        for l in left {
            let mut matched = false;
            for (ridx, r) in right.iter().enumerate() {
                let mut candidate = l.clone();
                candidate.tuples.push(r.clone());
                if self.matches(join, &candidate)? {
                    matched = true;
                    right_matched[ridx] = true;
                    out.push(candidate);
                }
            }
            let keep_unmatched_left =
                matches!(join.join_type, JoinType::Left | JoinType::Full);
            if !matched && keep_unmatched_left {
                out.push(l);
            }
        }
        if matches!(join.join_type, JoinType::Right | JoinType::Full) {
            for (ridx, r) in right.iter().enumerate() {
                if !right_matched[ridx] {
                    out.push(JoinTuple {
                        tuples: vec![r.clone()],
                    });
                }
            }
        }
        Ok(out)
    }
}

impl Operation for JoinOp {
    fn apply(&self, data: StreamData) -> OpResult {
        let batch = match data {
            StreamData::Window(b) => b,
            other => return Ok(vec![other]),
        };
        let mut current: Vec<JoinTuple> = batch
            .tuples_for(&self.from_name)
            .iter()
            .map(|t| JoinTuple {
                tuples: vec![t.clone()],
            })
            .collect();
        for join in &self.joins {
            let right = batch.tuples_for(&join.table.name);
            current = self.merge(current, right, join)?;
        }
        if current.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![StreamData::Join(JoinBatch { rows: current })])
        }
    }
}

#[cfg(test)]
mod tests {
    use rengine_common::tuple::WindowBatch;
    use rengine_common::{Map, Value};
    use rengine_sqlparser::parse_select;

    use super::*;

    fn tuple(emitter: &str, pairs: &[(&str, i64)]) -> Tuple {
        let m = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), Value::Bigint(*v)))
            .collect();
        Tuple::new(emitter, m, Map::new(), 0)
    }

    fn join_op(sql: &str) -> JoinOp {
        let stmt = parse_select(sql).unwrap();
        JoinOp {
            from_name: stmt.sources[0].name.clone(),
            joins: stmt.joins,
        }
    }

    fn batch(streams: &[(&str, i64)], tables: &[(&str, i64)]) -> WindowBatch {
        let mut b = WindowBatch::new();
        for (k, v) in streams {
            b.push(tuple("demo", &[(k, *v)]));
        }
        b.emitters.push((
            "table1".into(),
            tables.iter().map(|(k, v)| tuple("table1", &[(k, *v)])).collect(),
        ));
        b
    }

    #[test]
    fn test_inner_join_matches() {
        let op = join_op("SELECT * FROM demo INNER JOIN table1 ON demo.ts = table1.id");
        let b = batch(&[("ts", 1), ("ts", 2), ("ts", 9)], &[("id", 1), ("id", 2)]);
        let out = op.apply(StreamData::Window(b)).unwrap();
        let [StreamData::Join(j)] = out.as_slice() else {
            panic!("expected join batch")
        };
        assert_eq!(j.rows.len(), 2);
        assert_eq!(j.rows[0].tuples.len(), 2);
    }

    #[test]
    fn test_left_join_keeps_unmatched_left() {
        let op = join_op("SELECT * FROM demo LEFT JOIN table1 ON demo.ts = table1.id");
        let b = batch(&[("ts", 1), ("ts", 9)], &[("id", 1)]);
        let out = op.apply(StreamData::Window(b)).unwrap();
        let [StreamData::Join(j)] = out.as_slice() else {
            panic!("expected join batch")
        };
        assert_eq!(j.rows.len(), 2);
        // the unmatched row has only its own side
        assert_eq!(j.rows[1].tuples.len(), 1);
        assert_eq!(j.rows[1].value(Some("table1"), "id"), None);
    }

    #[test]
    fn test_right_and_full_join() {
        let op = join_op("SELECT * FROM demo RIGHT JOIN table1 ON demo.ts = table1.id");
        let b = batch(&[("ts", 1)], &[("id", 1), ("id", 5)]);
        let out = op.apply(StreamData::Window(b)).unwrap();
        let [StreamData::Join(j)] = out.as_slice() else {
            panic!("expected join batch")
        };
        assert_eq!(j.rows.len(), 2);

        let op = join_op("SELECT * FROM demo FULL JOIN table1 ON demo.ts = table1.id");
        let b = batch(&[("ts", 1), ("ts", 9)], &[("id", 1), ("id", 5)]);
        let out = op.apply(StreamData::Window(b)).unwrap();
        let [StreamData::Join(j)] = out.as_slice() else {
            panic!("expected join batch")
        };
        // 1 match + 1 unmatched left + 1 unmatched right
        assert_eq!(j.rows.len(), 3);
    }

    #[test]
    fn test_cross_join() {
        let op = join_op("SELECT * FROM demo CROSS JOIN table1");
        let b = batch(&[("ts", 1), ("ts", 2)], &[("id", 1), ("id", 2)]);
        let out = op.apply(StreamData::Window(b)).unwrap();
        let [StreamData::Join(j)] = out.as_slice() else {
            panic!("expected join batch")
        };
        assert_eq!(j.rows.len(), 4);
    }

    #[test]
    fn test_no_match_emits_nothing() {
        let op = join_op("SELECT * FROM demo INNER JOIN table1 ON demo.ts = table1.id");
        let b = batch(&[("ts", 9)], &[("id", 1)]);
        assert!(op.apply(StreamData::Window(b)).unwrap().is_empty());
    }
}
