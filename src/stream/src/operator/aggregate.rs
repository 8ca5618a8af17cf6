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

use indexmap::IndexMap;
use itertools::Itertools;
use rengine_common::tuple::GroupBatch;
use rengine_expr::eval::eval;
use rengine_sqlparser::ast::Expr;

use super::{rows_of, OpResult, Operation, OperationError};
use crate::message::StreamData;

/// Partitions the rows of the current payload by the dimension expressions.
/// Groups come out in first-seen order; an empty dimension list produces a
/// single group holding every row.
pub struct AggregateOp {
    pub dimensions: Vec<Expr>,
}

impl Operation for AggregateOp {
    fn apply(&self, data: StreamData) -> OpResult {
        let rows = rows_of(&data);
        if rows.is_empty() {
            return Ok(vec![]);
        }
        if self.dimensions.is_empty() {
            return Ok(vec![StreamData::Groups(GroupBatch { groups: vec![rows] })]);
        }
        let mut groups: IndexMap<String, Vec<_>> = IndexMap::new();
        for row in rows {
            // type-tagged so 1 and "1" land in different groups
            let parts: Vec<String> = self
                .dimensions
                .iter()
                .map(|dim| {
                    eval(dim, &row)
                        .map(|v| format!("{}:{}", v.type_name(), v))
                        .map_err(|e| OperationError(format!("run Aggregate error: {e}")))
                })
                .collect::<Result<_, _>>()?;
            groups.entry(parts.iter().join("|")).or_default().push(row);
        }
        Ok(vec![StreamData::Groups(GroupBatch {
            groups: groups.into_values().collect(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use rengine_common::tuple::{Tuple, WindowBatch};
    use rengine_common::{Map, Value};
    use rengine_sqlparser::parse_select;

    use super::*;

    fn tuple(color: &str, size: i64) -> Tuple {
        let mut m = Map::new();
        m.insert("color".into(), color.into());
        m.insert("size".into(), Value::Bigint(size));
        Tuple::new("demo", m, Map::new(), 0)
    }

    fn agg(sql: &str) -> AggregateOp {
        AggregateOp {
            dimensions: parse_select(sql).unwrap().dimensions,
        }
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let op = agg("SELECT color FROM demo GROUP BY color");
        let mut batch = WindowBatch::new();
        for (c, s) in [("red", 3), ("blue", 6), ("red", 1), ("yellow", 4)] {
            batch.push(tuple(c, s));
        }
        let out = op.apply(StreamData::Window(batch)).unwrap();
        let [StreamData::Groups(g)] = out.as_slice() else {
            panic!("expected groups")
        };
        assert_eq!(g.groups.len(), 3);
        assert_eq!(g.groups[0].len(), 2); // red
        assert_eq!(g.groups[1].len(), 1); // blue
        assert_eq!(
            g.groups[0][0].value(None, "color"),
            Some(&Value::String("red".into()))
        );
    }

    #[test]
    fn test_empty_dimensions_single_group() {
        let op = AggregateOp { dimensions: vec![] };
        let mut batch = WindowBatch::new();
        batch.push(tuple("red", 3));
        batch.push(tuple("blue", 6));
        let out = op.apply(StreamData::Window(batch)).unwrap();
        let [StreamData::Groups(g)] = out.as_slice() else {
            panic!("expected groups")
        };
        assert_eq!(g.groups.len(), 1);
        assert_eq!(g.groups[0].len(), 2);
    }

    #[test]
    fn test_empty_payload_emits_nothing() {
        let op = agg("SELECT color FROM demo GROUP BY color");
        assert!(op
            .apply(StreamData::Window(WindowBatch::new()))
            .unwrap()
            .is_empty());
    }
}
