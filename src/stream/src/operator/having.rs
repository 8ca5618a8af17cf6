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

use rengine_common::tuple::GroupBatch;
use rengine_common::Value;
use rengine_expr::eval::eval_grouped;
use rengine_sqlparser::ast::Expr;

use super::{rows_of, OpResult, Operation, OperationError};
use crate::message::StreamData;

/// Filters grouped output by a condition evaluated over each group.
/// Ungrouped payloads are treated as one group: they pass or drop whole.
pub struct HavingOp {
    pub condition: Expr,
}

impl HavingOp {
    fn eval_group(&self, rows: &[rengine_common::tuple::DataRow]) -> Result<bool, OperationError> {
        let v = eval_grouped(&self.condition, rows)
            .map_err(|e| OperationError(format!("run Having error: {e}")))?;
        Ok(v == Value::Bool(true))
    }
}

impl Operation for HavingOp {
    fn apply(&self, data: StreamData) -> OpResult {
        match data {
            StreamData::Groups(batch) => {
                let mut groups = vec![];
                for rows in batch.groups {
                    if self.eval_group(&rows)? {
                        groups.push(rows);
                    }
                }
                if groups.is_empty() {
                    Ok(vec![])
                } else {
                    Ok(vec![StreamData::Groups(GroupBatch { groups })])
                }
            }
            other => {
                let rows = rows_of(&other);
                if !rows.is_empty() && self.eval_group(&rows)? {
                    Ok(vec![other])
                } else {
                    Ok(vec![])
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rengine_common::tuple::{DataRow, Tuple};
    use rengine_common::Map;
    use rengine_sqlparser::parse_select;

    use super::*;

    fn row(size: i64) -> DataRow {
        let mut m = Map::new();
        m.insert("size".into(), Value::Bigint(size));
        DataRow::Tuple(Tuple::new("demo", m, Map::new(), 0))
    }

    fn having(sql: &str) -> HavingOp {
        HavingOp {
            condition: parse_select(sql).unwrap().having.unwrap(),
        }
    }

    #[test]
    fn test_having_filters_groups() {
        let op = having("SELECT size FROM demo GROUP BY size HAVING count(*) > 1");
        let batch = GroupBatch {
            groups: vec![vec![row(1), row(1)], vec![row(2)]],
        };
        let out = op.apply(StreamData::Groups(batch)).unwrap();
        let [StreamData::Groups(g)] = out.as_slice() else {
            panic!("expected groups")
        };
        assert_eq!(g.groups.len(), 1);
        assert_eq!(g.groups[0].len(), 2);
    }

    #[test]
    fn test_having_drops_everything() {
        let op = having("SELECT size FROM demo GROUP BY size HAVING count(*) > 10");
        let batch = GroupBatch {
            groups: vec![vec![row(1)]],
        };
        assert!(op.apply(StreamData::Groups(batch)).unwrap().is_empty());
    }

    #[test]
    fn test_having_over_ungrouped_batch() {
        let op = having("SELECT size FROM demo HAVING sum(size) > 2");
        let mut batch = rengine_common::tuple::WindowBatch::new();
        let DataRow::Tuple(t) = row(3) else { unreachable!() };
        batch.push(t);
        assert_eq!(op.apply(StreamData::Window(batch)).unwrap().len(), 1);
    }
}
