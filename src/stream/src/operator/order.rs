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

use rengine_common::tuple::{DataRow, GroupBatch, JoinBatch};
use rengine_common::Value;
use rengine_sqlparser::ast::SortField;

use super::{OpResult, Operation};
use crate::message::StreamData;

/// Stable sort of the rows within one payload by the listed fields, with
/// per-field ASC/DESC. Runs with concurrency 1.
pub struct OrderOp {
    pub sort_fields: Vec<SortField>,
}

impl OrderOp {
    fn cmp_values(&self, a: &DataRow, b: &DataRow) -> Ordering {
        for sf in &self.sort_fields {
            let av = a.value(sf.source.as_deref(), &sf.name).cloned();
            let bv = b.value(sf.source.as_deref(), &sf.name).cloned();
            let ord = av
                .unwrap_or(Value::Null)
                .sort_cmp(&bv.unwrap_or(Value::Null));
            let ord = if sf.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl Operation for OrderOp {
    fn apply(&self, data: StreamData) -> OpResult {
        match data {
            StreamData::Window(mut batch) => {
                for (_, tuples) in &mut batch.emitters {
                    let mut rows: Vec<DataRow> =
                        tuples.drain(..).map(DataRow::Tuple).collect();
                    rows.sort_by(|a, b| self.cmp_values(a, b));
                    tuples.extend(rows.into_iter().map(|r| match r {
                        DataRow::Tuple(t) => t,
                        DataRow::Join(_) => unreachable!("window rows are tuples"),
                    }));
                }
                Ok(vec![StreamData::Window(batch)])
            }
            StreamData::Join(batch) => {
                let mut rows: Vec<DataRow> =
                    batch.rows.into_iter().map(DataRow::Join).collect();
                rows.sort_by(|a, b| self.cmp_values(a, b));
                let rows = rows
                    .into_iter()
                    .map(|r| match r {
                        DataRow::Join(j) => j,
                        DataRow::Tuple(_) => unreachable!("join rows are join tuples"),
                    })
                    .collect();
                Ok(vec![StreamData::Join(JoinBatch { rows })])
            }
            StreamData::Groups(mut batch) => {
                // groups sort by their first row; rows inside keep arrival order
                batch.groups.sort_by(|a, b| match (a.first(), b.first()) {
                    (Some(a), Some(b)) => self.cmp_values(a, b),
                    _ => Ordering::Equal,
                });
                Ok(vec![StreamData::Groups(GroupBatch {
                    groups: batch.groups,
                })])
            }
            other => Ok(vec![other]),
        }
    }
}

#[cfg(test)]
mod tests {
    use rengine_common::tuple::{Tuple, WindowBatch};
    use rengine_common::Map;

    use super::*;

    fn tuple(color: &str, size: i64) -> Tuple {
        let mut m = Map::new();
        m.insert("color".into(), color.into());
        m.insert("size".into(), Value::Bigint(size));
        Tuple::new("demo", m, Map::new(), 0)
    }

    fn sizes(batch: &WindowBatch) -> Vec<i64> {
        batch
            .iter_tuples()
            .map(|t| t.value("size").unwrap().as_i64().unwrap())
            .collect()
    }

    #[test]
    fn test_sort_asc_desc() {
        let mut batch = WindowBatch::new();
        for (c, s) in [("red", 3), ("blue", 6), ("blue", 2)] {
            batch.push(tuple(c, s));
        }
        let op = OrderOp {
            sort_fields: vec![SortField {
                source: None,
                name: "size".into(),
                ascending: true,
            }],
        };
        let out = op.apply(StreamData::Window(batch.clone())).unwrap();
        let [StreamData::Window(sorted)] = out.as_slice() else {
            panic!("expected window")
        };
        assert_eq!(sizes(sorted), vec![2, 3, 6]);

        let op = OrderOp {
            sort_fields: vec![SortField {
                source: None,
                name: "size".into(),
                ascending: false,
            }],
        };
        let out = op.apply(StreamData::Window(batch)).unwrap();
        let [StreamData::Window(sorted)] = out.as_slice() else {
            panic!("expected window")
        };
        assert_eq!(sizes(sorted), vec![6, 3, 2]);
    }

    #[test]
    fn test_stable_multi_key_sort() {
        let mut batch = WindowBatch::new();
        for (c, s) in [("blue", 6), ("red", 3), ("blue", 2), ("red", 3)] {
            batch.push(tuple(c, s));
        }
        let op = OrderOp {
            sort_fields: vec![
                SortField {
                    source: None,
                    name: "color".into(),
                    ascending: true,
                },
                SortField {
                    source: None,
                    name: "size".into(),
                    ascending: true,
                },
            ],
        };
        let out = op.apply(StreamData::Window(batch)).unwrap();
        let [StreamData::Window(sorted)] = out.as_slice() else {
            panic!("expected window")
        };
        let keys: Vec<(String, i64)> = sorted
            .iter_tuples()
            .map(|t| {
                (
                    t.value("color").unwrap().to_string(),
                    t.value("size").unwrap().as_i64().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("blue".into(), 2),
                ("blue".into(), 6),
                ("red".into(), 3),
                ("red".into(), 3),
            ]
        );
    }
}
