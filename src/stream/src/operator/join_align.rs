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

use std::collections::HashMap;

use parking_lot::Mutex;
use rengine_common::tuple::{Tuple, WindowBatch};
use rengine_common::Value;
use serde::{Deserialize, Serialize};

use super::{OpResult, Operation};
use crate::message::StreamData;

#[derive(Default, Serialize, Deserialize)]
struct AlignState {
    /// Latest snapshot per table emitter.
    tables: HashMap<String, Vec<Tuple>>,
    /// Stream elements that arrived before the first table snapshot.
    pending: Vec<WindowBatch>,
}

/// Aligns each stream element (tuple or closed window) with the latest
/// snapshot of every joined table, so the join kernel always sees both sides
/// in one batch. Table snapshots themselves produce no output.
pub struct JoinAlignOp {
    table_emitters: Vec<String>,
    state: Mutex<AlignState>,
}

impl JoinAlignOp {
    pub fn new(table_emitters: Vec<String>) -> Self {
        Self {
            table_emitters,
            state: Mutex::new(AlignState::default()),
        }
    }

    fn is_table_snapshot(&self, batch: &WindowBatch) -> bool {
        !batch.emitters.is_empty()
            && batch
                .emitters
                .iter()
                .all(|(e, _)| self.table_emitters.iter().any(|t| t == e))
    }

    fn combine(state: &AlignState, mut batch: WindowBatch) -> WindowBatch {
        for (emitter, tuples) in &state.tables {
            batch.emitters.push((emitter.clone(), tuples.clone()));
        }
        batch
    }
}

impl Operation for JoinAlignOp {
    fn apply(&self, data: StreamData) -> OpResult {
        let mut state = self.state.lock();
        let stream_batch = match data {
            StreamData::Window(batch) if self.is_table_snapshot(&batch) => {
                for (emitter, tuples) in batch.emitters {
                    state.tables.insert(emitter, tuples);
                }
                if state.tables.len() == self.table_emitters.len() {
                    let pending = std::mem::take(&mut state.pending);
                    return Ok(pending
                        .into_iter()
                        .map(|b| StreamData::Window(Self::combine(&state, b)))
                        .collect());
                }
                return Ok(vec![]);
            }
            StreamData::Tuple(t) => {
                let mut b = WindowBatch::new();
                b.push(t);
                b
            }
            StreamData::Window(batch) => batch,
            other => return Ok(vec![other]),
        };
        if state.tables.len() < self.table_emitters.len() {
            state.pending.push(stream_batch);
            return Ok(vec![]);
        }
        Ok(vec![StreamData::Window(Self::combine(&state, stream_batch))])
    }

    fn snapshot(&self) -> Option<Value> {
        let state = self.state.lock();
        serde_json::to_value(&*state).ok().map(Value::from_json)
    }

    fn restore(&self, state: Value) {
        if let Ok(restored) = serde_json::from_value(state.to_json()) {
            *self.state.lock() = restored;
        }
    }
}

#[cfg(test)]
mod tests {
    use rengine_common::Map;

    use super::*;

    fn tuple(emitter: &str, id: i64) -> Tuple {
        let mut m = Map::new();
        m.insert("id".into(), Value::Bigint(id));
        Tuple::new(emitter, m, Map::new(), 0)
    }

    fn snapshot(rows: &[i64]) -> WindowBatch {
        WindowBatch::single("table1", rows.iter().map(|i| tuple("table1", *i)).collect())
    }

    #[test]
    fn test_aligns_tuples_with_snapshot() {
        let op = JoinAlignOp::new(vec!["table1".into()]);
        assert!(op
            .apply(StreamData::Window(snapshot(&[1, 2, 3])))
            .unwrap()
            .is_empty());

        let out = op.apply(StreamData::Tuple(tuple("demo", 1))).unwrap();
        let [StreamData::Window(b)] = out.as_slice() else {
            panic!("expected aligned batch")
        };
        assert_eq!(b.tuples_for("demo").len(), 1);
        assert_eq!(b.tuples_for("table1").len(), 3);
    }

    #[test]
    fn test_buffers_stream_until_snapshot() {
        let op = JoinAlignOp::new(vec!["table1".into()]);
        assert!(op.apply(StreamData::Tuple(tuple("demo", 1))).unwrap().is_empty());
        assert!(op.apply(StreamData::Tuple(tuple("demo", 2))).unwrap().is_empty());

        // the snapshot flushes everything buffered, aligned
        let out = op.apply(StreamData::Window(snapshot(&[7]))).unwrap();
        assert_eq!(out.len(), 2);
        let StreamData::Window(b) = &out[0] else {
            panic!("expected aligned batch")
        };
        assert_eq!(b.tuples_for("table1").len(), 1);
    }

    #[test]
    fn test_newer_snapshot_replaces_older() {
        let op = JoinAlignOp::new(vec!["table1".into()]);
        op.apply(StreamData::Window(snapshot(&[1]))).unwrap();
        op.apply(StreamData::Window(snapshot(&[1, 2]))).unwrap();
        let out = op.apply(StreamData::Tuple(tuple("demo", 1))).unwrap();
        let [StreamData::Window(b)] = out.as_slice() else {
            panic!("expected aligned batch")
        };
        assert_eq!(b.tuples_for("table1").len(), 2);
    }

    #[test]
    fn test_state_roundtrip() {
        let op = JoinAlignOp::new(vec!["table1".into()]);
        op.apply(StreamData::Window(snapshot(&[1, 2]))).unwrap();
        let state = op.snapshot().unwrap();

        let restored = JoinAlignOp::new(vec!["table1".into()]);
        restored.restore(state);
        let out = restored.apply(StreamData::Tuple(tuple("demo", 5))).unwrap();
        let [StreamData::Window(b)] = out.as_slice() else {
            panic!("expected aligned batch")
        };
        assert_eq!(b.tuples_for("table1").len(), 2);
    }
}
