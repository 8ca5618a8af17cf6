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

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{Map, Value};

/// A decoded event flowing through a topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// Name of the stream (or table) this tuple came from.
    pub emitter: String,
    pub message: Map,
    pub metadata: Map,
    /// Event timestamp in ms. Source-assigned in processing-time mode,
    /// extracted from the declared timestamp field in event-time mode.
    pub timestamp: i64,
}

impl Tuple {
    pub fn new(emitter: impl Into<String>, message: Map, metadata: Map, timestamp: i64) -> Self {
        Self {
            emitter: emitter.into(),
            message,
            metadata,
            timestamp,
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.message.get(name)
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// An undecoded event as produced by a source: raw payload plus whatever
/// metadata the source attaches. Decoding and schema validation happen in the
/// preprocessor operator.
#[derive(Debug, Clone)]
pub struct RawTuple {
    pub payload: Bytes,
    pub metadata: Map,
    pub timestamp: i64,
    /// Source-local offset, recorded into checkpoints so the source can be
    /// rewound on restore.
    pub offset: u64,
    /// Set on the final element of a bounded (table) read. The table
    /// processor closes its snapshot when it sees this.
    pub batch_end: bool,
}

/// The contents of one closed window, grouped by emitter so downstream joins
/// can tell the sides apart. Moved (never shared) downstream on close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowBatch {
    pub emitters: Vec<(String, Vec<Tuple>)>,
}

impl WindowBatch {
    pub fn new() -> Self {
        Self { emitters: vec![] }
    }

    pub fn single(emitter: &str, tuples: Vec<Tuple>) -> Self {
        Self {
            emitters: vec![(emitter.to_owned(), tuples)],
        }
    }

    pub fn push(&mut self, tuple: Tuple) {
        match self.emitters.iter_mut().find(|(e, _)| *e == tuple.emitter) {
            Some((_, tuples)) => tuples.push(tuple),
            None => self.emitters.push((tuple.emitter.clone(), vec![tuple])),
        }
    }

    pub fn tuples_for(&self, emitter: &str) -> &[Tuple] {
        self.emitters
            .iter()
            .find(|(e, _)| e == emitter)
            .map(|(_, t)| t.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter_tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.emitters.iter().flat_map(|(_, tuples)| tuples.iter())
    }

    pub fn len(&self) -> usize {
        self.emitters.iter().map(|(_, t)| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WindowBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// One qualifying combination produced by the join kernel: the participating
/// tuples, one per side. Field lookup resolves qualified references by
/// emitter and unqualified ones first-match in join order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTuple {
    pub tuples: Vec<Tuple>,
}

impl JoinTuple {
    pub fn value(&self, source: Option<&str>, name: &str) -> Option<&Value> {
        match source {
            Some(emitter) => self
                .tuples
                .iter()
                .find(|t| t.emitter == emitter)
                .and_then(|t| t.value(name)),
            None => self.tuples.iter().find_map(|t| t.value(name)),
        }
    }

    /// All fields of all sides, later sides never shadowing earlier ones.
    pub fn merged(&self) -> Map {
        let mut out = Map::new();
        for t in &self.tuples {
            for (k, v) in &t.message {
                out.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinBatch {
    pub rows: Vec<JoinTuple>,
}

/// A row after windowing: either a plain tuple or a join combination.
/// Aggregate, having, order and project all operate on this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataRow {
    Tuple(Tuple),
    Join(JoinTuple),
}

impl DataRow {
    pub fn value(&self, source: Option<&str>, name: &str) -> Option<&Value> {
        match self {
            DataRow::Tuple(t) => match source {
                Some(emitter) if emitter != t.emitter => None,
                _ => t.value(name),
            },
            DataRow::Join(j) => j.value(source, name),
        }
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        match self {
            DataRow::Tuple(t) => t.meta(key),
            DataRow::Join(j) => j.tuples.first().and_then(|t| t.meta(key)),
        }
    }

    pub fn fields(&self) -> Map {
        match self {
            DataRow::Tuple(t) => t.message.clone(),
            DataRow::Join(j) => j.merged(),
        }
    }

    pub fn metadata(&self) -> Option<&Map> {
        match self {
            DataRow::Tuple(t) => Some(&t.metadata),
            DataRow::Join(j) => j.tuples.first().map(|t| &t.metadata),
        }
    }
}

/// Output of the aggregate kernel: rows partitioned by group key, one entry
/// per distinct key in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBatch {
    pub groups: Vec<Vec<DataRow>>,
}

/// A projected record headed for the sinks. Metadata rides along only when
/// `sendMetaToSink` is set; sink implementations decide what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRow {
    pub fields: Map,
    pub metadata: Option<Map>,
}

impl SinkRow {
    pub fn to_value(&self) -> Value {
        let mut fields = self.fields.clone();
        if let Some(meta) = &self.metadata {
            fields.insert("__meta".to_owned(), Value::Struct(meta.clone()));
        }
        Value::Struct(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(emitter: &str, pairs: &[(&str, Value)]) -> Tuple {
        let message = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        Tuple::new(emitter, message, Map::new(), 0)
    }

    #[test]
    fn test_window_batch_groups_by_emitter() {
        let mut batch = WindowBatch::new();
        batch.push(tuple("demo", &[("size", 1i64.into())]));
        batch.push(tuple("demo1", &[("temp", 20i64.into())]));
        batch.push(tuple("demo", &[("size", 2i64.into())]));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.tuples_for("demo").len(), 2);
        assert_eq!(batch.tuples_for("demo1").len(), 1);
        assert_eq!(batch.tuples_for("missing").len(), 0);
    }

    #[test]
    fn test_join_tuple_lookup() {
        let j = JoinTuple {
            tuples: vec![
                tuple("demo", &[("id", 1i64.into()), ("color", "red".into())]),
                tuple("table1", &[("id", 1i64.into()), ("name", "a".into())]),
            ],
        };
        assert_eq!(j.value(Some("table1"), "name"), Some(&"a".into()));
        // unqualified resolves in join order
        assert_eq!(j.value(None, "id"), Some(&Value::Bigint(1)));
        assert_eq!(j.value(Some("demo"), "name"), None);
        let merged = j.merged();
        assert_eq!(
            merged.keys().collect::<Vec<_>>(),
            vec!["id", "color", "name"]
        );
    }
}
