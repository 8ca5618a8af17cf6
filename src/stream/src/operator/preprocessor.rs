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

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rengine_common::catalog::{FieldType, Format, StreamDefinition, StreamField};
use rengine_common::rule::RuleOptions;
use rengine_common::tuple::{RawTuple, Tuple, WindowBatch};
use rengine_common::{Map, Value};

use super::{OpResult, Operation, OperationError};
use crate::message::StreamData;

/// Decodes raw source payloads per the declared format, validates against the
/// declared schema (coercing to declared types), and stamps the event
/// timestamp. One preprocessor follows every stream source.
pub struct Preprocessor {
    stream_name: String,
    fields: Vec<StreamField>,
    format: Format,
    is_event_time: bool,
    timestamp_field: Option<String>,
    timestamp_format: Option<String>,
}

impl Preprocessor {
    pub fn new(def: &StreamDefinition, options: &RuleOptions) -> Self {
        Self {
            stream_name: def.name.clone(),
            fields: def.fields.clone(),
            format: def.options.format,
            is_event_time: options.is_event_time,
            timestamp_field: def.options.timestamp.clone(),
            timestamp_format: def.options.timestamp_format.clone(),
        }
    }

    pub(crate) fn process_raw(&self, raw: &RawTuple) -> Result<Tuple, OperationError> {
        let message = self.decode(raw)?;
        let message = self.validate(message)?;
        let timestamp = self.event_timestamp(&message, raw)?;
        Ok(Tuple::new(
            self.stream_name.clone(),
            message,
            raw.metadata.clone(),
            timestamp,
        ))
    }

    fn decode(&self, raw: &RawTuple) -> Result<Map, OperationError> {
        match self.format {
            Format::Json => {
                let doc: serde_json::Value = serde_json::from_slice(&raw.payload)
                    .map_err(|e| pp_error(format!("invalid json payload: {e}")))?;
                match Value::from_json(doc) {
                    Value::Struct(m) => Ok(m),
                    other => Err(pp_error(format!(
                        "payload must be a json object, found {}",
                        other.type_name()
                    ))),
                }
            }
            Format::Binary => {
                // binary payloads land verbatim under the `self` field
                let mut m = Map::new();
                m.insert("self".to_owned(), Value::Bytes(raw.payload.to_vec()));
                Ok(m)
            }
        }
    }

    /// Project to the declared schema, coercing each field to its declared
    /// type. Schemaless streams pass through untouched.
    fn validate(&self, message: Map) -> Result<Map, OperationError> {
        if self.fields.is_empty() {
            return Ok(message);
        }
        let mut out = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = match message.get(&field.name) {
                Some(v) => cast(v, field.ftype, self.timestamp_format.as_deref()).map_err(
                    |found| {
                        pp_error(format!(
                            "invalid data type for {}, expect {} but found {found}",
                            field.name, field.ftype
                        ))
                    },
                )?,
                None => Value::Null,
            };
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }

    fn event_timestamp(&self, message: &Map, raw: &RawTuple) -> Result<i64, OperationError> {
        if !self.is_event_time {
            return Ok(raw.timestamp);
        }
        let Some(field) = &self.timestamp_field else {
            return Err(pp_error(format!(
                "stream {} has no timestamp field declared for event time",
                self.stream_name
            )));
        };
        match message.get(field) {
            Some(Value::Bigint(ts)) => Ok(*ts),
            Some(Value::Float(ts)) => Ok(*ts as i64),
            Some(Value::String(s)) => parse_datetime(s, self.timestamp_format.as_deref())
                .ok_or_else(|| {
                    pp_error(format!("cannot parse timestamp field {field} from {s}"))
                }),
            other => Err(pp_error(format!(
                "cannot convert timestamp field {field}, found {:?}",
                other.map(Value::type_name)
            ))),
        }
    }
}

impl Operation for Preprocessor {
    fn apply(&self, data: StreamData) -> OpResult {
        match data {
            StreamData::Raw(raw) => Ok(vec![StreamData::Tuple(self.process_raw(&raw)?)]),
            other => Ok(vec![other]),
        }
    }
}

fn pp_error(msg: String) -> OperationError {
    OperationError(format!("error in preprocessor: {msg}"))
}

/// Coerce `value` to the declared type. On mismatch returns the
/// `<type>(<value>)` rendering of the offending value for the error message.
fn cast(value: &Value, ftype: FieldType, ts_format: Option<&str>) -> Result<Value, String> {
    let found = || format!("{}({})", value.type_name(), value);
    match ftype {
        FieldType::Bigint => match value {
            Value::Bigint(_) => Ok(value.clone()),
            Value::Float(x) if x.fract() == 0.0 => Ok(Value::Bigint(*x as i64)),
            _ => Err(found()),
        },
        FieldType::Float => match value {
            Value::Float(_) => Ok(value.clone()),
            Value::Bigint(i) => Ok(Value::Float(*i as f64)),
            _ => Err(found()),
        },
        FieldType::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(found()),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(found()),
        },
        FieldType::Datetime => match value {
            // datetimes normalize to epoch milliseconds
            Value::Bigint(_) => Ok(value.clone()),
            Value::Float(x) if x.fract() == 0.0 => Ok(Value::Bigint(*x as i64)),
            Value::String(s) => parse_datetime(s, ts_format)
                .map(Value::Bigint)
                .ok_or_else(found),
            _ => Err(found()),
        },
        FieldType::Bytea => match value {
            Value::Bytes(_) => Ok(value.clone()),
            Value::String(s) => Ok(Value::Bytes(s.clone().into_bytes())),
            _ => Err(found()),
        },
        FieldType::Array => match value {
            Value::Array(_) => Ok(value.clone()),
            _ => Err(found()),
        },
        FieldType::Struct => match value {
            Value::Struct(_) => Ok(value.clone()),
            _ => Err(found()),
        },
    }
}

fn parse_datetime(s: &str, format: Option<&str>) -> Option<i64> {
    if let Some(fmt) = format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// The table-side counterpart of the preprocessor: decodes and validates each
/// bounded row, buffers up to `retain_size`, and emits one snapshot batch
/// when the source signals the end of its read. The snapshot feeds the
/// join aligner downstream.
pub struct TableProcessor {
    inner: Preprocessor,
    table_name: String,
    retain_size: usize,
    buffer: Mutex<Vec<Tuple>>,
}

impl TableProcessor {
    pub fn new(def: &StreamDefinition, options: &RuleOptions) -> Self {
        Self {
            inner: Preprocessor::new(def, options),
            table_name: def.name.clone(),
            retain_size: def.options.retain_size,
            buffer: Mutex::new(vec![]),
        }
    }
}

impl Operation for TableProcessor {
    fn apply(&self, data: StreamData) -> OpResult {
        match data {
            StreamData::Raw(raw) => {
                let tuple = self.inner.process_raw(&raw)?;
                let mut buffer = self.buffer.lock();
                buffer.push(tuple);
                if self.retain_size > 0 && buffer.len() > self.retain_size {
                    let excess = buffer.len() - self.retain_size;
                    buffer.drain(..excess);
                }
                if raw.batch_end {
                    let snapshot = buffer.clone();
                    Ok(vec![StreamData::Window(WindowBatch::single(
                        &self.table_name,
                        snapshot,
                    ))])
                } else {
                    Ok(vec![])
                }
            }
            other => Ok(vec![other]),
        }
    }

    fn snapshot(&self) -> Option<Value> {
        let buffer = self.buffer.lock();
        serde_json::to_value(&*buffer).ok().map(Value::from_json)
    }

    fn restore(&self, state: Value) {
        if let Ok(rows) = serde_json::from_value(state.to_json()) {
            *self.buffer.lock() = rows;
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rengine_common::catalog::{StreamKind, StreamOptions};

    use super::*;

    fn demo_def() -> StreamDefinition {
        StreamDefinition {
            name: "demo".into(),
            kind: StreamKind::Stream,
            fields: vec![
                StreamField {
                    name: "color".into(),
                    ftype: FieldType::String,
                },
                StreamField {
                    name: "size".into(),
                    ftype: FieldType::Bigint,
                },
                StreamField {
                    name: "ts".into(),
                    ftype: FieldType::Bigint,
                },
            ],
            options: StreamOptions {
                timestamp: Some("ts".into()),
                ..Default::default()
            },
        }
    }

    fn raw(json: &str) -> RawTuple {
        RawTuple {
            payload: Bytes::from(json.to_owned()),
            metadata: Map::new(),
            timestamp: 100,
            offset: 0,
            batch_end: false,
        }
    }

    #[test]
    fn test_decode_validate_project() {
        let pp = Preprocessor::new(&demo_def(), &RuleOptions::default());
        let out = pp
            .apply(StreamData::Raw(raw(
                r#"{"color":"red","size":3,"ts":1541152486013,"extra":1}"#,
            )))
            .unwrap();
        let [StreamData::Tuple(t)] = out.as_slice() else {
            panic!("expected one tuple")
        };
        // declared fields only, in schema order; processing-time stamp
        assert_eq!(t.message.keys().collect::<Vec<_>>(), vec!["color", "size", "ts"]);
        assert_eq!(t.value("size"), Some(&Value::Bigint(3)));
        assert_eq!(t.timestamp, 100);
        assert_eq!(t.emitter, "demo");
    }

    #[test]
    fn test_invalid_type_message() {
        let pp = Preprocessor::new(&demo_def(), &RuleOptions::default());
        let err = pp
            .apply(StreamData::Raw(raw(r#"{"color":"red","size":"red","ts":1}"#)))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error in preprocessor: invalid data type for size, expect bigint but found string(red)"
        );
    }

    #[test]
    fn test_event_time_extraction() {
        let options = RuleOptions {
            is_event_time: true,
            ..Default::default()
        };
        let pp = Preprocessor::new(&demo_def(), &options);
        let out = pp
            .apply(StreamData::Raw(raw(
                r#"{"color":"red","size":3,"ts":1541152486013}"#,
            )))
            .unwrap();
        let [StreamData::Tuple(t)] = out.as_slice() else {
            panic!("expected one tuple")
        };
        assert_eq!(t.timestamp, 1541152486013);
    }

    #[test]
    fn test_schemaless_pass_through() {
        let mut def = demo_def();
        def.fields.clear();
        let pp = Preprocessor::new(&def, &RuleOptions::default());
        let out = pp
            .apply(StreamData::Raw(raw(r#"{"anything":"goes","size":"string"}"#)))
            .unwrap();
        let [StreamData::Tuple(t)] = out.as_slice() else {
            panic!("expected one tuple")
        };
        assert_eq!(t.value("size"), Some(&Value::String("string".into())));
    }

    #[test]
    fn test_table_processor_snapshots_on_batch_end() {
        let mut def = demo_def();
        def.name = "table1".into();
        def.kind = StreamKind::Table;
        def.options.retain_size = 2;
        let tp = TableProcessor::new(&def, &RuleOptions::default());

        assert!(tp
            .apply(StreamData::Raw(raw(r#"{"color":"a","size":1,"ts":1}"#)))
            .unwrap()
            .is_empty());
        assert!(tp
            .apply(StreamData::Raw(raw(r#"{"color":"b","size":2,"ts":2}"#)))
            .unwrap()
            .is_empty());
        let mut last = raw(r#"{"color":"c","size":3,"ts":3}"#);
        last.batch_end = true;
        let out = tp.apply(StreamData::Raw(last)).unwrap();
        let [StreamData::Window(batch)] = out.as_slice() else {
            panic!("expected one snapshot")
        };
        // retain size capped the snapshot to the freshest rows
        let rows = batch.tuples_for("table1");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("color"), Some(&Value::String("b".into())));
    }
}
