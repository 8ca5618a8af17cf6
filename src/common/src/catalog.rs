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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declared column types for stream schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Bigint,
    Float,
    String,
    Boolean,
    Datetime,
    Bytea,
    Array,
    Struct,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Bigint => "bigint",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Datetime => "datetime",
            FieldType::Bytea => "bytea",
            FieldType::Array => "array",
            FieldType::Struct => "struct",
        };
        f.write_str(s)
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bigint" => Ok(FieldType::Bigint),
            "float" => Ok(FieldType::Float),
            "string" => Ok(FieldType::String),
            "boolean" => Ok(FieldType::Boolean),
            "datetime" => Ok(FieldType::Datetime),
            "bytea" => Ok(FieldType::Bytea),
            "array" => Ok(FieldType::Array),
            "struct" => Ok(FieldType::Struct),
            other => Err(format!("unknown field type {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamField {
    pub name: String,
    pub ftype: FieldType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Unbounded; every event flows through windows individually.
    Stream,
    /// Bounded and re-queryable; materialized as a snapshot for joins.
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Binary,
}

impl Default for Format {
    fn default() -> Self {
        Format::Json
    }
}

/// WITH options of a stream definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    #[serde(default)]
    pub datasource: Option<String>,
    /// Connector type resolved through the registry; defaults to mqtt.
    #[serde(default, rename = "type")]
    pub source_type: Option<String>,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default)]
    pub shared: bool,
    /// Row cap for table snapshots; 0 keeps everything.
    #[serde(default)]
    pub retain_size: usize,
}

/// A persisted stream or table definition. Immutable once created;
/// alterations require drop + create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub name: String,
    pub kind: StreamKind,
    /// Empty means schemaless: the preprocessor passes fields through
    /// untouched and type errors surface at evaluation time.
    pub fields: Vec<StreamField>,
    pub options: StreamOptions,
}

impl StreamDefinition {
    pub fn is_table(&self) -> bool {
        self.kind == StreamKind::Table
    }

    pub fn field(&self, name: &str) -> Option<&StreamField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_roundtrip() {
        let def = StreamDefinition {
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
            ],
            options: StreamOptions {
                datasource: Some("demo".into()),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&def).unwrap();
        let back: StreamDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
        assert!(!back.is_table());
        assert_eq!(back.field("size").unwrap().ftype, FieldType::Bigint);
    }
}
