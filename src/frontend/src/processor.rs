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

//! Stream-DDL and rule lifecycle processors, the embedding surface behind
//! the (out-of-scope) management API.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rengine_common::catalog::{
    FieldType, StreamDefinition, StreamField, StreamKind, StreamOptions,
};
use rengine_common::rule::Rule;
use rengine_common::store::KvStore;
use rengine_sqlparser::ast::{CreateStreamStmt, Statement, TypeName};
use rengine_stream::registry::ConnectorRegistry;
use rengine_stream::Topology;
use tokio::sync::Mutex;
use tracing::info;

use crate::{planner, PlanError, PlanResult};

/// Executes stream DDL against the catalog KV at `<data>/stream`.
pub struct StreamProcessor {
    catalog: KvStore,
}

impl StreamProcessor {
    pub fn new(data_dir: impl AsRef<Path>) -> PlanResult<Self> {
        Ok(Self {
            catalog: KvStore::open(data_dir.as_ref().join("stream"))?,
        })
    }

    pub fn from_store(catalog: KvStore) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &KvStore {
        &self.catalog
    }

    /// Execute one DDL statement, returning the confirmation message.
    pub fn exec(&self, ddl: &str) -> PlanResult<String> {
        match rengine_sqlparser::parse(ddl)? {
            Statement::CreateStream(stmt) => {
                let kind = if stmt.is_table { "Table" } else { "Stream" };
                let def = definition_from_stmt(stmt)?;
                if self.catalog.contains(&def.name)? {
                    return Err(PlanError::Validation(format!(
                        "{kind} {} already exists",
                        def.name
                    )));
                }
                self.catalog.put(&def.name, &def)?;
                info!(stream = %def.name, "stream created");
                Ok(format!("{kind} {} is created", def.name))
            }
            Statement::DropStream { name, is_table } => {
                let kind = if is_table { "Table" } else { "Stream" };
                if !self.catalog.delete(&name)? {
                    return Err(PlanError::StreamNotFound(name));
                }
                info!(stream = %name, "stream dropped");
                Ok(format!("{kind} {name} is dropped"))
            }
            Statement::ShowStreams { tables } => {
                let names = self.list(tables)?;
                Ok(names.join("\n"))
            }
            Statement::DescribeStream { name } => {
                let def = self.describe(&name)?;
                Ok(serde_json::to_string_pretty(&def).map_err(rengine_common::error::CommonError::from)?)
            }
            Statement::Select(_) => Err(PlanError::Validation(
                "expected a DDL statement, found a query".into(),
            )),
        }
    }

    pub fn list(&self, tables: bool) -> PlanResult<Vec<String>> {
        let mut out = vec![];
        for key in self.catalog.keys()? {
            if let Some(def) = self.catalog.get::<StreamDefinition>(&key)? {
                if def.is_table() == tables {
                    out.push(def.name);
                }
            }
        }
        Ok(out)
    }

    pub fn describe(&self, name: &str) -> PlanResult<StreamDefinition> {
        self.catalog
            .get(name)?
            .ok_or_else(|| PlanError::StreamNotFound(name.to_owned()))
    }
}

fn definition_from_stmt(stmt: CreateStreamStmt) -> PlanResult<StreamDefinition> {
    let mut options = StreamOptions::default();
    for (key, value) in &stmt.options {
        match key.as_str() {
            "datasource" => options.datasource = Some(value.clone()),
            "type" => options.source_type = Some(value.clone()),
            "format" => {
                options.format = serde_json::from_value(serde_json::Value::String(
                    value.to_ascii_lowercase(),
                ))
                .map_err(|_| {
                    PlanError::Validation(format!("unknown format {value}"))
                })?
            }
            "key" => options.key = Some(value.clone()),
            "timestamp" => options.timestamp = Some(value.clone()),
            "timestamp_format" => options.timestamp_format = Some(value.clone()),
            "shared" => options.shared = value.eq_ignore_ascii_case("true"),
            "retain_size" => {
                options.retain_size = value.parse().map_err(|_| {
                    PlanError::Validation(format!("bad retain_size {value}"))
                })?
            }
            other => {
                return Err(PlanError::Validation(format!(
                    "unknown stream option {other}"
                )))
            }
        }
    }
    Ok(StreamDefinition {
        name: stmt.name,
        kind: if stmt.is_table {
            StreamKind::Table
        } else {
            StreamKind::Stream
        },
        fields: stmt
            .columns
            .into_iter()
            .map(|c| StreamField {
                name: c.name,
                ftype: field_type(c.data_type),
            })
            .collect(),
        options,
    })
}

fn field_type(t: TypeName) -> FieldType {
    match t {
        TypeName::Bigint => FieldType::Bigint,
        TypeName::Float => FieldType::Float,
        TypeName::String => FieldType::String,
        TypeName::Boolean => FieldType::Boolean,
        TypeName::Datetime => FieldType::Datetime,
        TypeName::Bytea => FieldType::Bytea,
        TypeName::Array => FieldType::Array,
        TypeName::Struct => FieldType::Struct,
    }
}

/// Owns the running rules of the process. The registry maps rule id to its
/// running topology and is used only for lookup and shutdown; the topology
/// itself owns every node.
pub struct RuleProcessor {
    catalog: KvStore,
    registry: Arc<ConnectorRegistry>,
    data_dir: PathBuf,
    rules: Mutex<HashMap<String, Topology>>,
}

impl RuleProcessor {
    pub fn new(data_dir: impl Into<PathBuf>, registry: Arc<ConnectorRegistry>) -> PlanResult<Self> {
        let data_dir = data_dir.into();
        Ok(Self {
            catalog: KvStore::open(data_dir.join("stream"))?,
            registry,
            data_dir,
            rules: Mutex::new(HashMap::new()),
        })
    }

    pub fn catalog(&self) -> &KvStore {
        &self.catalog
    }

    /// Parse a rule out of its JSON representation.
    pub fn create_rule(&self, json: &str) -> PlanResult<Rule> {
        let rule: Rule =
            serde_json::from_str(json).map_err(rengine_common::error::CommonError::from)?;
        if rule.id.is_empty() {
            return Err(PlanError::Validation("rule id must not be empty".into()));
        }
        if rule.actions.is_empty() {
            return Err(PlanError::Validation(format!(
                "rule {} has no actions",
                rule.id
            )));
        }
        Ok(rule)
    }

    /// Plan and start a rule. Fails if a rule with the same id is running.
    pub async fn start_rule(&self, rule: &Rule) -> PlanResult<()> {
        let mut rules = self.rules.lock().await;
        if rules.contains_key(&rule.id) {
            return Err(PlanError::Validation(format!(
                "rule {} is already running",
                rule.id
            )));
        }
        let mut topology = planner::plan(rule, &self.catalog, &self.registry, &self.data_dir)?;
        topology.open().await?;
        rules.insert(rule.id.clone(), topology);
        Ok(())
    }

    /// Cancel and forget a rule; false when it was not running.
    pub async fn stop_rule(&self, id: &str) -> bool {
        let topology = self.rules.lock().await.remove(id);
        match topology {
            Some(mut t) => {
                t.cancel().await;
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.rules.lock().await.contains_key(id)
    }

    pub async fn rule_metrics(&self, id: &str) -> Option<BTreeMap<String, i64>> {
        self.rules
            .lock()
            .await
            .get(id)
            .map(|t| t.metrics().snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> (tempfile::TempDir, StreamProcessor) {
        let dir = tempfile::tempdir().unwrap();
        let p = StreamProcessor::new(dir.path()).unwrap();
        (dir, p)
    }

    #[test]
    fn test_create_show_describe_drop() {
        let (_dir, p) = processor();
        let msg = p
            .exec("CREATE STREAM demo (color string, size bigint, ts bigint) WITH (DATASOURCE=\"demo\", FORMAT=\"json\", KEY=\"ts\")")
            .unwrap();
        assert_eq!(msg, "Stream demo is created");

        let msg = p
            .exec("CREATE TABLE table1 (id bigint, name string) WITH (DATASOURCE=\"lookup.json\", RETAIN_SIZE=\"3\")")
            .unwrap();
        assert_eq!(msg, "Table table1 is created");

        assert_eq!(p.list(false).unwrap(), vec!["demo".to_owned()]);
        assert_eq!(p.list(true).unwrap(), vec!["table1".to_owned()]);

        let def = p.describe("table1").unwrap();
        assert!(def.is_table());
        assert_eq!(def.options.retain_size, 3);
        assert_eq!(def.options.datasource.as_deref(), Some("lookup.json"));

        // definitions are immutable: re-create fails, drop then create works
        assert!(p
            .exec("CREATE STREAM demo (color string) WITH (DATASOURCE=\"demo\")")
            .is_err());
        assert_eq!(p.exec("DROP STREAM demo").unwrap(), "Stream demo is dropped");
        assert!(p.exec("DROP STREAM demo").is_err());
    }

    #[test]
    fn test_bad_options_rejected() {
        let (_dir, p) = processor();
        assert!(p
            .exec("CREATE STREAM demo (color string) WITH (NOPE=\"x\")")
            .is_err());
        assert!(p
            .exec("CREATE STREAM demo (color string) WITH (FORMAT=\"xml\")")
            .is_err());
    }

    #[test]
    fn test_rule_json_validation() {
        let dir = tempfile::tempdir().unwrap();
        let p = RuleProcessor::new(dir.path(), Arc::new(ConnectorRegistry::new())).unwrap();
        assert!(p
            .create_rule(r#"{"id":"", "sql":"SELECT * FROM demo", "actions":[{"log":{}}]}"#)
            .is_err());
        assert!(p
            .create_rule(r#"{"id":"r1", "sql":"SELECT * FROM demo", "actions":[]}"#)
            .is_err());
        let rule = p
            .create_rule(
                r#"{"id":"r1", "sql":"SELECT * FROM demo", "actions":[{"log":{}}],
                    "options":{"qos":1,"checkpointInterval":300}}"#,
            )
            .unwrap();
        assert_eq!(rule.id, "r1");
        assert_eq!(rule.options.checkpoint_interval, 300);
    }
}
