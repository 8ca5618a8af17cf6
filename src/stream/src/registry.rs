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
use std::sync::Arc;

use parking_lot::RwLock;
use rengine_common::catalog::StreamDefinition;

use crate::error::{StreamError, StreamResult};
use crate::node::sink::{LogSink, Sink};
use crate::node::source::Source;

pub type SourceFactory =
    Arc<dyn Fn(&StreamDefinition) -> StreamResult<Box<dyn Source>> + Send + Sync>;
pub type SinkFactory =
    Arc<dyn Fn(&serde_json::Value) -> StreamResult<Box<dyn Sink>> + Send + Sync>;

/// The process-wide connector registry: source/sink type name → factory.
/// Mutated only at startup (built-ins, persisted plugin metadata) and on
/// plugin register/unregister; reads vastly outnumber writes, hence the
/// read-write lock. Constructed once and passed explicitly into the planner.
pub struct ConnectorRegistry {
    sources: RwLock<HashMap<String, SourceFactory>>,
    sinks: RwLock<HashMap<String, SinkFactory>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        let registry = Self {
            sources: RwLock::new(HashMap::new()),
            sinks: RwLock::new(HashMap::new()),
        };
        registry.register_sink("log", Arc::new(|_| Ok(Box::new(LogSink))));
        registry
    }

    pub fn register_source(&self, type_name: impl Into<String>, factory: SourceFactory) {
        self.sources.write().insert(type_name.into(), factory);
    }

    pub fn register_sink(&self, type_name: impl Into<String>, factory: SinkFactory) {
        self.sinks.write().insert(type_name.into(), factory);
    }

    pub fn unregister_source(&self, type_name: &str) -> bool {
        self.sources.write().remove(type_name).is_some()
    }

    pub fn unregister_sink(&self, type_name: &str) -> bool {
        self.sinks.write().remove(type_name).is_some()
    }

    pub fn create_source(&self, def: &StreamDefinition) -> StreamResult<Box<dyn Source>> {
        let type_name = def.options.source_type.as_deref().unwrap_or("mqtt");
        let factory = self.sources.read().get(type_name).cloned();
        match factory {
            Some(f) => f(def),
            None => Err(StreamError::Config(format!(
                "source type {type_name} is not registered"
            ))),
        }
    }

    pub fn create_sink(
        &self,
        type_name: &str,
        props: &serde_json::Value,
    ) -> StreamResult<Box<dyn Sink>> {
        let factory = self.sinks.read().get(type_name).cloned();
        match factory {
            Some(f) => f(props),
            None => Err(StreamError::Config(format!(
                "sink type {type_name} is not registered"
            ))),
        }
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_log_sink_registered() {
        let registry = ConnectorRegistry::new();
        assert!(registry
            .create_sink("log", &serde_json::Value::Null)
            .is_ok());
        assert!(registry
            .create_sink("nope", &serde_json::Value::Null)
            .is_err());
    }

    #[test]
    fn test_unregister() {
        let registry = ConnectorRegistry::new();
        assert!(registry.unregister_sink("log"));
        assert!(!registry.unregister_sink("log"));
        assert!(registry
            .create_sink("log", &serde_json::Value::Null)
            .is_err());
    }
}
