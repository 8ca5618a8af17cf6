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
use serde::{Deserialize, Serialize};

/// Delivery guarantee of a rule, ordered by strength.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(format!("invalid qos {other}, expect 0, 1 or 2")),
        }
    }
}

impl From<Qos> for u8 {
    fn from(q: Qos) -> u8 {
        q as u8
    }
}

/// Options shared by every operator of a rule's topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleOptions {
    /// Use the declared timestamp field as the time source.
    pub is_event_time: bool,
    /// Allowed lateness in ms when event time is on.
    pub late_tol: i64,
    /// Workers per operator. Order-sensitive operators ignore this.
    pub concurrency: usize,
    /// Capacity of every inter-operator channel.
    pub buffer_length: usize,
    /// Retain the metadata mapping in sink payloads. Rejected at plan time
    /// when the SQL has multiple sources or a window.
    pub send_meta_to_sink: bool,
    pub qos: Qos,
    /// Barrier injection period in ms; 0 disables checkpointing.
    pub checkpoint_interval: u64,
    /// Emit an error-tagged tuple for evaluation failures instead of
    /// silently dropping.
    pub send_error: bool,
}

impl RuleOptions {
    /// Barriers run when the rule wants a delivery guarantee and a positive
    /// barrier interval.
    pub fn checkpoint_enabled(&self) -> bool {
        self.qos > Qos::AtMostOnce && self.checkpoint_interval > 0
    }
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            is_event_time: false,
            late_tol: 0,
            concurrency: 1,
            buffer_length: 1024,
            send_meta_to_sink: false,
            qos: Qos::AtMostOnce,
            checkpoint_interval: 0,
            send_error: true,
        }
    }
}

/// One sink invocation: sink name mapped to its configuration.
pub type SinkAction = IndexMap<String, serde_json::Value>;

/// A rule binds SQL to sink actions. Immutable while running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub sql: String,
    #[serde(default)]
    pub actions: Vec<SinkAction>,
    #[serde(default)]
    pub options: RuleOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_options_defaults_and_aliases() {
        let rule: Rule = serde_json::from_str(
            r#"{
                "id": "rule1",
                "sql": "SELECT * FROM demo",
                "actions": [{"log": {}}],
                "options": {"qos": 1, "checkpointInterval": 300, "sendError": false}
            }"#,
        )
        .unwrap();
        assert_eq!(rule.options.qos, Qos::AtLeastOnce);
        assert_eq!(rule.options.checkpoint_interval, 300);
        assert!(!rule.options.send_error);
        assert_eq!(rule.options.concurrency, 1);
        assert_eq!(rule.options.buffer_length, 1024);
        assert!(!rule.options.is_event_time);
    }

    #[test]
    fn test_checkpoint_enabled_needs_qos_and_interval() {
        let mut options = RuleOptions::default();
        assert!(!options.checkpoint_enabled());
        options.checkpoint_interval = 300;
        assert!(!options.checkpoint_enabled());
        options.qos = Qos::AtLeastOnce;
        assert!(options.checkpoint_enabled());
        options.checkpoint_interval = 0;
        assert!(!options.checkpoint_enabled());
    }

    #[test]
    fn test_bad_qos_rejected() {
        let err = serde_json::from_str::<RuleOptions>(r#"{"qos": 3}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid qos 3"), "{err}");
    }
}
