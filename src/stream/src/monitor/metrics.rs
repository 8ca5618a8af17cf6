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

use std::collections::BTreeMap;

use prometheus::{IntCounter, IntGauge, Registry};

use crate::error::StreamResult;

/// Per-instance counters of one operator. Counter names are part of the
/// external contract: `<op>_<instance>_records_in_total` and friends.
#[derive(Clone)]
pub struct OpMetrics {
    pub records_in: IntCounter,
    pub records_out: IntCounter,
    pub exceptions: IntCounter,
    /// Microseconds spent on the latest tuple; sources and sinks have none.
    pub latency: Option<IntGauge>,
}

impl OpMetrics {
    pub fn observe_latency(&self, micros: i64) {
        if let Some(gauge) = &self.latency {
            gauge.set(micros);
        }
    }
}

/// The per-topology metric registry. Every operator instance registers its
/// counters here under its literal external name.
pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Register the counter set of instance `instance` of the operator whose
    /// external prefix is `prefix` (e.g. `op_2_filter`, `source_demo`).
    pub fn register_op(
        &self,
        prefix: &str,
        instance: usize,
        with_latency: bool,
    ) -> StreamResult<OpMetrics> {
        let counter = |suffix: &str| -> StreamResult<IntCounter> {
            let c = IntCounter::new(
                format!("{prefix}_{instance}_{suffix}"),
                format!("{suffix} of {prefix} instance {instance}"),
            )?;
            self.registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let latency = if with_latency {
            let g = IntGauge::new(
                format!("{prefix}_{instance}_process_latency_us"),
                format!("process latency of {prefix} instance {instance}"),
            )?;
            self.registry.register(Box::new(g.clone()))?;
            Some(g)
        } else {
            None
        };
        Ok(OpMetrics {
            records_in: counter("records_in_total")?,
            records_out: counter("records_out_total")?,
            exceptions: counter("exceptions_total")?,
            latency,
        })
    }

    /// Flat view of every registered counter, keyed by its external name.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        let mut out = BTreeMap::new();
        for family in self.registry.gather() {
            for metric in family.get_metric() {
                let value = if metric.has_counter() {
                    metric.get_counter().get_value() as i64
                } else if metric.has_gauge() {
                    metric.get_gauge().get_value() as i64
                } else {
                    continue;
                };
                out.insert(family.get_name().to_owned(), value);
            }
        }
        out
    }

    pub fn value(&self, name: &str) -> Option<i64> {
        self.snapshot().get(name).copied()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_snapshot() {
        let registry = MetricsRegistry::new();
        let m = registry.register_op("op_2_filter", 0, true).unwrap();
        m.records_in.inc_by(5);
        m.records_out.inc_by(2);
        m.observe_latency(17);

        let snap = registry.snapshot();
        assert_eq!(snap["op_2_filter_0_records_in_total"], 5);
        assert_eq!(snap["op_2_filter_0_records_out_total"], 2);
        assert_eq!(snap["op_2_filter_0_exceptions_total"], 0);
        assert_eq!(snap["op_2_filter_0_process_latency_us"], 17);
    }

    #[test]
    fn test_sources_have_no_latency() {
        let registry = MetricsRegistry::new();
        let m = registry.register_op("source_demo", 0, false).unwrap();
        m.records_in.inc();
        assert!(registry.value("source_demo_0_process_latency_us").is_none());
        assert_eq!(registry.value("source_demo_0_records_in_total"), Some(1));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = MetricsRegistry::new();
        registry.register_op("op_1_project", 0, true).unwrap();
        assert!(registry.register_op("op_1_project", 0, true).is_err());
    }
}
