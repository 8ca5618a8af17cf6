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
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rengine_common::rule::RuleOptions;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointStore, Coordinator};
use crate::error::{StreamError, StreamResult};
use crate::monitor::MetricsRegistry;
use crate::node::sink::SinkNode;
use crate::node::source::SourceNode;
use crate::node::{OperatorNode, StreamContext};

/// How long a cancelled topology waits for its workers before abandoning
/// them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The wiring of a topology in external names, for inspection and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrintableTopo {
    pub sources: Vec<String>,
    pub edges: BTreeMap<String, Vec<String>>,
}

/// A rule's running dataflow: sources feeding operators feeding sinks over
/// bounded channels, plus the checkpoint coordinator and metric registry.
/// The topology exclusively owns its nodes for its lifetime.
pub struct Topology {
    id: String,
    options: Arc<RuleOptions>,
    sources: Vec<SourceNode>,
    operators: Vec<OperatorNode>,
    sinks: Vec<SinkNode>,
    metrics: Arc<MetricsRegistry>,
    topo: PrintableTopo,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    drain_tx: mpsc::Sender<StreamError>,
    drain_rx: Option<mpsc::Receiver<StreamError>>,
    checkpoint_dir: Option<PathBuf>,
    handles: Vec<JoinHandle<()>>,
    opened: bool,
}

impl Topology {
    pub fn new(id: impl Into<String>, options: RuleOptions) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (drain_tx, drain_rx) = mpsc::channel(16);
        Self {
            id: id.into(),
            options: Arc::new(options),
            sources: vec![],
            operators: vec![],
            sinks: vec![],
            metrics: Arc::new(MetricsRegistry::new()),
            topo: PrintableTopo::default(),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            drain_tx,
            drain_rx: Some(drain_rx),
            checkpoint_dir: None,
            handles: vec![],
            opened: false,
        }
    }

    /// Enable durable checkpoints at `<dir>` (normally
    /// `<data>/checkpoints/<rule-id>`). Without it, Qos ≥ AtLeastOnce rules
    /// fail to open.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> Arc<RuleOptions> {
        self.options.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    pub fn printable(&self) -> &PrintableTopo {
        &self.topo
    }

    pub fn add_source(&mut self, node: SourceNode) {
        self.topo.sources.push(format!("source_{}", node.name()));
        self.sources.push(node);
    }

    pub fn add_operator(&mut self, inputs: &[&str], mut node: OperatorNode) -> StreamResult<()> {
        let tx = node.input();
        let label = format!("op_{}", node.name());
        for from in inputs {
            self.connect(from, tx.clone(), &label)?;
            node.inc_inputs();
        }
        self.operators.push(node);
        Ok(())
    }

    pub fn add_sink(&mut self, inputs: &[&str], mut node: SinkNode) -> StreamResult<()> {
        let tx = node.input();
        let label = format!("sink_{}", node.name());
        for from in inputs {
            self.connect(from, tx.clone(), &label)?;
            node.inc_inputs();
        }
        self.sinks.push(node);
        Ok(())
    }

    fn connect(
        &mut self,
        from: &str,
        tx: async_channel::Sender<crate::message::StreamMessage>,
        to_label: &str,
    ) -> StreamResult<()> {
        if let Some(src) = self.sources.iter_mut().find(|s| s.name() == from) {
            src.add_output(tx);
            self.topo
                .edges
                .entry(format!("source_{from}"))
                .or_default()
                .push(to_label.to_owned());
            return Ok(());
        }
        if let Some(op) = self.operators.iter_mut().find(|o| o.name() == from) {
            op.add_output(tx);
            self.topo
                .edges
                .entry(format!("op_{from}"))
                .or_default()
                .push(to_label.to_owned());
            return Ok(());
        }
        Err(StreamError::Config(format!(
            "unknown emitter {from} while wiring {to_label}"
        )))
    }

    fn checkpointing_on(&self) -> bool {
        self.options.checkpoint_enabled()
    }

    /// Open every node and start the dataflow. Restores the latest
    /// fully-acknowledged checkpoint first when checkpointing is on.
    pub async fn open(&mut self) -> StreamResult<()> {
        if self.opened {
            return Err(StreamError::Config(format!(
                "topology {} already opened",
                self.id
            )));
        }
        self.opened = true;

        let checkpoint = if self.checkpointing_on() {
            let dir = self.checkpoint_dir.clone().ok_or_else(|| {
                StreamError::Config(format!(
                    "rule {} requires a checkpoint directory for qos {:?}",
                    self.id, self.options.qos
                ))
            })?;
            Some(CheckpointStore::open(dir)?)
        } else {
            None
        };

        // restore the latest complete barrier before anything runs
        if let Some(store) = &checkpoint {
            if let Some(latest) = store.latest()? {
                info!(rule = %self.id, barrier = latest, "restoring from checkpoint");
                for op in &mut self.operators {
                    if let Some(state) = store.load_state(latest, op.name())? {
                        op.restore(state);
                    }
                }
                for src in &mut self.sources {
                    if let Some(offset) = store.load_offset(latest, src.name())? {
                        src.set_resume_offset(offset);
                    }
                }
            }
        }

        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let ctx = StreamContext {
            rule_id: self.id.clone(),
            options: self.options.clone(),
            metrics: self.metrics.clone(),
            checkpoint: checkpoint.clone(),
            cancel: self.cancel_rx.clone(),
            drain: self.drain_tx.clone(),
            acks: ack_tx,
        };

        // sinks first so nothing is dropped when sources start pushing
        for sink in &mut self.sinks {
            self.handles.extend(sink.open(&ctx)?);
        }
        for op in &mut self.operators {
            self.handles.extend(op.open(&ctx)?);
        }
        for src in &mut self.sources {
            self.handles.extend(src.open(&ctx)?);
        }

        if let Some(store) = checkpoint {
            let coordinator = Coordinator {
                rule_id: self.id.clone(),
                interval: Duration::from_millis(self.options.checkpoint_interval),
                injectors: self.sources.iter().map(SourceNode::injector).collect(),
                ack_rx,
                sink_count: self.sinks.len(),
                store,
                cancel: self.cancel_rx.clone(),
            };
            self.handles.push(tokio::spawn(coordinator.run()));
        }

        // a fatal error from any node cancels the whole rule, leaving every
        // other rule untouched
        let mut drain_rx = self.drain_rx.take().ok_or_else(|| {
            StreamError::Config(format!("topology {} drain already taken", self.id))
        })?;
        let cancel_tx = self.cancel_tx.clone();
        let mut cancel_rx = self.cancel_rx.clone();
        let rule_id = self.id.clone();
        self.handles.push(tokio::spawn(async move {
            tokio::select! {
                err = drain_rx.recv() => {
                    if let Some(err) = err {
                        error!(rule = %rule_id, error = %err, "rule failed, shutting down");
                        let _ = cancel_tx.send(true);
                    }
                }
                _ = cancel_rx.changed() => {}
            }
        }));

        info!(rule = %self.id, "topology open");
        Ok(())
    }

    /// Cooperative shutdown: broadcast cancel, give workers the grace period,
    /// abandon and log stragglers.
    pub async fn cancel(&mut self) {
        let _ = self.cancel_tx.send(true);
        let joined = futures::future::join_all(self.handles.drain(..));
        if tokio::time::timeout(SHUTDOWN_GRACE, joined).await.is_err() {
            warn!(rule = %self.id, "workers exceeded the shutdown grace period, abandoning");
        }
        info!(rule = %self.id, "topology stopped");
    }
}

#[cfg(test)]
mod tests {
    use rengine_common::catalog::{
        FieldType, StreamDefinition, StreamField, StreamKind, StreamOptions,
    };
    use rengine_common::rule::Qos;
    use rengine_sqlparser::parse_select;
    use serde_json::json;

    use super::*;
    use crate::mock::{MockSink, MockSource};
    use crate::node::sink::SinkConf;
    use crate::node::transform::UnaryOperatorNode;
    use crate::operator::{FilterOp, Preprocessor, ProjectOp};

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
            options: StreamOptions::default(),
        }
    }

    fn demo_data() -> Vec<serde_json::Value> {
        vec![
            json!({"color": "red", "size": 3, "ts": 1541152486013u64}),
            json!({"color": "blue", "size": 6, "ts": 1541152486822u64}),
            json!({"color": "blue", "size": 2, "ts": 1541152487632u64}),
            json!({"color": "yellow", "size": 4, "ts": 1541152488442u64}),
            json!({"color": "red", "size": 1, "ts": 1541152489252u64}),
        ]
    }

    /// Hand-built `SELECT color, ts FROM demo WHERE size > 3` pipeline.
    #[tokio::test]
    async fn test_filter_pipeline_end_to_end() {
        let stmt = parse_select("SELECT color, ts FROM demo WHERE size > 3").unwrap();
        let options = RuleOptions::default();
        let buffer = options.buffer_length;
        let mut tp = Topology::new("rule_test", options.clone());

        tp.add_source(SourceNode::new(
            "demo",
            Box::new(MockSource::new(demo_data())),
            buffer,
        ));
        tp.add_operator(
            &["demo"],
            OperatorNode::Unary(UnaryOperatorNode::new(
                "1_preprocessor_demo",
                Box::new(Preprocessor::new(&demo_def(), &options)),
                1,
                buffer,
            )),
        )
        .unwrap();
        tp.add_operator(
            &["1_preprocessor_demo"],
            OperatorNode::Unary(UnaryOperatorNode::new(
                "2_filter",
                Box::new(FilterOp {
                    condition: stmt.condition.clone().unwrap(),
                }),
                1,
                buffer,
            )),
        )
        .unwrap();
        tp.add_operator(
            &["2_filter"],
            OperatorNode::Unary(UnaryOperatorNode::new(
                "3_project",
                Box::new(ProjectOp {
                    fields: stmt.fields.clone(),
                    is_aggregate: false,
                    send_meta: false,
                    limit: None,
                }),
                1,
                buffer,
            )),
        )
        .unwrap();
        let (sink, results) = MockSink::new();
        tp.add_sink(
            &["3_project"],
            SinkNode::new("mockSink", 0, Box::new(sink), SinkConf::default(), buffer),
        )
        .unwrap();

        tp.open().await.unwrap();
        assert!(results.wait_for(2, Duration::from_secs(5)).await);
        // let the remaining inputs drain through before reading counters
        tokio::time::sleep(Duration::from_millis(200)).await;
        tp.cancel().await;

        assert_eq!(
            results.results(),
            vec![
                r#"[{"color":"blue","ts":1541152486822}]"#,
                r#"[{"color":"yellow","ts":1541152488442}]"#,
            ]
        );

        let m = tp.metrics().snapshot();
        assert_eq!(m["source_demo_0_records_in_total"], 5);
        assert_eq!(m["source_demo_0_records_out_total"], 5);
        assert_eq!(m["op_1_preprocessor_demo_0_records_in_total"], 5);
        assert_eq!(m["op_1_preprocessor_demo_0_records_out_total"], 5);
        assert_eq!(m["op_2_filter_0_records_in_total"], 5);
        assert_eq!(m["op_2_filter_0_records_out_total"], 2);
        assert_eq!(m["op_3_project_0_records_in_total"], 2);
        assert_eq!(m["op_3_project_0_records_out_total"], 2);
        assert_eq!(m["sink_mockSink_0_records_in_total"], 2);
        assert_eq!(m["sink_mockSink_0_records_out_total"], 2);

        // counts are conserved across every channel at quiescence
        assert_eq!(
            m["source_demo_0_records_out_total"],
            m["op_1_preprocessor_demo_0_records_in_total"]
        );
        assert_eq!(
            m["op_2_filter_0_records_out_total"],
            m["op_3_project_0_records_in_total"]
        );
    }

    #[tokio::test]
    async fn test_unknown_emitter_rejected() {
        let mut tp = Topology::new("rule_bad", RuleOptions::default());
        let node = OperatorNode::Unary(UnaryOperatorNode::new(
            "1_filter",
            Box::new(FilterOp {
                condition: parse_select("SELECT * FROM t WHERE a > 1")
                    .unwrap()
                    .condition
                    .unwrap(),
            }),
            1,
            16,
        ));
        let err = tp.add_operator(&["nope"], node).unwrap_err();
        assert!(err.to_string().contains("unknown emitter nope"));
    }

    #[tokio::test]
    async fn test_qos_without_checkpoint_dir_rejected() {
        let options = RuleOptions {
            qos: Qos::AtLeastOnce,
            checkpoint_interval: 100,
            ..Default::default()
        };
        let mut tp = Topology::new("rule_cp", options);
        let err = tp.open().await.unwrap_err();
        assert!(err.to_string().contains("checkpoint directory"));
    }
}
