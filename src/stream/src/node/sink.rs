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

use std::time::Duration;

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use bytes::Bytes;
use rengine_common::tuple::SinkRow;
use rengine_common::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::StreamContext;
use crate::checkpoint::{BarrierAck, BarrierTracker};
use crate::error::{StreamError, StreamResult};
use crate::message::{StreamData, StreamMessage};
use crate::template::Template;

/// A terminal connector. Delivery retries beyond [`SinkConf::retry_count`]
/// are persistent failure and tear the rule down. Under ExactlyOnce rules the
/// implementation must be idempotent keyed by (rule id, barrier, output
/// index).
#[async_trait]
pub trait Sink: Send + 'static {
    async fn open(&mut self) -> StreamResult<()> {
        Ok(())
    }

    async fn collect(&mut self, payload: Bytes) -> StreamResult<()>;

    async fn close(&mut self) -> StreamResult<()> {
        Ok(())
    }
}

/// Sink behavior shared by every connector, parsed from the action
/// configuration mapping.
#[derive(Debug, Clone)]
pub struct SinkConf {
    /// One invocation per tuple instead of one per batch.
    pub send_single: bool,
    pub data_template: Option<String>,
    pub retry_count: usize,
    pub retry_interval: Duration,
}

impl Default for SinkConf {
    fn default() -> Self {
        Self {
            send_single: false,
            data_template: None,
            retry_count: 3,
            retry_interval: Duration::from_millis(100),
        }
    }
}

impl SinkConf {
    pub fn from_props(props: &serde_json::Value) -> Self {
        let mut conf = Self::default();
        if let Some(b) = props.get("sendSingle").and_then(|v| v.as_bool()) {
            conf.send_single = b;
        }
        if let Some(t) = props.get("dataTemplate").and_then(|v| v.as_str()) {
            conf.data_template = Some(t.to_owned());
        }
        if let Some(n) = props.get("retryCount").and_then(|v| v.as_u64()) {
            conf.retry_count = n as usize;
        }
        if let Some(ms) = props.get("retryInterval").and_then(|v| v.as_u64()) {
            conf.retry_interval = Duration::from_millis(ms);
        }
        conf
    }
}

/// The topology-side wrapper of a sink: converts incoming payloads to record
/// batches, renders the data template, delivers with bounded retries and
/// acknowledges checkpoint barriers.
pub struct SinkNode {
    name: String,
    metric_prefix: String,
    instance: usize,
    sink: Option<Box<dyn Sink>>,
    conf: SinkConf,
    input_tx: Option<Sender<StreamMessage>>,
    input_rx: Receiver<StreamMessage>,
    input_count: usize,
}

impl SinkNode {
    pub fn new(
        name: impl Into<String>,
        instance: usize,
        sink: Box<dyn Sink>,
        conf: SinkConf,
        buffer_length: usize,
    ) -> Self {
        let name = name.into();
        let (input_tx, input_rx) = async_channel::bounded(buffer_length.max(1));
        Self {
            metric_prefix: format!("sink_{name}"),
            name,
            instance,
            sink: Some(sink),
            conf,
            input_tx: Some(input_tx),
            input_rx,
            input_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> Sender<StreamMessage> {
        self.input_tx
            .as_ref()
            .expect("node already opened")
            .clone()
    }

    pub fn inc_inputs(&mut self) {
        self.input_count += 1;
    }

    pub fn open(&mut self, ctx: &StreamContext) -> StreamResult<Vec<JoinHandle<()>>> {
        self.input_tx = None;
        let metrics = ctx
            .metrics
            .register_op(&self.metric_prefix, self.instance, false)?;
        let template = match &self.conf.data_template {
            Some(src) => Some(
                Template::compile(src)
                    .map_err(|e| StreamError::Config(format!("bad dataTemplate: {e}")))?,
            ),
            None => None,
        };
        let mut sink = self.sink.take().ok_or_else(|| {
            StreamError::Config(format!("sink {} already opened", self.name))
        })?;
        let worker = SinkWorker {
            name: self.name.clone(),
            conf: self.conf.clone(),
            template,
            input: self.input_rx.clone(),
            input_count: self.input_count.max(1),
            metrics,
            ctx: ctx.clone(),
        };
        let handle = tokio::spawn(async move {
            if let Err(e) = sink.open().await {
                let _ = worker
                    .ctx
                    .drain
                    .send(StreamError::Sink {
                        name: worker.name.clone(),
                        cause: e.to_string(),
                    })
                    .await;
                return;
            }
            info!(sink = %worker.name, "sink open");
            worker.run(&mut sink).await;
            if let Err(e) = sink.close().await {
                warn!(sink = %worker.name, error = %e, "sink close failed");
            }
        });
        Ok(vec![handle])
    }
}

struct SinkWorker {
    name: String,
    conf: SinkConf,
    template: Option<Template>,
    input: Receiver<StreamMessage>,
    input_count: usize,
    metrics: crate::monitor::OpMetrics,
    ctx: StreamContext,
}

impl SinkWorker {
    async fn run(&self, sink: &mut Box<dyn Sink>) {
        let mut cancel = self.ctx.cancel.clone();
        let mut tracker = BarrierTracker::new();
        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return;
                    }
                }
                msg = self.input.recv() => {
                    let Ok(msg) = msg else { return };
                    match msg {
                        StreamMessage::Data(data) => {
                            self.metrics.records_in.inc();
                            let rows = rows_for_sink(data);
                            if rows.is_empty() {
                                continue;
                            }
                            let payloads = match self.render(&rows) {
                                Ok(p) => p,
                                Err(e) => {
                                    self.metrics.exceptions.inc();
                                    debug!(sink = %self.name, error = %e, "template error");
                                    continue;
                                }
                            };
                            for payload in payloads {
                                if !self.deliver(sink, payload).await {
                                    return;
                                }
                            }
                        }
                        StreamMessage::Barrier(barrier) => {
                            if tracker.arrive(barrier.id, self.input_count) {
                                let _ = self.ctx.acks.send(BarrierAck {
                                    barrier: barrier.id,
                                    node: self.name.clone(),
                                    from_sink: true,
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    fn render(&self, rows: &[SinkRow]) -> Result<Vec<Bytes>, String> {
        if self.conf.send_single {
            rows.iter()
                .map(|row| self.render_one(&row.to_value()))
                .collect()
        } else {
            let list = Value::Array(rows.iter().map(SinkRow::to_value).collect());
            Ok(vec![self.render_one(&list)?])
        }
    }

    fn render_one(&self, value: &Value) -> Result<Bytes, String> {
        let text = match &self.template {
            Some(t) => t.render(value)?,
            None => serde_json::to_string(&value.to_json()).map_err(|e| e.to_string())?,
        };
        Ok(Bytes::from(text))
    }

    /// Returns false on persistent failure, after draining a fatal error.
    async fn deliver(&self, sink: &mut Box<dyn Sink>, payload: Bytes) -> bool {
        let mut attempt = 0;
        loop {
            match sink.collect(payload.clone()).await {
                Ok(()) => {
                    self.metrics.records_out.inc();
                    return true;
                }
                Err(e) if attempt < self.conf.retry_count => {
                    attempt += 1;
                    warn!(sink = %self.name, error = %e, attempt, "sink delivery retry");
                    tokio::time::sleep(self.conf.retry_interval).await;
                }
                Err(e) => {
                    self.metrics.exceptions.inc();
                    let _ = self
                        .ctx
                        .drain
                        .send(StreamError::Sink {
                            name: self.name.clone(),
                            cause: e.to_string(),
                        })
                        .await;
                    return false;
                }
            }
        }
    }
}

/// Normalize any payload shape to sink records.
fn rows_for_sink(data: StreamData) -> Vec<SinkRow> {
    match data {
        StreamData::Batch(rows) => rows,
        StreamData::Tuple(t) => vec![SinkRow {
            fields: t.message,
            metadata: None,
        }],
        StreamData::Error(e) => {
            let mut fields = Map::new();
            fields.insert("error".to_owned(), Value::String(e));
            vec![SinkRow {
                fields,
                metadata: None,
            }]
        }
        StreamData::Window(b) => b
            .iter_tuples()
            .map(|t| SinkRow {
                fields: t.message.clone(),
                metadata: None,
            })
            .collect(),
        StreamData::Join(b) => b
            .rows
            .into_iter()
            .map(|j| SinkRow {
                fields: j.merged(),
                metadata: None,
            })
            .collect(),
        StreamData::Groups(g) => g
            .groups
            .into_iter()
            .flatten()
            .map(|row| SinkRow {
                fields: row.fields(),
                metadata: None,
            })
            .collect(),
        StreamData::Raw(_) => vec![],
    }
}

/// The built-in `log` sink: prints every payload through the tracing stack.
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    async fn collect(&mut self, payload: Bytes) -> StreamResult<()> {
        info!(payload = %String::from_utf8_lossy(&payload), "sink result");
        Ok(())
    }
}
