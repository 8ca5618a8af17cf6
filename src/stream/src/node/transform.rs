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

use std::sync::Arc;
use std::time::Instant;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rengine_common::Value;
use tokio::task::JoinHandle;

use super::{broadcast, StreamContext};
use crate::checkpoint::{BarrierAck, BarrierTracker};
use crate::error::StreamResult;
use crate::message::{StreamData, StreamMessage};
use crate::monitor::OpMetrics;
use crate::operator::Operation;

/// The generic transform node: wraps a kernel with input channel, N workers
/// (load-balanced pull off the shared mpmc channel), output fan-out, metric
/// counters, error routing and checkpoint-barrier alignment.
///
/// With concurrency > 1 the workers emit independently, so output order
/// across workers is not preserved — a barrier dequeued by one worker can
/// overtake data still being evaluated by another, which would desync the
/// barrier from the tuples ahead of it. The physical builder therefore
/// forces concurrency 1 for every operator of a checkpointing rule (and for
/// order-sensitive operators always); this node does not re-check it.
pub struct UnaryOperatorNode {
    name: String,
    metric_prefix: String,
    op: Arc<dyn Operation>,
    concurrency: usize,
    input_tx: Option<Sender<StreamMessage>>,
    input_rx: Receiver<StreamMessage>,
    input_count: usize,
    outputs: Vec<Sender<StreamMessage>>,
}

impl UnaryOperatorNode {
    pub fn new(
        name: impl Into<String>,
        op: Box<dyn Operation>,
        concurrency: usize,
        buffer_length: usize,
    ) -> Self {
        let name = name.into();
        let (input_tx, input_rx) = async_channel::bounded(buffer_length.max(1));
        Self {
            metric_prefix: format!("op_{name}"),
            name,
            op: Arc::from(op),
            concurrency: concurrency.max(1),
            input_tx: Some(input_tx),
            input_rx,
            input_count: 0,
            outputs: vec![],
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

    pub fn add_output(&mut self, tx: Sender<StreamMessage>) {
        self.outputs.push(tx);
    }

    pub fn restore(&self, state: Value) {
        self.op.restore(state);
    }

    pub fn open(&mut self, ctx: &StreamContext) -> StreamResult<Vec<JoinHandle<()>>> {
        // drop our producer handle so the channel closes once upstream does
        self.input_tx = None;
        let outputs = Arc::new(std::mem::take(&mut self.outputs));
        let tracker = Arc::new(Mutex::new(BarrierTracker::new()));
        let input_count = self.input_count.max(1);
        let mut handles = vec![];
        for instance in 0..self.concurrency {
            let metrics = ctx.metrics.register_op(&self.metric_prefix, instance, true)?;
            let worker = Worker {
                name: self.name.clone(),
                op: self.op.clone(),
                input: self.input_rx.clone(),
                outputs: outputs.clone(),
                tracker: tracker.clone(),
                input_count,
                metrics,
                ctx: ctx.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        Ok(handles)
    }
}

struct Worker {
    name: String,
    op: Arc<dyn Operation>,
    input: Receiver<StreamMessage>,
    outputs: Arc<Vec<Sender<StreamMessage>>>,
    tracker: Arc<Mutex<BarrierTracker>>,
    input_count: usize,
    metrics: OpMetrics,
    ctx: StreamContext,
}

impl Worker {
    async fn run(self) {
        let mut cancel = self.ctx.cancel.clone();
        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    // a dropped cancel sender means the topology is gone
                    if changed.is_err() || *cancel.borrow() {
                        return;
                    }
                }
                msg = self.input.recv() => {
                    let Ok(msg) = msg else { return };
                    match msg {
                        StreamMessage::Data(data) => {
                            if !self.handle_data(data).await {
                                return;
                            }
                        }
                        StreamMessage::Barrier(barrier) => {
                            let aligned = self.tracker.lock().arrive(barrier.id, self.input_count);
                            if aligned {
                                self.snapshot(barrier.id);
                                if !broadcast(&self.outputs, StreamMessage::Barrier(barrier)).await {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Returns false when every downstream is gone.
    async fn handle_data(&self, data: StreamData) -> bool {
        self.metrics.records_in.inc();
        if let StreamData::Error(e) = data {
            // error-tagged tuples pass through untouched
            self.metrics.exceptions.inc();
            return broadcast(&self.outputs, StreamMessage::Data(StreamData::Error(e))).await;
        }
        let start = Instant::now();
        match self.op.apply(data) {
            Ok(outs) => {
                self.metrics
                    .observe_latency(start.elapsed().as_micros() as i64);
                for out in outs {
                    if !broadcast(&self.outputs, StreamMessage::Data(out)).await {
                        return false;
                    }
                    self.metrics.records_out.inc();
                }
                true
            }
            Err(err) => {
                self.metrics
                    .observe_latency(start.elapsed().as_micros() as i64);
                self.metrics.exceptions.inc();
                tracing::debug!(rule = %self.ctx.rule_id, op = %self.name, error = %err,
                                "evaluation error");
                if self.ctx.options.send_error {
                    broadcast(
                        &self.outputs,
                        StreamMessage::Data(StreamData::Error(err.to_string())),
                    )
                    .await
                } else {
                    true
                }
            }
        }
    }

    fn snapshot(&self, barrier: u64) {
        let Some(store) = &self.ctx.checkpoint else {
            return;
        };
        if let Some(state) = self.op.snapshot() {
            if let Err(e) = store.save_state(barrier, &self.name, &state) {
                tracing::warn!(rule = %self.ctx.rule_id, op = %self.name, error = %e,
                               "failed to snapshot operator state");
                return;
            }
        }
        let _ = self.ctx.acks.send(BarrierAck {
            barrier,
            node: self.name.clone(),
            from_sink: false,
        });
    }
}
