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

use async_channel::{Receiver, Sender};
use rengine_common::tuple::{Tuple, WindowBatch};
use rengine_common::{now_millis, Value};
use rengine_sqlparser::ast::WindowType;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::warn;

use super::{broadcast, StreamContext};
use crate::checkpoint::{BarrierAck, BarrierTracker};
use crate::error::StreamResult;
use crate::message::{StreamData, StreamMessage};
use crate::monitor::OpMetrics;

/// Window shape and firing parameters. `length` and `interval` are ms for
/// time windows and element counts for count windows; for session windows
/// `length` is the inactivity timeout.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub wtype: WindowType,
    pub length: i64,
    pub interval: i64,
    pub is_event_time: bool,
    /// Allowed lateness subtracted from the max observed event timestamp to
    /// form the watermark.
    pub late_tol: i64,
}

/// Checkpointable window state: the accumulating buffer is owned solely by
/// this operator and moved downstream on close.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct WindowState {
    buffer: Vec<Tuple>,
    /// Tuples seen, for count windows.
    seen: u64,
    /// End of the next window to fire, event-time mode.
    next_end: Option<i64>,
    max_ts: i64,
    last_event_ts: Option<i64>,
}

/// The window operator: collects tuples and closes finite slices of the
/// stream on tick, watermark, count or inactivity. Always concurrency 1 —
/// its correctness depends on input order.
pub struct WindowOperatorNode {
    name: String,
    metric_prefix: String,
    config: WindowConfig,
    input_tx: Option<Sender<StreamMessage>>,
    input_rx: Receiver<StreamMessage>,
    input_count: usize,
    outputs: Vec<Sender<StreamMessage>>,
    initial_state: Option<Value>,
}

impl WindowOperatorNode {
    pub fn new(name: impl Into<String>, config: WindowConfig, buffer_length: usize) -> Self {
        let name = name.into();
        let (input_tx, input_rx) = async_channel::bounded(buffer_length.max(1));
        Self {
            metric_prefix: format!("op_{name}"),
            name,
            config,
            input_tx: Some(input_tx),
            input_rx,
            input_count: 0,
            outputs: vec![],
            initial_state: None,
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

    pub fn restore(&mut self, state: Value) {
        self.initial_state = Some(state);
    }

    pub fn open(&mut self, ctx: &StreamContext) -> StreamResult<Vec<JoinHandle<()>>> {
        self.input_tx = None;
        let metrics = ctx.metrics.register_op(&self.metric_prefix, 0, true)?;
        let state = self
            .initial_state
            .take()
            .and_then(|v| serde_json::from_value(v.to_json()).ok())
            .unwrap_or_default();
        let worker = WindowWorker {
            name: self.name.clone(),
            config: self.config.clone(),
            input: self.input_rx.clone(),
            outputs: std::mem::take(&mut self.outputs),
            input_count: self.input_count.max(1),
            metrics,
            ctx: ctx.clone(),
            state,
        };
        Ok(vec![tokio::spawn(worker.run())])
    }
}

struct WindowWorker {
    name: String,
    config: WindowConfig,
    input: Receiver<StreamMessage>,
    outputs: Vec<Sender<StreamMessage>>,
    input_count: usize,
    metrics: OpMetrics,
    ctx: StreamContext,
    state: WindowState,
}

impl WindowWorker {
    async fn run(mut self) {
        let mut cancel = self.ctx.cancel.clone();
        let input = self.input.clone();
        let mut tracker = BarrierTracker::new();
        // wall-clock tick for processing-time tumbling and hopping windows
        let tick_period = match (self.config.wtype, self.config.is_event_time) {
            (WindowType::Tumbling, false) => Some(self.config.length),
            (WindowType::Hopping, false) => Some(self.config.interval),
            _ => None,
        };
        let mut ticker = tick_period.map(|ms| {
            let period = Duration::from_millis(ms.max(1) as u64);
            tokio::time::interval_at(Instant::now() + period, period)
        });
        // inactivity deadline for processing-time session windows
        let mut deadline: Option<Instant> = None;

        loop {
            let mut emissions: Vec<WindowBatch> = vec![];
            // absent timers park forever instead of guarding the branches
            let tick_fut = async {
                match ticker.as_mut() {
                    Some(t) => {
                        t.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            let session_fut = async move {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return;
                    }
                }
                _ = tick_fut => {
                    self.on_tick(now_millis(), &mut emissions);
                }
                _ = session_fut => {
                    deadline = None;
                    self.close_session(&mut emissions);
                }
                msg = input.recv() => {
                    let Ok(msg) = msg else { return };
                    match msg {
                        StreamMessage::Data(StreamData::Tuple(t)) => {
                            self.metrics.records_in.inc();
                            self.on_tuple(t, &mut emissions);
                            if self.config.wtype == WindowType::Session && !self.config.is_event_time {
                                deadline = Some(
                                    Instant::now()
                                        + Duration::from_millis(self.config.length.max(1) as u64),
                                );
                            }
                        }
                        StreamMessage::Data(StreamData::Error(e)) => {
                            self.metrics.records_in.inc();
                            self.metrics.exceptions.inc();
                            if !broadcast(&self.outputs, StreamMessage::Data(StreamData::Error(e)))
                                .await
                            {
                                return;
                            }
                        }
                        StreamMessage::Data(other) => {
                            self.metrics.records_in.inc();
                            if !broadcast(&self.outputs, StreamMessage::Data(other)).await {
                                return;
                            }
                        }
                        StreamMessage::Barrier(barrier) => {
                            if tracker.arrive(barrier.id, self.input_count) {
                                self.snapshot(barrier.id);
                                if !broadcast(&self.outputs, StreamMessage::Barrier(barrier)).await {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
            for batch in emissions {
                if batch.is_empty() {
                    // empty closes emit nothing
                    continue;
                }
                if !broadcast(&self.outputs, StreamMessage::Data(StreamData::Window(batch))).await {
                    return;
                }
                self.metrics.records_out.inc();
            }
        }
    }

    fn on_tuple(&mut self, t: Tuple, emissions: &mut Vec<WindowBatch>) {
        match self.config.wtype {
            WindowType::Count => {
                self.state.buffer.push(t);
                self.state.seen += 1;
                let interval = self.config.interval.max(1) as u64;
                if self.state.seen % interval == 0 {
                    let length = self.config.length.max(1) as usize;
                    let start = self.state.buffer.len().saturating_sub(length);
                    emissions.push(to_batch(self.state.buffer[start..].to_vec()));
                    // only the newest `length` tuples can ever fire again
                    self.state.buffer.drain(..start);
                }
            }
            WindowType::Sliding => {
                let now = if self.config.is_event_time {
                    t.timestamp
                } else {
                    now_millis()
                };
                self.state.buffer.push(t);
                let lower = now - self.config.length;
                self.state.buffer.retain(|b| b.timestamp >= lower);
                emissions.push(to_batch(self.state.buffer.clone()));
            }
            WindowType::Session => {
                if self.config.is_event_time {
                    if let Some(last) = self.state.last_event_ts {
                        if t.timestamp.saturating_sub(last) > self.config.length {
                            self.close_session(emissions);
                        }
                    }
                    self.state.last_event_ts = Some(t.timestamp);
                }
                self.state.buffer.push(t);
            }
            WindowType::Tumbling | WindowType::Hopping => {
                if self.config.is_event_time {
                    self.on_event_time_tuple(t, emissions);
                } else {
                    self.state.buffer.push(t);
                }
            }
        }
    }

    fn on_event_time_tuple(&mut self, t: Tuple, emissions: &mut Vec<WindowBatch>) {
        let length = self.config.length;
        let slide = match self.config.wtype {
            WindowType::Hopping => self.config.interval,
            _ => length,
        };
        let ts = t.timestamp;
        let next_end = *self.state.next_end.get_or_insert_with(|| {
            slide * ((ts - length).div_euclid(slide) + 1) + length
        });
        if ts < next_end - length {
            // older than the current window's lower bound
            self.metrics.exceptions.inc();
            return;
        }
        self.state.buffer.push(t);
        self.state.max_ts = self.state.max_ts.max(ts);
        let watermark = self.state.max_ts - self.config.late_tol;
        let mut end = next_end;
        while watermark >= end {
            let lower = end - length;
            let contents: Vec<Tuple> = self
                .state
                .buffer
                .iter()
                .filter(|b| b.timestamp >= lower && b.timestamp < end)
                .cloned()
                .collect();
            emissions.push(to_batch(contents));
            end += slide;
            let next_lower = end - length;
            self.state.buffer.retain(|b| b.timestamp >= next_lower);
        }
        self.state.next_end = Some(end);
    }

    fn on_tick(&mut self, now: i64, emissions: &mut Vec<WindowBatch>) {
        match self.config.wtype {
            WindowType::Tumbling => {
                if !self.state.buffer.is_empty() {
                    emissions.push(to_batch(std::mem::take(&mut self.state.buffer)));
                }
            }
            WindowType::Hopping => {
                let lower = now - self.config.length;
                let contents: Vec<Tuple> = self
                    .state
                    .buffer
                    .iter()
                    .filter(|b| b.timestamp > lower)
                    .cloned()
                    .collect();
                self.state.buffer.retain(|b| b.timestamp > lower);
                if !contents.is_empty() {
                    emissions.push(to_batch(contents));
                }
            }
            _ => {}
        }
    }

    fn close_session(&mut self, emissions: &mut Vec<WindowBatch>) {
        if !self.state.buffer.is_empty() {
            emissions.push(to_batch(std::mem::take(&mut self.state.buffer)));
        }
        self.state.last_event_ts = None;
    }

    fn snapshot(&self, barrier: u64) {
        let Some(store) = &self.ctx.checkpoint else {
            return;
        };
        match serde_json::to_value(&self.state) {
            Ok(v) => {
                if let Err(e) = store.save_state(barrier, &self.name, &Value::from_json(v)) {
                    warn!(op = %self.name, error = %e, "failed to snapshot window state");
                    return;
                }
                let _ = self.ctx.acks.send(BarrierAck {
                    barrier,
                    node: self.name.clone(),
                    from_sink: false,
                });
            }
            Err(e) => warn!(op = %self.name, error = %e, "window state not serializable"),
        }
    }
}

fn to_batch(tuples: Vec<Tuple>) -> WindowBatch {
    let mut batch = WindowBatch::new();
    for t in tuples {
        batch.push(t);
    }
    batch
}

#[cfg(test)]
mod tests {
    use rengine_common::Map;

    use super::*;

    fn tuple(ts: i64) -> Tuple {
        let mut m = Map::new();
        m.insert("ts".into(), Value::Bigint(ts));
        Tuple::new("demo", m, Map::new(), ts)
    }

    fn worker(config: WindowConfig) -> WindowWorker {
        // the channel peers are dropped on purpose: these tests drive the
        // state machine directly and never run the select loop
        let (_tx, rx) = async_channel::bounded(4);
        let (_cancel_tx, cancel) = tokio::sync::watch::channel(false);
        let (drain, _drain_rx) = tokio::sync::mpsc::channel(4);
        let (acks, _ack_rx) = tokio::sync::mpsc::unbounded_channel();
        let metrics = crate::monitor::MetricsRegistry::new();
        let ctx = StreamContext {
            rule_id: "test".into(),
            options: std::sync::Arc::new(Default::default()),
            metrics: std::sync::Arc::new(metrics),
            checkpoint: None,
            cancel,
            drain,
            acks,
        };
        let metrics = ctx.metrics.register_op("op_1_window", 0, true).unwrap();
        WindowWorker {
            name: "1_window".into(),
            config,
            input: rx,
            outputs: vec![],
            input_count: 1,
            metrics,
            ctx,
            state: WindowState::default(),
        }
    }

    fn config(wtype: WindowType, length: i64, interval: i64, event: bool) -> WindowConfig {
        WindowConfig {
            wtype,
            length,
            interval,
            is_event_time: event,
            late_tol: 0,
        }
    }

    #[test]
    fn test_count_window_fires_every_interval() {
        let mut w = worker(config(WindowType::Count, 3, 2, false));
        let mut emissions = vec![];
        for ts in 1..=6 {
            w.on_tuple(tuple(ts), &mut emissions);
        }
        // fires at tuples 2, 4 and 6, each emitting the last 3 (capped by
        // what has arrived)
        assert_eq!(emissions.len(), 3);
        assert_eq!(emissions[0].len(), 2);
        assert_eq!(emissions[1].len(), 3);
        assert_eq!(emissions[2].len(), 3);
        let last: Vec<i64> = emissions[2].iter_tuples().map(|t| t.timestamp).collect();
        assert_eq!(last, vec![4, 5, 6]);
    }

    #[test]
    fn test_sliding_window_fires_per_tuple() {
        let mut w = worker(config(WindowType::Sliding, 10, 0, true));
        let mut emissions = vec![];
        w.on_tuple(tuple(100), &mut emissions);
        w.on_tuple(tuple(105), &mut emissions);
        w.on_tuple(tuple(120), &mut emissions);
        assert_eq!(emissions.len(), 3);
        assert_eq!(emissions[0].len(), 1);
        assert_eq!(emissions[1].len(), 2);
        // 100 and 105 fell out of [110, 120]
        assert_eq!(emissions[2].len(), 1);
    }

    #[test]
    fn test_event_time_tumbling_watermark() {
        let mut w = worker(config(WindowType::Tumbling, 1000, 1000, true));
        let mut emissions = vec![];
        w.on_tuple(tuple(100), &mut emissions);
        w.on_tuple(tuple(900), &mut emissions);
        assert!(emissions.is_empty());
        // crossing into the next window closes [0, 1000)
        w.on_tuple(tuple(1200), &mut emissions);
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].len(), 2);
        // late tuple for the closed window is dropped and counted
        w.on_tuple(tuple(800), &mut emissions);
        assert_eq!(emissions.len(), 1);
        assert_eq!(w.metrics.exceptions.get(), 1);
    }

    #[test]
    fn test_event_time_tumbling_with_lateness() {
        let mut w = worker(WindowConfig {
            late_tol: 500,
            ..config(WindowType::Tumbling, 1000, 1000, true)
        });
        let mut emissions = vec![];
        w.on_tuple(tuple(100), &mut emissions);
        w.on_tuple(tuple(1200), &mut emissions);
        // watermark is 700, window [0, 1000) still open
        assert!(emissions.is_empty());
        w.on_tuple(tuple(1600), &mut emissions);
        // watermark 1100 closes [0, 1000); 1200 and 1600 stay buffered
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].len(), 1);
    }

    #[test]
    fn test_all_late_window_emits_nothing() {
        let mut w = worker(config(WindowType::Tumbling, 1000, 1000, true));
        let mut emissions = vec![];
        w.on_tuple(tuple(2500), &mut emissions);
        for ts in [100, 200, 300] {
            w.on_tuple(tuple(ts), &mut emissions);
        }
        assert!(emissions.is_empty());
        assert_eq!(w.metrics.exceptions.get(), 3);
    }

    #[test]
    fn test_event_time_session_gap() {
        let mut w = worker(config(WindowType::Session, 1000, 0, true));
        let mut emissions = vec![];
        w.on_tuple(tuple(100), &mut emissions);
        w.on_tuple(tuple(600), &mut emissions);
        assert!(emissions.is_empty());
        // gap larger than the timeout closes the session
        w.on_tuple(tuple(3000), &mut emissions);
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].len(), 2);
        w.on_tuple(tuple(3100), &mut emissions);
        assert_eq!(emissions.len(), 1);
    }

    #[test]
    fn test_processing_time_tumbling_tick() {
        let mut w = worker(config(WindowType::Tumbling, 1000, 1000, false));
        let mut emissions = vec![];
        w.on_tuple(tuple(1), &mut emissions);
        w.on_tuple(tuple(2), &mut emissions);
        assert!(emissions.is_empty());
        w.on_tick(now_millis(), &mut emissions);
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].len(), 2);
        // an empty tick closes nothing
        w.on_tick(now_millis(), &mut emissions);
        assert_eq!(emissions.len(), 1);
    }

    #[test]
    fn test_state_snapshot_roundtrip() {
        let mut w = worker(config(WindowType::Tumbling, 1000, 1000, false));
        let mut emissions = vec![];
        w.on_tuple(tuple(1), &mut emissions);
        let json = serde_json::to_value(&w.state).unwrap();
        let restored: WindowState = serde_json::from_value(json).unwrap();
        assert_eq!(restored.buffer.len(), 1);
    }
}
