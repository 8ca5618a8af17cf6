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

//! In-memory source and sink used by planner and rule tests, mirroring the
//! predefined-node path of the planner (`plan_with_sources_and_sinks`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rengine_common::tuple::RawTuple;
use rengine_common::{now_millis, Map, Value};
use tokio::sync::Notify;

use crate::error::StreamResult;
use crate::node::sink::Sink;
use crate::node::source::{Source, SourceContext};

/// Replays a fixed list of JSON documents, one raw tuple per document, then
/// returns. With `table` set the last element carries the end-of-snapshot
/// marker so the table processor can close its batch.
pub struct MockSource {
    data: Vec<serde_json::Value>,
    interval: Duration,
    table: bool,
}

impl MockSource {
    pub fn new(data: Vec<serde_json::Value>) -> Self {
        Self {
            data,
            interval: Duration::from_millis(5),
            table: false,
        }
    }

    pub fn table(data: Vec<serde_json::Value>) -> Self {
        Self {
            data,
            interval: Duration::ZERO,
            table: true,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl Source for MockSource {
    async fn open(&mut self, ctx: SourceContext) -> StreamResult<()> {
        let skip = ctx.resume_offset.unwrap_or(0) as usize;
        let last = self.data.len().saturating_sub(1);
        for (i, doc) in self.data.iter().enumerate().skip(skip) {
            if *ctx.cancel.borrow() {
                return Ok(());
            }
            if !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
            let mut metadata = Map::new();
            metadata.insert("topic".to_owned(), Value::String("mock".to_owned()));
            let raw = RawTuple {
                payload: Bytes::from(doc.to_string()),
                metadata,
                timestamp: now_millis(),
                offset: i as u64,
                batch_end: self.table && i == last,
            };
            if ctx.collector.collect(raw).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Collects every delivered payload and wakes waiters on each arrival.
#[derive(Clone, Default)]
pub struct MockSinkState {
    results: Arc<Mutex<Vec<Bytes>>>,
    notify: Arc<Notify>,
}

impl MockSinkState {
    pub fn results(&self) -> Vec<String> {
        self.results
            .lock()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `n` payloads arrived or the timeout elapses.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.len() >= n {
                return true;
            }
            let remaining = deadline - tokio::time::Instant::now();
            if remaining.is_zero() {
                return false;
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }
}

pub struct MockSink {
    state: MockSinkState,
}

impl MockSink {
    pub fn new() -> (Self, MockSinkState) {
        let state = MockSinkState::default();
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

#[async_trait]
impl Sink for MockSink {
    async fn collect(&mut self, payload: Bytes) -> StreamResult<()> {
        self.state.results.lock().push(payload);
        self.state.notify.notify_waiters();
        Ok(())
    }
}

/// Fails a fixed number of collects before succeeding, for retry tests.
pub struct FlakySink {
    failures_left: usize,
    inner: MockSink,
}

impl FlakySink {
    pub fn new(failures: usize) -> (Self, MockSinkState) {
        let (inner, state) = MockSink::new();
        (
            Self {
                failures_left: failures,
                inner,
            },
            state,
        )
    }
}

#[async_trait]
impl Sink for FlakySink {
    async fn collect(&mut self, payload: Bytes) -> StreamResult<()> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(crate::error::StreamError::Sink {
                name: "flaky".into(),
                cause: "transient delivery failure".into(),
            });
        }
        self.inner.collect(payload).await
    }
}
