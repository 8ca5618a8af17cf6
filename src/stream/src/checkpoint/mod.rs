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

//! Checkpoint barriers: a coordinator injects numbered barriers into every
//! source; operators align them across inputs, snapshot their kernel state
//! and forward; the rule is checkpointed at barrier B once every sink acked
//! B. Restore picks the latest fully-acked barrier.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use rengine_common::store::KvStore;
use rengine_common::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{StreamError, StreamResult};
use crate::message::{Barrier, StreamMessage};

/// Durable per-rule checkpoint state at `<data>/checkpoints/<rule-id>`.
#[derive(Clone)]
pub struct CheckpointStore {
    store: KvStore,
}

impl CheckpointStore {
    pub fn open(path: impl AsRef<Path>) -> StreamResult<Self> {
        Ok(Self {
            store: KvStore::open(path).map_err(StreamError::Common)?,
        })
    }

    pub fn save_state(&self, barrier: u64, node: &str, state: &Value) -> StreamResult<()> {
        self.store
            .put(&format!("state/{barrier}/{node}"), state)
            .map_err(Into::into)
    }

    pub fn load_state(&self, barrier: u64, node: &str) -> StreamResult<Option<Value>> {
        self.store
            .get(&format!("state/{barrier}/{node}"))
            .map_err(Into::into)
    }

    pub fn save_offset(&self, barrier: u64, source: &str, offset: u64) -> StreamResult<()> {
        self.store
            .put(&format!("offset/{barrier}/{source}"), &offset)
            .map_err(Into::into)
    }

    pub fn load_offset(&self, barrier: u64, source: &str) -> StreamResult<Option<u64>> {
        self.store
            .get(&format!("offset/{barrier}/{source}"))
            .map_err(Into::into)
    }

    /// Mark `barrier` as fully acknowledged by every sink.
    pub fn set_latest(&self, barrier: u64) -> StreamResult<()> {
        self.store.put("latest", &barrier).map_err(Into::into)
    }

    pub fn latest(&self) -> StreamResult<Option<u64>> {
        self.store.get("latest").map_err(Into::into)
    }
}

/// An operator- or sink-level barrier acknowledgement.
#[derive(Debug, Clone)]
pub struct BarrierAck {
    pub barrier: u64,
    pub node: String,
    pub from_sink: bool,
}

/// Per-node barrier alignment. A barrier id is forwarded only once it has
/// arrived from every input; ids arriving out of order on different inputs
/// are tracked independently.
#[derive(Debug, Default)]
pub struct BarrierTracker {
    counts: HashMap<u64, usize>,
}

impl BarrierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one arrival of `id`; returns true when all `total` inputs have
    /// delivered it.
    pub fn arrive(&mut self, id: u64, total: usize) -> bool {
        let count = self.counts.entry(id).or_insert(0);
        *count += 1;
        if *count >= total {
            self.counts.remove(&id);
            true
        } else {
            false
        }
    }
}

/// Drives barrier injection and completion tracking for one topology.
/// Injectors are the sources' event queues, so an injected barrier lines up
/// in-band behind the data each source has already produced.
pub struct Coordinator {
    pub rule_id: String,
    pub interval: Duration,
    pub injectors: Vec<mpsc::Sender<StreamMessage>>,
    pub ack_rx: mpsc::UnboundedReceiver<BarrierAck>,
    pub sink_count: usize,
    pub store: CheckpointStore,
    pub cancel: watch::Receiver<bool>,
}

impl Coordinator {
    pub async fn run(mut self) {
        let mut next_id = match self.store.latest() {
            Ok(latest) => latest.unwrap_or(0),
            Err(e) => {
                warn!(rule = %self.rule_id, error = %e, "failed to read latest checkpoint");
                0
            }
        };
        let mut pending: HashMap<u64, HashSet<String>> = HashMap::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    next_id += 1;
                    debug!(rule = %self.rule_id, barrier = next_id, "injecting barrier");
                    for tx in &self.injectors {
                        let barrier = StreamMessage::Barrier(Barrier { id: next_id });
                        if tx.send(barrier).await.is_err() {
                            // source already shut down
                            return;
                        }
                    }
                    pending.insert(next_id, HashSet::new());
                }
                ack = self.ack_rx.recv() => {
                    let Some(ack) = ack else { return };
                    if !ack.from_sink {
                        debug!(rule = %self.rule_id, barrier = ack.barrier, node = %ack.node,
                               "operator snapshot acknowledged");
                        continue;
                    }
                    let acked = pending.entry(ack.barrier).or_default();
                    acked.insert(ack.node);
                    if acked.len() >= self.sink_count {
                        pending.remove(&ack.barrier);
                        pending.retain(|id, _| *id > ack.barrier);
                        match self.store.set_latest(ack.barrier) {
                            Ok(()) => info!(rule = %self.rule_id, barrier = ack.barrier,
                                            "checkpoint complete"),
                            Err(e) => warn!(rule = %self.rule_id, barrier = ack.barrier,
                                            error = %e, "failed to persist checkpoint"),
                        }
                    }
                }
                _ = self.cancel.changed() => {
                    if *self.cancel.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_aligns_out_of_order_ids() {
        let mut tracker = BarrierTracker::new();
        // two inputs deliver barriers 1 and 2 interleaved
        assert!(!tracker.arrive(1, 2));
        assert!(!tracker.arrive(2, 2));
        assert!(tracker.arrive(2, 2));
        assert!(tracker.arrive(1, 2));
    }

    #[test]
    fn test_tracker_single_input_forwards_immediately() {
        let mut tracker = BarrierTracker::new();
        assert!(tracker.arrive(7, 1));
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path().join("rule1")).unwrap();
        assert_eq!(store.latest().unwrap(), None);

        store.save_state(3, "4_window", &Value::Bigint(42)).unwrap();
        store.save_offset(3, "demo", 17).unwrap();
        store.set_latest(3).unwrap();

        assert_eq!(store.latest().unwrap(), Some(3));
        assert_eq!(
            store.load_state(3, "4_window").unwrap(),
            Some(Value::Bigint(42))
        );
        assert_eq!(store.load_offset(3, "demo").unwrap(), Some(17));
        assert_eq!(store.load_state(2, "4_window").unwrap(), None);
    }
}
