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

use async_channel::Sender;
use async_trait::async_trait;
use rengine_common::tuple::RawTuple;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{broadcast, StreamContext};
use crate::error::{StreamError, StreamResult};
use crate::message::{StreamData, StreamMessage};

/// Pushes raw tuples into the source node's event queue. Checkpoint barriers
/// are injected into the same queue, so a barrier can never overtake a tuple
/// the source has already produced — the queue order is the in-band order.
#[derive(Clone)]
pub struct Collector {
    tx: mpsc::Sender<StreamMessage>,
}

impl Collector {
    /// Blocks under backpressure and sources are expected to respect the
    /// blocking send. Sources that cannot block must drop oldest and account
    /// for the drops themselves. Errors once the node is gone.
    pub async fn collect(&self, raw: RawTuple) -> StreamResult<()> {
        self.tx
            .send(StreamMessage::Data(StreamData::Raw(raw)))
            .await
            .map_err(|_| StreamError::ChannelClosed("source collector".into()))
    }
}

/// Handles a source implementation runs with.
pub struct SourceContext {
    pub name: String,
    pub collector: Collector,
    pub cancel: watch::Receiver<bool>,
    /// Offset to resume from after a checkpoint restore.
    pub resume_offset: Option<u64>,
}

/// A connector producing raw payloads from the outside world. `open` runs
/// the read loop until cancellation or exhaustion; transport retries are the
/// source's own policy, and a returned error is persistent failure.
#[async_trait]
pub trait Source: Send + 'static {
    async fn open(&mut self, ctx: SourceContext) -> StreamResult<()>;
}

/// The topology-side wrapper of a source: runs the connector and forwards
/// its event queue downstream. Data and barriers share that queue, which
/// keeps barriers in-band and makes the offset recorded per barrier agree
/// with exactly the tuples forwarded ahead of it.
pub struct SourceNode {
    name: String,
    metric_prefix: String,
    source: Option<Box<dyn Source>>,
    outputs: Vec<Sender<StreamMessage>>,
    event_tx: mpsc::Sender<StreamMessage>,
    event_rx: Option<mpsc::Receiver<StreamMessage>>,
    resume_offset: Option<u64>,
}

impl SourceNode {
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn Source>,
        buffer_length: usize,
    ) -> Self {
        let name = name.into();
        let (event_tx, event_rx) = mpsc::channel(buffer_length.max(1));
        Self {
            metric_prefix: format!("source_{name}"),
            name,
            source: Some(source),
            outputs: vec![],
            event_tx,
            event_rx: Some(event_rx),
            resume_offset: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The coordinator injects barriers through this handle. They queue
    /// behind whatever the source has already collected.
    pub fn injector(&self) -> mpsc::Sender<StreamMessage> {
        self.event_tx.clone()
    }

    pub fn add_output(&mut self, tx: Sender<StreamMessage>) {
        self.outputs.push(tx);
    }

    pub fn set_resume_offset(&mut self, offset: u64) {
        self.resume_offset = Some(offset);
    }

    pub fn open(&mut self, ctx: &StreamContext) -> StreamResult<Vec<JoinHandle<()>>> {
        let metrics = ctx.metrics.register_op(&self.metric_prefix, 0, false)?;
        let mut source = self.source.take().ok_or_else(|| {
            StreamError::Config(format!("source {} already opened", self.name))
        })?;
        let source_ctx = SourceContext {
            name: self.name.clone(),
            collector: Collector {
                tx: self.event_tx.clone(),
            },
            cancel: ctx.cancel.clone(),
            resume_offset: self.resume_offset,
        };
        let drain = ctx.drain.clone();
        let name = self.name.clone();
        let reader = tokio::spawn(async move {
            info!(source = %name, "source open");
            if let Err(e) = source.open(source_ctx).await {
                error!(source = %name, error = %e, "source failed");
                let _ = drain
                    .send(StreamError::Source {
                        name,
                        cause: e.to_string(),
                    })
                    .await;
            }
        });

        let outputs = std::mem::take(&mut self.outputs);
        let mut event_rx = self.event_rx.take().ok_or_else(|| {
            StreamError::Config(format!("source {} already opened", self.name))
        })?;
        let checkpoint = ctx.checkpoint.clone();
        let name = self.name.clone();
        let mut cancel = ctx.cancel.clone();
        let forwarder = tokio::spawn(async move {
            // the next offset to read, so restore replays nothing acked
            let mut next_offset = 0u64;
            loop {
                tokio::select! {
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            return;
                        }
                    }
                    event = event_rx.recv() => {
                        let Some(event) = event else { return };
                        match event {
                            StreamMessage::Data(StreamData::Raw(raw)) => {
                                metrics.records_in.inc();
                                next_offset = raw.offset + 1;
                                if !broadcast(&outputs, StreamMessage::Data(StreamData::Raw(raw)))
                                    .await
                                {
                                    return;
                                }
                                metrics.records_out.inc();
                            }
                            StreamMessage::Barrier(barrier) => {
                                if let Some(store) = &checkpoint {
                                    if let Err(e) =
                                        store.save_offset(barrier.id, &name, next_offset)
                                    {
                                        warn!(source = %name, error = %e,
                                              "failed to record source offset");
                                    }
                                }
                                if !broadcast(&outputs, StreamMessage::Barrier(barrier)).await {
                                    return;
                                }
                            }
                            other => {
                                metrics.records_in.inc();
                                if !broadcast(&outputs, other).await {
                                    return;
                                }
                                metrics.records_out.inc();
                            }
                        }
                    }
                }
            }
        });
        Ok(vec![reader, forwarder])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::checkpoint::CheckpointStore;
    use crate::message::Barrier;
    use crate::mock::MockSource;
    use crate::monitor::MetricsRegistry;

    #[tokio::test]
    async fn test_barriers_stay_behind_collected_tuples() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path().join("rule_src")).unwrap();
        let (_cancel_tx, cancel) = tokio::sync::watch::channel(false);
        let (drain, _drain_rx) = tokio::sync::mpsc::channel(4);
        let (acks, _ack_rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = StreamContext {
            rule_id: "rule_src".into(),
            options: Arc::new(Default::default()),
            metrics: Arc::new(MetricsRegistry::new()),
            checkpoint: Some(store.clone()),
            cancel,
            drain,
            acks,
        };

        let data = (0..5).map(|i| json!({ "n": i })).collect();
        let source = MockSource::new(data).with_interval(Duration::from_millis(2));
        let mut node = SourceNode::new("demo", Box::new(source), 16);
        let (out_tx, out_rx) = async_channel::bounded(16);
        node.add_output(out_tx);
        let injector = node.injector();
        let _handles = node.open(&ctx).unwrap();

        // inject barriers while the source is still producing
        let inject = tokio::spawn(async move {
            for id in 1..=3u64 {
                tokio::time::sleep(Duration::from_millis(3)).await;
                let _ = injector.send(StreamMessage::Barrier(Barrier { id })).await;
            }
        });

        let mut raws_seen = 0u64;
        let mut barriers_seen = 0;
        while barriers_seen < 3 || raws_seen < 5 {
            match tokio::time::timeout(Duration::from_secs(5), out_rx.recv()).await {
                Ok(Ok(StreamMessage::Data(StreamData::Raw(_)))) => raws_seen += 1,
                Ok(Ok(StreamMessage::Barrier(b))) => {
                    barriers_seen += 1;
                    // the offset recorded for a barrier covers exactly the
                    // tuples forwarded ahead of it
                    assert_eq!(store.load_offset(b.id, "demo").unwrap(), Some(raws_seen));
                }
                Ok(Ok(_)) => {}
                _ => panic!("source output stalled"),
            }
        }
        inject.await.unwrap();
    }
}
