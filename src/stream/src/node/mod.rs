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

//! Topology nodes: sources, the generic transform node, the window node and
//! sinks. Nodes communicate exclusively over bounded channels; a full
//! channel blocks the producer and the backpressure propagates to the source.

pub mod sink;
pub mod source;
pub mod transform;
pub mod window;

use std::sync::Arc;

use async_channel::Sender;
use rengine_common::rule::RuleOptions;
use tokio::sync::{mpsc, watch};

use crate::checkpoint::{BarrierAck, CheckpointStore};
use crate::error::StreamError;
use crate::message::StreamMessage;
use crate::monitor::MetricsRegistry;

/// Shared handles every node worker runs with.
#[derive(Clone)]
pub struct StreamContext {
    pub rule_id: String,
    pub options: Arc<RuleOptions>,
    pub metrics: Arc<MetricsRegistry>,
    /// Present when checkpointing is on for this rule.
    pub checkpoint: Option<CheckpointStore>,
    pub cancel: watch::Receiver<bool>,
    /// Fatal errors drain here; the topology tears the rule down on receipt.
    pub drain: mpsc::Sender<StreamError>,
    pub acks: mpsc::UnboundedSender<BarrierAck>,
}

/// Deliver a message to every subscriber, cloning for all but the last.
/// Returns false once every downstream has gone away.
pub(crate) async fn broadcast(outputs: &[Sender<StreamMessage>], msg: StreamMessage) -> bool {
    match outputs {
        [] => false,
        [single] => single.send(msg).await.is_ok(),
        many => {
            let mut delivered = false;
            for tx in many {
                if tx.send(msg.clone()).await.is_ok() {
                    delivered = true;
                }
            }
            delivered
        }
    }
}

/// A physical operator: either the generic transform around a kernel or the
/// timer-driven window node.
pub enum OperatorNode {
    Unary(transform::UnaryOperatorNode),
    Window(window::WindowOperatorNode),
}

impl OperatorNode {
    pub fn name(&self) -> &str {
        match self {
            OperatorNode::Unary(n) => n.name(),
            OperatorNode::Window(n) => n.name(),
        }
    }

    pub fn input(&self) -> Sender<StreamMessage> {
        match self {
            OperatorNode::Unary(n) => n.input(),
            OperatorNode::Window(n) => n.input(),
        }
    }

    pub fn inc_inputs(&mut self) {
        match self {
            OperatorNode::Unary(n) => n.inc_inputs(),
            OperatorNode::Window(n) => n.inc_inputs(),
        }
    }

    pub fn add_output(&mut self, tx: Sender<StreamMessage>) {
        match self {
            OperatorNode::Unary(n) => n.add_output(tx),
            OperatorNode::Window(n) => n.add_output(tx),
        }
    }

    pub fn restore(&mut self, state: rengine_common::Value) {
        match self {
            OperatorNode::Unary(n) => n.restore(state),
            OperatorNode::Window(n) => n.restore(state),
        }
    }

    pub fn open(
        &mut self,
        ctx: &StreamContext,
    ) -> crate::error::StreamResult<Vec<tokio::task::JoinHandle<()>>> {
        match self {
            OperatorNode::Unary(n) => n.open(ctx),
            OperatorNode::Window(n) => n.open(ctx),
        }
    }
}
