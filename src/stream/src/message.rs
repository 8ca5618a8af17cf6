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

use rengine_common::tuple::{GroupBatch, JoinBatch, RawTuple, SinkRow, Tuple, WindowBatch};

/// Data payloads travelling between operators. The shape narrows as a tuple
/// moves down the topology: sources emit `Raw`, preprocessors `Tuple`,
/// windows `Window`, joins `Join`, aggregates `Groups` and project `Batch`.
///
/// `Error` is an error-tagged tuple: it passes through every operator
/// untouched (counted as an exception, not a record) and reaches the sink as
/// a `{"error": …}` record. It only exists when the rule has `sendError` set.
#[derive(Debug, Clone)]
pub enum StreamData {
    Raw(RawTuple),
    Tuple(Tuple),
    Window(WindowBatch),
    Join(JoinBatch),
    Groups(GroupBatch),
    Batch(Vec<SinkRow>),
    Error(String),
}

/// A numbered checkpoint barrier, travelling in-band with data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub id: u64,
}

#[derive(Debug, Clone)]
pub enum StreamMessage {
    Data(StreamData),
    Barrier(Barrier),
}
