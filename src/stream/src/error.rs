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

use thiserror::Error;

pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Runtime errors of a topology. Per-tuple evaluation failures never show up
/// here; they are counted on the operator and optionally forwarded as
/// error-tagged tuples. Anything of this type reaching the drain channel
/// tears the rule down.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("source {name} failed: {cause}")]
    Source { name: String, cause: String },

    #[error("sink {name} failed: {cause}")]
    Sink { name: String, cause: String },

    #[error("channel closed for {0}")]
    ChannelClosed(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Common(#[from] rengine_common::error::CommonError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
