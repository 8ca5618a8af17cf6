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

//! Operator kernels. Each kernel is a pure transformation from one input
//! payload to zero or more outputs; the generic transform node owns channels,
//! workers, metrics, error routing and barrier handling around it.

mod aggregate;
mod filter;
mod having;
mod join;
mod join_align;
mod order;
mod preprocessor;
mod project;

pub use aggregate::AggregateOp;
pub use filter::FilterOp;
pub use having::HavingOp;
pub use join::JoinOp;
pub use join_align::JoinAlignOp;
pub use order::OrderOp;
pub use preprocessor::{Preprocessor, TableProcessor};
pub use project::ProjectOp;

use rengine_common::tuple::DataRow;
use rengine_common::Value;
use thiserror::Error;

use crate::message::StreamData;

/// A per-tuple evaluation failure. Counted in `exceptions_total`; forwarded
/// as an error-tagged tuple when the rule has `sendError` set, silently
/// dropped otherwise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct OperationError(pub String);

pub type OpResult = std::result::Result<Vec<StreamData>, OperationError>;

/// A transform kernel. `apply` must never panic on data; state (if any) sits
/// behind interior mutability so order-insensitive kernels can run with
/// concurrency > 1.
pub trait Operation: Send + Sync + 'static {
    fn apply(&self, data: StreamData) -> OpResult;

    /// Kernel state for checkpoint barriers; `None` for stateless kernels.
    fn snapshot(&self) -> Option<Value> {
        None
    }

    fn restore(&self, _state: Value) {}
}

/// Flatten a payload into evaluable rows, post-window shape.
pub(crate) fn rows_of(data: &StreamData) -> Vec<DataRow> {
    match data {
        StreamData::Tuple(t) => vec![DataRow::Tuple(t.clone())],
        StreamData::Window(b) => b.iter_tuples().cloned().map(DataRow::Tuple).collect(),
        StreamData::Join(b) => b.rows.iter().cloned().map(DataRow::Join).collect(),
        StreamData::Groups(g) => g.groups.iter().flatten().cloned().collect(),
        _ => vec![],
    }
}
