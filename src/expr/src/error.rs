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

/// A specialized Result type for expression operations.
pub type Result<T> = std::result::Result<T, ExprError>;

/// The error type for expression operations. The `InvalidOperation` message
/// format is user-observable: error-tagged tuples carry it verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Operand rendering is `<type>(<value>)`, e.g. `string(red) * int64(5)`.
    #[error("invalid operation {lhs} {op} {rhs}")]
    InvalidOperation {
        lhs: String,
        op: String,
        rhs: String,
    },

    #[error("divided by zero")]
    DivisionByZero,

    #[error("function {0} not found")]
    UnknownFunction(String),

    #[error("invalid argument for {func}: {reason}")]
    InvalidArgument { func: String, reason: String },

    #[error("aggregate function {0} is only allowed over grouped input")]
    AggregateOutsideGroup(String),

    #[error("{0}")]
    Eval(String),
}

impl ExprError {
    pub(crate) fn invalid_operation(
        lhs: &rengine_common::Value,
        op: impl std::fmt::Display,
        rhs: &rengine_common::Value,
    ) -> Self {
        ExprError::InvalidOperation {
            lhs: format!("{}({})", lhs.type_name(), lhs),
            op: op.to_string(),
            rhs: format!("{}({})", rhs.type_name(), rhs),
        }
    }
}
