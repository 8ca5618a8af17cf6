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

//! The planning frontend: resolves streams against the catalog, validates
//! statements, builds and optimizes the logical plan, and assembles the
//! physical topology. Also home of the stream-DDL and rule processors.

pub mod planner;
pub mod processor;

use thiserror::Error;

pub type PlanResult<T> = std::result::Result<T, PlanError>;

/// Planning errors surface to the caller before the rule ever starts.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error(transparent)]
    Parse(#[from] rengine_sqlparser::ParserError),

    #[error("fail to get stream {0}, please check if stream is created")]
    StreamNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Stream(#[from] rengine_stream::StreamError),

    #[error(transparent)]
    Common(#[from] rengine_common::error::CommonError),
}
