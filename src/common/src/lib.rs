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

//! Shared building blocks for the rengine workspace: the dynamic [`Value`]
//! model flowing through dataflows, tuple/batch containers, stream-definition
//! catalog types, rule options and the sled-backed key-value store.

pub mod catalog;
pub mod error;
pub mod rule;
pub mod store;
pub mod tuple;
pub mod types;

pub use types::{Map, Value};

/// Milliseconds since the unix epoch, the engine's processing-time clock.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
