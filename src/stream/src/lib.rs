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

//! The streaming runtime: operator nodes wired by bounded channels, driven by
//! per-instance tokio workers, with checkpoint barriers, prometheus metrics
//! and cooperative shutdown.

pub mod checkpoint;
pub mod error;
pub mod message;
pub mod mock;
pub mod monitor;
pub mod node;
pub mod operator;
pub mod registry;
pub mod template;
pub mod topology;

pub use error::{StreamError, StreamResult};
pub use message::{Barrier, StreamData, StreamMessage};
pub use topology::{PrintableTopo, Topology};
