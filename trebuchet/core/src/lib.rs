// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Core library for the Trebuchet shuffle data plane.
//!
//! This crate contains the building blocks shared between executors and the
//! scheduler boundary: the compact per-partition size encoding reported for
//! each completed map task, the push protocol that uploads shuffle blocks to
//! remote merge servers, the error classification policies that tell expected
//! races apart from genuine failures, and the gRPC client plumbing used to
//! reach merge servers.

#![warn(missing_docs)]

/// The current version of Trebuchet, derived from the Cargo package version.
pub const TREBUCHET_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prints the current Trebuchet version to stdout.
pub fn print_version() {
    println!("Trebuchet version: {TREBUCHET_VERSION}")
}

/// Client for pushing shuffle blocks to merge servers, plus the client registry.
pub mod client;
/// Configuration options and settings for Trebuchet components.
pub mod config;
/// Error types and result definitions for Trebuchet operations.
pub mod error;
/// Classification of push/fetch failures into retry and logging decisions.
pub mod error_policy;
/// The block push protocol driving per-block uploads for one map attempt.
pub mod push;
/// Serialization and deserialization for Trebuchet messages and records.
pub mod serde;
/// Lossy logarithmic encoding of per-partition output sizes.
pub mod size_codec;
/// General utility functions for Trebuchet operations.
pub mod utils;
