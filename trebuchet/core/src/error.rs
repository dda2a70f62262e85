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

//! Trebuchet error types

use std::{
    error::Error,
    fmt::{Display, Formatter},
    io, result,
};

use futures::future::Aborted;

/// Result type alias for Trebuchet operations.
pub type Result<T> = result::Result<T, TrebuchetError>;

/// Trebuchet error types for the shuffle data plane.
#[derive(Debug)]
pub enum TrebuchetError {
    /// General error with a descriptive message.
    General(String),
    /// Internal error indicating a bug or unexpected state.
    Internal(String),
    /// Configuration error with invalid settings.
    Configuration(String),
    /// I/O operation error.
    IoError(io::Error),
    /// gRPC transport error.
    TonicError(tonic::transport::Error),
    /// gRPC status error.
    GrpcError(Box<tonic::Status>),
    /// gRPC connection failure.
    GrpcConnectionError(String),
    /// Tokio task join error.
    TokioError(tokio::task::JoinError),
    /// Block push failed: (block_id, message).
    PushFailed(String, String),
    /// Operation was cancelled.
    Cancelled,
}

#[allow(clippy::from_over_into)]
impl<T> Into<Result<T>> for TrebuchetError {
    fn into(self) -> Result<T> {
        Err(self)
    }
}

/// Creates a general Trebuchet error from a string message.
pub fn trebuchet_error(message: &str) -> TrebuchetError {
    TrebuchetError::General(message.to_owned())
}

impl From<String> for TrebuchetError {
    fn from(e: String) -> Self {
        TrebuchetError::General(e)
    }
}

impl From<io::Error> for TrebuchetError {
    fn from(e: io::Error) -> Self {
        TrebuchetError::IoError(e)
    }
}

impl From<tonic::transport::Error> for TrebuchetError {
    fn from(e: tonic::transport::Error) -> Self {
        TrebuchetError::TonicError(e)
    }
}

impl From<tonic::Status> for TrebuchetError {
    fn from(e: tonic::Status) -> Self {
        TrebuchetError::GrpcError(Box::new(e))
    }
}

impl From<tokio::task::JoinError> for TrebuchetError {
    fn from(e: tokio::task::JoinError) -> Self {
        TrebuchetError::TokioError(e)
    }
}

impl From<futures::future::Aborted> for TrebuchetError {
    fn from(_: Aborted) -> Self {
        TrebuchetError::Cancelled
    }
}

impl Display for TrebuchetError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TrebuchetError::General(desc) => write!(f, "General error: {desc}"),
            TrebuchetError::Internal(desc) => {
                write!(f, "Internal Trebuchet error: {desc}")
            }
            TrebuchetError::Configuration(desc) => {
                write!(f, "Configuration error: {desc}")
            }
            TrebuchetError::IoError(desc) => write!(f, "IO error: {desc}"),
            TrebuchetError::TonicError(desc) => write!(f, "Tonic error: {desc}"),
            TrebuchetError::GrpcError(desc) => write!(f, "Grpc error: {desc}"),
            TrebuchetError::GrpcConnectionError(desc) => {
                write!(f, "Grpc connection error: {desc}")
            }
            TrebuchetError::TokioError(desc) => write!(f, "Tokio join error: {desc}"),
            TrebuchetError::PushFailed(block_id, desc) => {
                write!(f, "Failed to push block {block_id}: {desc}")
            }
            TrebuchetError::Cancelled => write!(f, "Task cancelled"),
        }
    }
}

impl Error for TrebuchetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        // The error classification policies walk this chain looking for known
        // message markers, so wrapped causes must stay reachable.
        match self {
            TrebuchetError::IoError(e) => Some(e),
            TrebuchetError::TonicError(e) => Some(e),
            TrebuchetError::GrpcError(e) => Some(e.as_ref()),
            TrebuchetError::TokioError(e) => Some(e),
            _ => None,
        }
    }
}
