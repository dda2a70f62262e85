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

//! Classification of shuffle transfer failures.
//!
//! Push-based shuffle races by construction: two map attempts can push the
//! same block, and a merge server may have finalized a shuffle before a late
//! push arrives. The merge service reports those conditions through known
//! marker strings in its error messages, a textual contract between server
//! and client that is centralized here. Failures carrying a marker are
//! expected races and are neither retried nor logged as errors; anything
//! unrecognized is treated as a genuine transient failure, retried and kept
//! visible.

use std::error::Error;
use std::io;

/// The block arrived after the merged shuffle was finalized. The server has
/// moved past this attempt; pushing more data is wasted work.
pub const TOO_LATE_MESSAGE_SUFFIX: &str = "received after merged shuffle is finalized";

/// Another writer currently holds the partition this block merges into. A
/// fresh push may land once the writer finishes, so this is retryable.
pub const BLOCK_APPEND_COLLISION_DETECTED_MSG_PREFIX: &str =
    "Couldn't find an opportunity to write block";

/// The push belongs to an older shuffle generation than the one the server
/// is currently merging.
pub const STALE_BLOCK_PUSH_MESSAGE_SUFFIX: &str = "is a stale block push";

/// The finalize request belongs to an older shuffle generation.
pub const STALE_SHUFFLE_FINALIZE_MESSAGE_SUFFIX: &str =
    "is a stale shuffle finalize request";

/// The fetch targets merged data from an older shuffle generation.
pub const STALE_BLOCK_FETCH_MESSAGE_SUFFIX: &str = "is a stale block fetch";

/// Decision for a single caught error: whether the operation is worth
/// retrying and whether the error deserves an error-level log line.
///
/// Computed on demand from the error itself, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorVerdict {
    /// A fresh attempt may succeed.
    pub should_retry: bool,
    /// The failure is unexpected and must stay visible.
    pub should_log: bool,
}

/// Policy mapping a caught error to an [ErrorVerdict].
///
/// Implementations are pure and side-effect free; they never panic. They may
/// be called concurrently without coordination.
pub trait ErrorPolicy: Send + Sync {
    /// Whether the failed operation is worth retrying.
    fn should_retry(&self, error: &(dyn Error + 'static)) -> bool;

    /// Whether the failure deserves an error-level log line.
    fn should_log(&self, error: &(dyn Error + 'static)) -> bool;

    /// Both decisions at once.
    fn verdict(&self, error: &(dyn Error + 'static)) -> ErrorVerdict {
        ErrorVerdict {
            should_retry: self.should_retry(error),
            should_log: self.should_log(error),
        }
    }
}

/// Collects the message of every error in the cause chain.
///
/// gRPC statuses contribute their raw server-side message rather than their
/// `Display` form so that suffix markers survive the transport wrapping.
fn cause_messages(error: &(dyn Error + 'static)) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current: Option<&(dyn Error + 'static)> = Some(error);
    while let Some(e) = current {
        if let Some(status) = e.downcast_ref::<tonic::Status>() {
            messages.push(status.message().to_string());
        } else {
            messages.push(e.to_string());
        }
        current = e.source();
    }
    messages
}

/// Whether the cause chain contains a refused connection.
fn is_connection_refused(error: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(error);
    while let Some(e) = current {
        if let Some(io_error) = e.downcast_ref::<io::Error>() {
            if io_error.kind() == io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        if e.to_string().contains("Connection refused") {
            return true;
        }
        current = e.source();
    }
    false
}

/// Classification policy for the block push path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushErrorPolicy;

impl PushErrorPolicy {
    /// Whether the error is one of the expected race classes, after which
    /// further pushes for the same job are wasted work.
    pub fn is_expected_race(&self, error: &(dyn Error + 'static)) -> bool {
        cause_messages(error).iter().any(|m| {
            m.ends_with(TOO_LATE_MESSAGE_SUFFIX)
                || m.ends_with(STALE_BLOCK_PUSH_MESSAGE_SUFFIX)
                || m.ends_with(STALE_SHUFFLE_FINALIZE_MESSAGE_SUFFIX)
        })
    }
}

impl ErrorPolicy for PushErrorPolicy {
    fn should_retry(&self, error: &(dyn Error + 'static)) -> bool {
        if self.is_expected_race(error) {
            return false;
        }
        // A refused connection means the merge server is gone; retrying the
        // push from this attempt cannot reach it.
        if is_connection_refused(error) {
            return false;
        }
        true
    }

    fn should_log(&self, error: &(dyn Error + 'static)) -> bool {
        if self.is_expected_race(error) {
            return false;
        }
        if cause_messages(error)
            .iter()
            .any(|m| m.starts_with(BLOCK_APPEND_COLLISION_DETECTED_MSG_PREFIX))
        {
            return false;
        }
        true
    }
}

/// Classification policy for the merged block fetch path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchErrorPolicy;

impl FetchErrorPolicy {
    fn is_stale_fetch(&self, error: &(dyn Error + 'static)) -> bool {
        cause_messages(error)
            .iter()
            .any(|m| m.ends_with(STALE_BLOCK_FETCH_MESSAGE_SUFFIX))
    }
}

impl ErrorPolicy for FetchErrorPolicy {
    fn should_retry(&self, error: &(dyn Error + 'static)) -> bool {
        !self.is_stale_fetch(error)
    }

    fn should_log(&self, error: &(dyn Error + 'static)) -> bool {
        !self.is_stale_fetch(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrebuchetError;

    fn grpc_error(message: &str) -> TrebuchetError {
        TrebuchetError::GrpcError(Box::new(tonic::Status::internal(message)))
    }

    #[test]
    fn push_too_late_not_retried_not_logged() {
        let policy = PushErrorPolicy;
        let error = grpc_error(&format!(
            "Block shuffle_push_5_0_11 {TOO_LATE_MESSAGE_SUFFIX}"
        ));
        assert!(!policy.should_retry(&error));
        assert!(!policy.should_log(&error));
        assert!(policy.is_expected_race(&error));
    }

    #[test]
    fn push_append_collision_retried_quietly() {
        let policy = PushErrorPolicy;
        let error = grpc_error(&format!(
            "{BLOCK_APPEND_COLLISION_DETECTED_MSG_PREFIX} shuffle_push_5_0_11 to merged shuffle"
        ));
        assert!(policy.should_retry(&error));
        assert!(!policy.should_log(&error));
        assert!(!policy.is_expected_race(&error));
    }

    #[test]
    fn push_stale_push_not_retried_not_logged() {
        let policy = PushErrorPolicy;
        let error = grpc_error(&format!(
            "Block shuffle_push_5_0_11 {STALE_BLOCK_PUSH_MESSAGE_SUFFIX}"
        ));
        assert!(!policy.should_retry(&error));
        assert!(!policy.should_log(&error));
    }

    #[test]
    fn push_stale_finalize_not_retried_not_logged() {
        let policy = PushErrorPolicy;
        let error = grpc_error(&format!(
            "Finalize of shuffle 5 {STALE_SHUFFLE_FINALIZE_MESSAGE_SUFFIX}"
        ));
        assert!(!policy.should_retry(&error));
        assert!(!policy.should_log(&error));
    }

    #[test]
    fn push_connection_refused_not_retried_still_logged() {
        let policy = PushErrorPolicy;
        let error = TrebuchetError::IoError(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused (os error 111)",
        ));
        assert!(!policy.should_retry(&error));
        assert!(policy.should_log(&error));
        assert!(!policy.is_expected_race(&error));
    }

    #[test]
    fn push_unrecognized_retried_and_logged() {
        let policy = PushErrorPolicy;
        let error = grpc_error("something unexpected happened");
        assert!(policy.should_retry(&error));
        assert!(policy.should_log(&error));
    }

    #[test]
    fn fetch_stale_not_retried_not_logged() {
        let policy = FetchErrorPolicy;
        let error = grpc_error(&format!(
            "Fetch of mergedShuffle_5_11 {STALE_BLOCK_FETCH_MESSAGE_SUFFIX}"
        ));
        assert!(!policy.should_retry(&error));
        assert!(!policy.should_log(&error));
    }

    #[test]
    fn fetch_unrecognized_retried_and_logged() {
        let policy = FetchErrorPolicy;
        let error = grpc_error("connection reset by peer");
        assert!(policy.should_retry(&error));
        assert!(policy.should_log(&error));
    }

    #[test]
    fn markers_found_through_cause_chain() {
        // the marker sits on the wrapped io cause, not on the top error
        let policy = PushErrorPolicy;
        let io = std::io::Error::other(format!(
            "Block shuffle_push_1_2_3 {STALE_BLOCK_PUSH_MESSAGE_SUFFIX}"
        ));
        let error = TrebuchetError::IoError(io);
        assert!(!policy.should_retry(&error));
        assert!(!policy.should_log(&error));
    }
}
