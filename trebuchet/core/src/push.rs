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

//! The push protocol for one map attempt's shuffle blocks.
//!
//! A [PushJob] uploads the committed blocks of a single map attempt to a
//! merge server, one RPC per block, with bounded concurrency. Block outcomes
//! are independent: each block gets exactly one terminal notification on the
//! job's [PushListener], and outcomes arrive out of order. The job never
//! re-issues an RPC itself; retrying means the caller builds a fresh job.
//!
//! Failures are interpreted through [PushErrorPolicy]. An expected race
//! (the merged shuffle was finalized, or this attempt's pushes are stale)
//! aborts the job: blocks that have not started yet never issue their RPC,
//! since the server would refuse them too.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Result, TrebuchetError};
use crate::error_policy::{ErrorPolicy, PushErrorPolicy};
use crate::serde::decode_header_from_error_string;
use crate::serde::protobuf;

/// Lifecycle of a single block within a push job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPushState {
    /// No RPC issued yet.
    Pending,
    /// Upload RPC issued, outcome unknown.
    InFlight,
    /// Server acknowledged the block.
    Succeeded,
    /// Upload failed; the listener was notified.
    Failed,
}

/// Lifecycle of a whole push job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushJobState {
    /// Blocks are still pending or in flight.
    Running,
    /// Every block reached a terminal state.
    Completed,
    /// The job stopped early; un-started blocks never issued their RPC.
    Aborted,
}

/// Receives one terminal notification per started block.
///
/// Callbacks arrive from concurrent upload tasks, out of order;
/// implementations must be callable concurrently.
pub trait PushListener: Send + Sync {
    /// The server acknowledged `block_id`.
    fn on_success(&self, block_id: &str);

    /// Pushing `block_id` failed with `error`.
    fn on_failure(&self, block_id: &str, error: &TrebuchetError);
}

/// The transport seam: issues one upload RPC for one block.
///
/// The production implementation is the gRPC merge server client; tests
/// substitute scripted outcomes.
#[async_trait]
pub trait BlockTransferClient: Send + Sync {
    /// Uploads one block and resolves with the server's acknowledgement or
    /// the failure for exactly this block.
    async fn push_block(
        &self,
        request: protobuf::PushBlockRequest,
    ) -> Result<protobuf::PushBlockResponse>;
}

/// One shuffle block staged for pushing.
#[derive(Debug, Clone)]
pub struct PushBlock {
    /// Globally unique block identifier.
    pub block_id: String,
    /// The committed block bytes.
    pub data: Bytes,
}

struct JobShared {
    /// Set when an expected-race failure tells us the server moved on.
    aborted: AtomicBool,
    /// Set when the owning task was killed.
    cancelled: AtomicBool,
    states: Mutex<Vec<BlockPushState>>,
    upload_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobShared {
    fn halted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst) || self.cancelled.load(Ordering::SeqCst)
    }
}

/// Uploads the blocks of one map attempt to a merge server.
pub struct PushJob {
    app_id: String,
    map_index: u32,
    blocks: Vec<PushBlock>,
    client: Arc<dyn BlockTransferClient>,
    listener: Arc<dyn PushListener>,
    policy: PushErrorPolicy,
    max_concurrent_blocks: usize,
}

impl PushJob {
    /// Creates a job for the given blocks, in push order.
    pub fn new(
        app_id: impl Into<String>,
        map_index: u32,
        blocks: Vec<PushBlock>,
        client: Arc<dyn BlockTransferClient>,
        listener: Arc<dyn PushListener>,
        max_concurrent_blocks: usize,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            map_index,
            blocks,
            client,
            listener,
            policy: PushErrorPolicy,
            max_concurrent_blocks: max_concurrent_blocks.max(1),
        }
    }

    /// Starts pushing. Never blocks; all completion is reported through the
    /// listener. The returned handle observes and cancels the job.
    pub fn start(self) -> PushJobHandle {
        let shared = Arc::new(JobShared {
            aborted: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            states: Mutex::new(vec![BlockPushState::Pending; self.blocks.len()]),
            upload_handles: Mutex::new(Vec::with_capacity(self.blocks.len())),
        });
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_blocks));

        let driver_shared = shared.clone();
        let driver = tokio::spawn(async move {
            let PushJob {
                app_id,
                map_index,
                blocks,
                client,
                listener,
                policy,
                ..
            } = self;
            for (index, block) in blocks.into_iter().enumerate() {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                // A terminal failure on an earlier block means the server
                // would refuse this one as well; leave it un-started.
                if driver_shared.halted() {
                    break;
                }
                driver_shared.states.lock()[index] = BlockPushState::InFlight;
                let handle = tokio::spawn(push_one_block(
                    index,
                    block,
                    app_id.clone(),
                    map_index,
                    client.clone(),
                    listener.clone(),
                    policy,
                    driver_shared.clone(),
                    permit,
                ));
                driver_shared.upload_handles.lock().push(handle);
            }
            let uploads = std::mem::take(&mut *driver_shared.upload_handles.lock());
            for upload in uploads {
                let _ = upload.await;
            }
        });

        PushJobHandle {
            shared,
            driver: Mutex::new(Some(driver)),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn push_one_block(
    index: usize,
    block: PushBlock,
    app_id: String,
    map_index: u32,
    client: Arc<dyn BlockTransferClient>,
    listener: Arc<dyn PushListener>,
    policy: PushErrorPolicy,
    shared: Arc<JobShared>,
    permit: tokio::sync::OwnedSemaphorePermit,
) {
    let _permit = permit;
    let request = protobuf::PushBlockRequest {
        app_id,
        block_id: block.block_id.clone(),
        map_index,
        data: block.data.to_vec(),
    };
    let outcome = client.push_block(request).await;
    if shared.cancelled.load(Ordering::SeqCst) {
        // abandoned: the owning task is gone, nobody listens anymore
        return;
    }
    match outcome {
        Ok(_) => {
            shared.states.lock()[index] = BlockPushState::Succeeded;
            listener.on_success(&block.block_id);
        }
        Err(error) => {
            shared.states.lock()[index] = BlockPushState::Failed;
            // responses can arrive out of order; trust the header the server
            // embedded in the error over our own bookkeeping when present
            let failed_block =
                failed_block_id(&error).unwrap_or_else(|| block.block_id.clone());
            if policy.is_expected_race(&error) {
                shared.aborted.store(true, Ordering::SeqCst);
                debug!(
                    "Block {failed_block} lost an expected push race, dropping remaining blocks: {error}"
                );
            } else if policy.should_log(&error) {
                error!("Failed to push block {failed_block}: {error}");
            } else {
                debug!("Failed to push block {failed_block}: {error}");
            }
            listener.on_failure(&failed_block, &error);
        }
    }
}

/// Extracts the block named by a push header embedded in the error message.
fn failed_block_id(error: &TrebuchetError) -> Option<String> {
    let message = match error {
        TrebuchetError::GrpcError(status) => status.message().to_string(),
        other => other.to_string(),
    };
    decode_header_from_error_string(&message).map(|(_, block_id, _)| block_id)
}

/// Observer and cancellation handle for a started [PushJob].
pub struct PushJobHandle {
    shared: Arc<JobShared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl PushJobHandle {
    /// Abandons the job: un-started blocks never start, in-flight uploads
    /// are aborted best-effort and no further listener callbacks fire.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        if let Some(driver) = self.driver.lock().as_ref() {
            driver.abort();
        }
        for upload in self.shared.upload_handles.lock().iter() {
            upload.abort();
        }
    }

    /// Current job state.
    pub fn state(&self) -> PushJobState {
        if self.shared.halted() {
            return PushJobState::Aborted;
        }
        let states = self.shared.states.lock();
        let all_terminal = states.iter().all(|s| {
            matches!(s, BlockPushState::Succeeded | BlockPushState::Failed)
        });
        if all_terminal {
            PushJobState::Completed
        } else {
            PushJobState::Running
        }
    }

    /// Per-block states, in push order.
    pub fn block_states(&self) -> Vec<BlockPushState> {
        self.shared.states.lock().clone()
    }

    /// Waits until the job has stopped issuing RPCs and every started upload
    /// has reported. Intended for tests and orderly executor shutdown.
    pub async fn wait(&self) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_policy::STALE_BLOCK_PUSH_MESSAGE_SUFFIX;
    use crate::serde::encode_header_into_error_string;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedTransferClient {
        /// block_id -> grpc error message for blocks that must fail
        failures: HashMap<String, String>,
        delay: Option<Duration>,
        issued: Mutex<Vec<protobuf::PushBlockRequest>>,
    }

    impl ScriptedTransferClient {
        fn issued_block_ids(&self) -> Vec<String> {
            self.issued.lock().iter().map(|r| r.block_id.clone()).collect()
        }
    }

    #[async_trait]
    impl BlockTransferClient for ScriptedTransferClient {
        async fn push_block(
            &self,
            request: protobuf::PushBlockRequest,
        ) -> Result<protobuf::PushBlockResponse> {
            self.issued.lock().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.failures.get(&request.block_id) {
                Some(message) => Err(TrebuchetError::GrpcError(Box::new(
                    tonic::Status::internal(message.clone()),
                ))),
                None => Ok(protobuf::PushBlockResponse {
                    block_id: request.block_id,
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        successes: Mutex<Vec<String>>,
        failures: Mutex<Vec<String>>,
    }

    impl PushListener for RecordingListener {
        fn on_success(&self, block_id: &str) {
            self.successes.lock().push(block_id.to_string());
        }

        fn on_failure(&self, block_id: &str, _error: &TrebuchetError) {
            self.failures.lock().push(block_id.to_string());
        }
    }

    fn blocks(ids: &[&str]) -> Vec<PushBlock> {
        ids.iter()
            .map(|id| PushBlock {
                block_id: id.to_string(),
                data: Bytes::from_static(&[1, 2, 3]),
            })
            .collect()
    }

    #[tokio::test]
    async fn all_blocks_acknowledged() {
        let client = Arc::new(ScriptedTransferClient::default());
        let listener = Arc::new(RecordingListener::default());
        let job = PushJob::new(
            "app-1",
            7,
            blocks(&["b0", "b1", "b2"]),
            client.clone(),
            listener.clone(),
            2,
        );
        let handle = job.start();
        handle.wait().await;

        let mut successes = listener.successes.lock().clone();
        successes.sort();
        assert_eq!(vec!["b0", "b1", "b2"], successes);
        assert!(listener.failures.lock().is_empty());
        assert_eq!(PushJobState::Completed, handle.state());

        // every request carried the full routing header
        for request in client.issued.lock().iter() {
            assert_eq!("app-1", request.app_id);
            assert_eq!(7, request.map_index);
            assert_eq!(vec![1, 2, 3], request.data);
        }
    }

    #[tokio::test]
    async fn unclassified_failure_does_not_stop_the_job() {
        let mut failures = HashMap::new();
        failures.insert("b1".to_string(), "Failed b1".to_string());
        let client = Arc::new(ScriptedTransferClient {
            failures,
            ..Default::default()
        });
        let listener = Arc::new(RecordingListener::default());
        let handle = PushJob::new(
            "app-1",
            0,
            blocks(&["b0", "b1", "b2"]),
            client.clone(),
            listener.clone(),
            1,
        )
        .start();
        handle.wait().await;

        assert_eq!(vec!["b0", "b1", "b2"], client.issued_block_ids());
        assert_eq!(vec!["b1".to_string()], listener.failures.lock().clone());
        let mut successes = listener.successes.lock().clone();
        successes.sort();
        assert_eq!(vec!["b0", "b2"], successes);
        assert_eq!(PushJobState::Completed, handle.state());
        assert_eq!(
            vec![
                BlockPushState::Succeeded,
                BlockPushState::Failed,
                BlockPushState::Succeeded
            ],
            handle.block_states()
        );
    }

    #[tokio::test]
    async fn stale_failure_stops_unstarted_blocks() {
        let mut failures = HashMap::new();
        failures.insert(
            "b1".to_string(),
            format!("Block b1 {STALE_BLOCK_PUSH_MESSAGE_SUFFIX}"),
        );
        let client = Arc::new(ScriptedTransferClient {
            failures,
            ..Default::default()
        });
        let listener = Arc::new(RecordingListener::default());
        let handle = PushJob::new(
            "app-1",
            0,
            blocks(&["b0", "b1", "b2", "b3"]),
            client.clone(),
            listener.clone(),
            1,
        )
        .start();
        handle.wait().await;

        // b2 and b3 never issued an RPC
        assert_eq!(vec!["b0", "b1"], client.issued_block_ids());
        assert_eq!(vec!["b0".to_string()], listener.successes.lock().clone());
        assert_eq!(vec!["b1".to_string()], listener.failures.lock().clone());
        assert_eq!(PushJobState::Aborted, handle.state());
        assert_eq!(
            vec![
                BlockPushState::Succeeded,
                BlockPushState::Failed,
                BlockPushState::Pending,
                BlockPushState::Pending
            ],
            handle.block_states()
        );
    }

    #[tokio::test]
    async fn failed_block_recovered_from_embedded_header() {
        // the server identifies a different block than the one this response
        // slot belongs to; the embedded header wins
        let mut failures = HashMap::new();
        failures.insert(
            "b1".to_string(),
            encode_header_into_error_string("app-1", "b9", 0, "disk full on server"),
        );
        let client = Arc::new(ScriptedTransferClient {
            failures,
            ..Default::default()
        });
        let listener = Arc::new(RecordingListener::default());
        let handle = PushJob::new(
            "app-1",
            0,
            blocks(&["b0", "b1"]),
            client,
            listener.clone(),
            2,
        )
        .start();
        handle.wait().await;

        assert_eq!(vec!["b9".to_string()], listener.failures.lock().clone());
    }

    #[tokio::test]
    async fn cancel_abandons_without_callbacks() {
        let client = Arc::new(ScriptedTransferClient {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let listener = Arc::new(RecordingListener::default());
        let handle = PushJob::new(
            "app-1",
            0,
            blocks(&["b0", "b1"]),
            client,
            listener.clone(),
            2,
        )
        .start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        handle.wait().await;

        assert!(listener.successes.lock().is_empty());
        assert!(listener.failures.lock().is_empty());
        assert_eq!(PushJobState::Aborted, handle.state());
    }

    #[tokio::test]
    async fn empty_job_completes() {
        let client = Arc::new(ScriptedTransferClient::default());
        let listener = Arc::new(RecordingListener::default());
        let handle = PushJob::new("app-1", 0, vec![], client, listener, 4).start();
        handle.wait().await;
        assert_eq!(PushJobState::Completed, handle.state());
    }
}
