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

//! Executor state for the shuffle data plane.
//!
//! One [ShuffleExecutor] lives per executor process. When a map task attempt
//! finishes it hands its written temp files here; the executor commits them,
//! builds the [MapOutputRecord] the scheduler needs, and, when push-based
//! shuffle is enabled, starts uploading the committed blocks to the
//! attempt's merge server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::error;
use uuid::Uuid;

use trebuchet_core::client::MergeClientRegistry;
use trebuchet_core::config::TrebuchetConfig;
use trebuchet_core::error::Result;
use trebuchet_core::push::{PushJobHandle, PushListener};
use trebuchet_core::serde::scheduler::{BlockLocation, MapOutputRecord};

use crate::block_pusher::ShuffleBlockPusher;
use crate::output_commit::{CommitRequest, OutputCommitCoordinator};

/// What became of a finished map attempt.
pub enum MapAttemptOutcome {
    /// Another attempt published this partition first, or publication failed.
    /// Either way the caller re-runs the whole task.
    Lost,
    /// This attempt's output is canonical.
    Committed {
        /// Report for the scheduler's map output tracker.
        record: MapOutputRecord,
        /// Handle on the started push job, when push shuffle is enabled.
        push: Option<PushJobHandle>,
    },
}

/// Per-process owner of the shuffle commit and push machinery.
pub struct ShuffleExecutor {
    app_id: String,
    location: BlockLocation,
    config: TrebuchetConfig,
    commit_coordinator: OutputCommitCoordinator,
    registry: Arc<MergeClientRegistry>,
}

impl ShuffleExecutor {
    /// Creates the executor-side shuffle state for one application.
    pub fn new(
        app_id: impl Into<String>,
        location: BlockLocation,
        config: TrebuchetConfig,
    ) -> Self {
        let registry = Arc::new(MergeClientRegistry::new(
            Duration::from_secs(config.merge_client_ttl_seconds()),
            config.grpc_client_max_message_size(),
        ));
        Self {
            app_id: app_id.into(),
            location,
            config,
            commit_coordinator: OutputCommitCoordinator::new(),
            registry,
        }
    }

    /// The coordinator publishing map output files for this process.
    pub fn commit_coordinator(&self) -> &OutputCommitCoordinator {
        &self.commit_coordinator
    }

    /// The merge server connection registry for this process.
    pub fn merge_client_registry(&self) -> &Arc<MergeClientRegistry> {
        &self.registry
    }

    /// Names a temporary output file next to its final location. Unique per
    /// attempt so concurrent attempts never collide before commit.
    pub fn temp_output_path(dir: &Path, final_name: &str) -> PathBuf {
        dir.join(format!("{final_name}.{}.tmp", Uuid::new_v4()))
    }

    /// Completes a map attempt: commit its files, build the size record and
    /// start pushing the committed blocks when enabled.
    ///
    /// `raw_sizes` holds the output bytes per reduce partition and
    /// `partition_files` the final file per reduce partition, both indexed by
    /// reduce partition id.
    pub async fn finish_map_attempt(
        &self,
        shuffle_id: u32,
        map_index: u32,
        commit: &CommitRequest,
        raw_sizes: &[u64],
        partition_files: &[PathBuf],
        merge_server: Option<&BlockLocation>,
        listener: Arc<dyn PushListener>,
    ) -> Result<MapAttemptOutcome> {
        if !self.commit_coordinator.commit(commit) {
            return Ok(MapAttemptOutcome::Lost);
        }

        let record = MapOutputRecord::new(self.location.clone(), raw_sizes);

        let push = match merge_server {
            Some(server) if self.config.push_enabled() => {
                let pusher = ShuffleBlockPusher::new(
                    self.app_id.clone(),
                    self.registry.clone(),
                    &self.config,
                );
                match pusher
                    .push_map_output(
                        shuffle_id,
                        map_index,
                        &record,
                        partition_files,
                        server,
                        listener,
                    )
                    .await
                {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        // the commit stands; only the merge path is lost
                        error!(
                            "shuffle {shuffle_id} map {map_index}: failed to start push job: {e}"
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(MapAttemptOutcome::Committed { record, push })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use trebuchet_core::error::TrebuchetError;

    struct NoopListener;

    impl PushListener for NoopListener {
        fn on_success(&self, _block_id: &str) {}
        fn on_failure(&self, _block_id: &str, _error: &TrebuchetError) {}
    }

    fn executor() -> ShuffleExecutor {
        ShuffleExecutor::new(
            "app-1",
            BlockLocation::new("host-1", 50051, "exec-1"),
            TrebuchetConfig::default(),
        )
    }

    fn stage_attempt(dir: &Path, contents: &[&str]) -> (CommitRequest, Vec<PathBuf>) {
        let mut files = Vec::new();
        let mut finals = Vec::new();
        for (i, data) in contents.iter().enumerate() {
            let final_path = dir.join(format!("{i}.data"));
            let temp_path = ShuffleExecutor::temp_output_path(dir, &format!("{i}.data"));
            if !data.is_empty() {
                fs::write(&temp_path, data).unwrap();
                files.push((temp_path, final_path.clone()));
            }
            finals.push(final_path);
        }
        (
            CommitRequest {
                shuffle_id: 1,
                partition_id: 0,
                files,
            },
            finals,
        )
    }

    #[tokio::test]
    async fn finish_commits_and_reports_sizes() {
        let dir = TempDir::new().unwrap();
        let (commit, finals) = stage_attempt(dir.path(), &["abc", "", "defgh"]);
        let raw_sizes = vec![3u64, 0, 5];

        let outcome = executor()
            .finish_map_attempt(
                1,
                0,
                &commit,
                &raw_sizes,
                &finals,
                None,
                Arc::new(NoopListener),
            )
            .await
            .unwrap();

        match outcome {
            MapAttemptOutcome::Committed { record, push } => {
                assert!(push.is_none());
                assert_eq!(3, record.num_partitions());
                assert_eq!(0, record.size_for_block(1));
                assert!(record.size_for_block(0) > 0);
            }
            MapAttemptOutcome::Lost => panic!("first attempt must win"),
        }
        assert_eq!("abc", fs::read_to_string(&finals[0]).unwrap());
        assert!(!finals[1].exists());
    }

    #[tokio::test]
    async fn duplicate_attempt_loses() {
        let dir = TempDir::new().unwrap();
        let exec = executor();
        let listener = Arc::new(NoopListener);

        let (first, finals) = stage_attempt(dir.path(), &["winner"]);
        let raw_sizes = vec![6u64];
        let outcome = exec
            .finish_map_attempt(1, 0, &first, &raw_sizes, &finals, None, listener.clone())
            .await
            .unwrap();
        assert!(matches!(outcome, MapAttemptOutcome::Committed { .. }));

        let (second, _) = stage_attempt(dir.path(), &["loser"]);
        let outcome = exec
            .finish_map_attempt(1, 0, &second, &raw_sizes, &finals, None, listener)
            .await
            .unwrap();
        assert!(matches!(outcome, MapAttemptOutcome::Lost));
        assert_eq!("winner", fs::read_to_string(&finals[0]).unwrap());
    }

    #[test]
    fn temp_paths_are_unique() {
        let dir = TempDir::new().unwrap();
        let a = ShuffleExecutor::temp_output_path(dir.path(), "0.data");
        let b = ShuffleExecutor::temp_output_path(dir.path(), "0.data");
        assert_ne!(a, b);
    }
}
