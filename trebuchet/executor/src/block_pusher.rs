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

//! Reads a map attempt's committed output and pushes it to a merge server.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use log::debug;

use trebuchet_core::client::MergeClientRegistry;
use trebuchet_core::config::TrebuchetConfig;
use trebuchet_core::error::{Result, TrebuchetError};
use trebuchet_core::push::{
    BlockTransferClient, PushBlock, PushJob, PushJobHandle, PushListener,
};
use trebuchet_core::serde::scheduler::{BlockLocation, MapOutputRecord};

/// Builds and starts one [PushJob] per committed map attempt.
pub struct ShuffleBlockPusher {
    app_id: String,
    registry: Arc<MergeClientRegistry>,
    max_concurrent_blocks: usize,
    max_block_size_bytes: u64,
}

impl ShuffleBlockPusher {
    /// Creates a pusher for one application.
    pub fn new(
        app_id: impl Into<String>,
        registry: Arc<MergeClientRegistry>,
        config: &TrebuchetConfig,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            registry,
            max_concurrent_blocks: config.push_max_concurrent_blocks(),
            max_block_size_bytes: config.push_max_block_size_bytes(),
        }
    }

    /// Pushes the non-empty blocks of a committed map attempt to the given
    /// merge server. `partition_files` holds the committed file per reduce
    /// partition, indexed like the record.
    ///
    /// A connection failure is terminal for this attempt: the cached
    /// connection is dropped so the next job reconnects, and the error is
    /// returned without any per-block callbacks.
    pub async fn push_map_output(
        &self,
        shuffle_id: u32,
        map_index: u32,
        record: &MapOutputRecord,
        partition_files: &[PathBuf],
        merge_server: &BlockLocation,
        listener: Arc<dyn PushListener>,
    ) -> Result<PushJobHandle> {
        let client = match self
            .registry
            .get_or_connect(&merge_server.host, merge_server.port)
            .await
        {
            Ok(client) => client,
            Err(e) => {
                self.registry.remove(&merge_server.host, merge_server.port);
                return Err(e);
            }
        };
        self.push_map_output_with_client(
            shuffle_id,
            map_index,
            record,
            partition_files,
            Arc::new(client),
            listener,
        )
    }

    /// [Self::push_map_output] with the transport already resolved.
    pub fn push_map_output_with_client(
        &self,
        shuffle_id: u32,
        map_index: u32,
        record: &MapOutputRecord,
        partition_files: &[PathBuf],
        client: Arc<dyn BlockTransferClient>,
        listener: Arc<dyn PushListener>,
    ) -> Result<PushJobHandle> {
        if partition_files.len() != record.num_partitions() {
            return Err(TrebuchetError::Internal(format!(
                "shuffle {shuffle_id} map {map_index}: {} partition files for {} partitions",
                partition_files.len(),
                record.num_partitions()
            )));
        }

        let mut blocks = Vec::new();
        let mut skipped_large = 0usize;
        for reduce_id in 0..record.num_partitions() {
            // empty partitions have nothing to merge
            if record.size_for_block(reduce_id) == 0 {
                continue;
            }
            let block_id = format!("shuffle_push_{shuffle_id}_{map_index}_{reduce_id}");
            let data = match fs::read(&partition_files[reduce_id]) {
                Ok(data) => Bytes::from(data),
                Err(e) => {
                    // unreadable block: fail this block, keep pushing the rest
                    listener.on_failure(&block_id, &TrebuchetError::IoError(e));
                    continue;
                }
            };
            if data.len() as u64 > self.max_block_size_bytes {
                skipped_large += 1;
                continue;
            }
            blocks.push(PushBlock { block_id, data });
        }
        if skipped_large > 0 {
            debug!(
                "shuffle {shuffle_id} map {map_index}: skipped {skipped_large} blocks larger than {} bytes",
                self.max_block_size_bytes
            );
        }

        let job = PushJob::new(
            self.app_id.clone(),
            map_index,
            blocks,
            client,
            listener,
            self.max_concurrent_blocks,
        );
        Ok(job.start())
    }
}
