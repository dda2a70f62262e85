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

//! Client API for pushing shuffle blocks to merge servers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;

use crate::error::{Result, TrebuchetError};
use crate::push::BlockTransferClient;
use crate::serde::protobuf;
use crate::serde::protobuf::merge_service_client::MergeServiceClient;
use crate::utils::create_grpc_client_connection;

/// Clock used by the client registry for TTL eviction. Injectable so tests
/// can age connections without sleeping.
pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// Client for interacting with one merge server.
#[derive(Clone)]
pub struct MergeServerClient {
    inner: MergeServiceClient<tonic::transport::channel::Channel>,
}

impl MergeServerClient {
    /// Create a new MergeServerClient connected to the merge server listening
    /// on the specified host and port
    pub async fn try_new(host: &str, port: u16, max_message_size: usize) -> Result<Self> {
        let addr = format!("http://{host}:{port}");
        debug!("MergeServerClient connecting to {addr}");
        let connection =
            create_grpc_client_connection(addr.clone())
                .await
                .map_err(|e| {
                    TrebuchetError::GrpcConnectionError(format!(
                        "Error connecting to merge server at {addr}: {e:?}"
                    ))
                })?;
        let inner = MergeServiceClient::new(connection)
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size);

        debug!("MergeServerClient connected OK");

        Ok(Self { inner })
    }

    /// Uploads one shuffle block and waits for the server's acknowledgement.
    pub async fn push_block(
        &self,
        request: protobuf::PushBlockRequest,
    ) -> Result<protobuf::PushBlockResponse> {
        // the generated client requires &mut self but is cheaply cloneable,
        // sharing the underlying channel
        let mut client = self.inner.clone();
        let response = client.push_block(request).await?;
        Ok(response.into_inner())
    }

    /// Tells the merge server that no more blocks will be pushed for the
    /// given shuffle.
    pub async fn finalize_shuffle_merge(&self, app_id: &str, shuffle_id: u32) -> Result<()> {
        let mut client = self.inner.clone();
        client
            .finalize_shuffle_merge(protobuf::FinalizeShuffleMergeRequest {
                app_id: app_id.to_owned(),
                shuffle_id,
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BlockTransferClient for MergeServerClient {
    async fn push_block(
        &self,
        request: protobuf::PushBlockRequest,
    ) -> Result<protobuf::PushBlockResponse> {
        MergeServerClient::push_block(self, request).await
    }
}

/// A cached connection with its creation timestamp.
struct CachedClient {
    client: MergeServerClient,
    created_at: Instant,
}

/// Registry of merge server connections, keyed by (host, port).
///
/// Push jobs for different map attempts reuse connections instead of paying
/// the gRPC handshake per job. Connections have a time-to-live after which
/// they are replaced with fresh ones, so connections to removed or replaced
/// merge servers do not linger even if they never fail with an error.
///
/// This is an explicit service rather than a process-global map: each
/// registry instance owns its connections, which keeps tests isolated and
/// lets hosts with several contexts keep separate pools.
pub struct MergeClientRegistry {
    /// Map from (host, port) to cached client connection with timestamp
    clients: DashMap<(String, u16), CachedClient>,
    /// Time-to-live for cached connections
    ttl: Duration,
    clock: Clock,
    max_message_size: usize,
}

impl MergeClientRegistry {
    /// Creates an empty registry with the given connection TTL.
    pub fn new(ttl: Duration, max_message_size: usize) -> Self {
        Self::with_clock(ttl, max_message_size, Arc::new(Instant::now))
    }

    /// Creates an empty registry reading time from the supplied clock.
    pub fn with_clock(ttl: Duration, max_message_size: usize, clock: Clock) -> Self {
        Self {
            clients: DashMap::new(),
            ttl,
            clock,
            max_message_size,
        }
    }

    fn is_client_valid(&self, cached: &CachedClient) -> bool {
        (self.clock)().saturating_duration_since(cached.created_at) < self.ttl
    }

    /// Gets an existing connection or creates a new one for the given host
    /// and port. Expired connections are replaced.
    pub async fn get_or_connect(&self, host: &str, port: u16) -> Result<MergeServerClient> {
        let key = (host.to_string(), port);

        if let Some(cached) = self.clients.get(&key) {
            if self.is_client_valid(&cached) {
                debug!("Reusing cached connection to {host}:{port}");
                return Ok(cached.client.clone());
            }
            debug!("Cached connection to {host}:{port} has expired, will create new one");
        }

        // Connect without holding a map entry; concurrent tasks may race to
        // create connections to the same host but only one ends up cached.
        debug!("Creating new connection to {host}:{port}");
        let client = MergeServerClient::try_new(host, port, self.max_message_size).await?;

        let cached = CachedClient {
            client: client.clone(),
            created_at: (self.clock)(),
        };
        self.clients.insert(key, cached);
        Ok(client)
    }

    /// Removes a connection from the registry, forcing reconnection on the
    /// next request. Called after transport-level push failures.
    pub fn remove(&self, host: &str, port: u16) {
        let key = (host.to_string(), port);
        if self.clients.remove(&key).is_some() {
            debug!("Removed cached connection to {host}:{port}");
        }
    }

    /// Removes all expired connections, returning how many were dropped.
    pub fn remove_expired(&self) -> usize {
        let now = (self.clock)();
        let initial_count = self.clients.len();
        self.clients
            .retain(|_, cached| now.saturating_duration_since(cached.created_at) < self.ttl);
        let removed = initial_count - self.clients.len();
        if removed > 0 {
            debug!("Removed {removed} expired connections from registry");
        }
        removed
    }

    /// Returns the number of cached connections.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if the registry has no cached connections.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
