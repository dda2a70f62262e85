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

use std::convert::TryInto;

use crate::error::TrebuchetError;
use crate::serde::protobuf;
use crate::serde::scheduler::{Bitmap, BlockLocation, MapOutputRecord, SizeSummary};

impl TryInto<BlockLocation> for protobuf::BlockLocation {
    type Error = TrebuchetError;

    fn try_into(self) -> Result<BlockLocation, Self::Error> {
        let port: u16 = self.port.try_into().map_err(|_| {
            TrebuchetError::Internal(format!(
                "scheduler::from_proto(BlockLocation) port {} out of range",
                self.port
            ))
        })?;
        Ok(BlockLocation {
            host: self.host,
            port,
            executor_id: self.executor_id,
        })
    }
}

impl TryInto<MapOutputRecord> for protobuf::MapOutputRecord {
    type Error = TrebuchetError;

    fn try_into(self) -> Result<MapOutputRecord, Self::Error> {
        let location: BlockLocation = self
            .location
            .ok_or_else(|| {
                TrebuchetError::Internal(
                    "scheduler::from_proto(MapOutputRecord) missing location".to_owned(),
                )
            })?
            .try_into()?;
        let summary = match self.summary {
            Some(protobuf::map_output_record::Summary::Dense(dense)) => {
                SizeSummary::Dense(dense.sizes)
            }
            Some(protobuf::map_output_record::Summary::Sparse(sparse)) => {
                let non_empty = Bitmap::from_raw(sparse.num_bits as usize, sparse.words)
                    .ok_or_else(|| {
                        TrebuchetError::Internal(
                            "scheduler::from_proto(MapOutputRecord) malformed bitmap"
                                .to_owned(),
                        )
                    })?;
                SizeSummary::Sparse {
                    non_empty,
                    avg_non_empty_size: sparse.avg_non_empty_size,
                }
            }
            None => {
                return Err(TrebuchetError::Internal(
                    "scheduler::from_proto(MapOutputRecord) missing size summary"
                        .to_owned(),
                ))
            }
        };
        Ok(MapOutputRecord::from_parts(location, summary))
    }
}
