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

use crate::serde::protobuf;
use crate::serde::scheduler::{BlockLocation, MapOutputRecord, SizeSummary};

#[allow(clippy::from_over_into)]
impl Into<protobuf::BlockLocation> for &BlockLocation {
    fn into(self) -> protobuf::BlockLocation {
        protobuf::BlockLocation {
            host: self.host.clone(),
            port: self.port as u32,
            executor_id: self.executor_id.clone(),
        }
    }
}

#[allow(clippy::from_over_into)]
impl Into<protobuf::MapOutputRecord> for &MapOutputRecord {
    fn into(self) -> protobuf::MapOutputRecord {
        let summary = match self.summary() {
            SizeSummary::Dense(sizes) => {
                protobuf::map_output_record::Summary::Dense(protobuf::DenseSizeSummary {
                    sizes: sizes.clone(),
                })
            }
            SizeSummary::Sparse {
                non_empty,
                avg_non_empty_size,
            } => protobuf::map_output_record::Summary::Sparse(
                protobuf::SparseSizeSummary {
                    num_bits: non_empty.num_bits() as u32,
                    words: non_empty.words().to_vec(),
                    avg_non_empty_size: *avg_non_empty_size,
                },
            ),
        };
        protobuf::MapOutputRecord {
            location: Some((&self.location).into()),
            summary: Some(summary),
        }
    }
}
