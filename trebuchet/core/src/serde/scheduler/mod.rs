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

use serde::{Deserialize, Serialize};

use crate::size_codec::{compress_size, decompress_size};

pub mod from_proto;
pub mod to_proto;

/// Partition counts above this use the sparse size summary, which stores one
/// bit per partition instead of one byte plus a single average size.
pub const SPARSE_SIZE_SUMMARY_THRESHOLD: usize = 2000;

/// Meta-data locating the executor that holds a map task's output, used when
/// fetching shuffle partitions from other executors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    /// Hostname or IP address of the executor.
    pub host: String,
    /// Port of the executor's shuffle service.
    pub port: u16,
    /// Identifier assigned to the executor at registration.
    pub executor_id: String,
}

impl BlockLocation {
    /// Creates a new location for an executor registration.
    pub fn new(host: impl Into<String>, port: u16, executor_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            executor_id: executor_id.into(),
        }
    }
}

/// Fixed-width bitset with one bit per downstream partition.
///
/// No third-party bitmap dependency is warranted for a set this small and
/// this simple; partition counts are bounded by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap {
    num_bits: usize,
    words: Vec<u64>,
}

impl Bitmap {
    /// Creates an empty bitmap able to hold `num_bits` bits.
    pub fn new(num_bits: usize) -> Self {
        Self {
            num_bits,
            words: vec![0; num_bits.div_ceil(64)],
        }
    }

    /// Rebuilds a bitmap from its raw representation.
    pub fn from_raw(num_bits: usize, words: Vec<u64>) -> Option<Self> {
        if words.len() != num_bits.div_ceil(64) {
            return None;
        }
        Some(Self { num_bits, words })
    }

    /// Sets bit `index`. Panics if `index` is out of range.
    pub fn set(&mut self, index: usize) {
        assert!(index < self.num_bits, "bit index {index} out of range");
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Whether bit `index` is set. Panics if `index` is out of range.
    pub fn contains(&self, index: usize) -> bool {
        assert!(index < self.num_bits, "bit index {index} out of range");
        self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of bits the bitmap can hold.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// The backing words, least significant bit first.
    pub fn words(&self) -> &[u64] {
        &self.words
    }
}

/// Per-partition output sizes of one map task, in one of two representations
/// chosen once at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeSummary {
    /// One compressed size byte per partition.
    Dense(Vec<u8>),
    /// Bitmap of non-empty partitions plus the average non-empty size.
    /// The average is strictly positive whenever any bit is set.
    Sparse {
        /// Bit `i` is set iff partition `i` has output.
        non_empty: Bitmap,
        /// Average size of the non-empty partitions, integer division.
        avg_non_empty_size: u64,
    },
}

/// Report built once per successful map attempt and shipped to the
/// scheduler's map output tracker.
///
/// Reduce tasks consult [MapOutputRecord::size_for_block] to decide whether a
/// partition is worth fetching at all: the reported size is exactly zero iff
/// the raw size was zero, in both representations. Immutable once built and
/// freely shared, including over the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapOutputRecord {
    /// Where the output lives.
    pub location: BlockLocation,
    summary: SizeSummary,
}

impl MapOutputRecord {
    /// Builds the record from raw per-partition sizes in bytes.
    ///
    /// More than [SPARSE_SIZE_SUMMARY_THRESHOLD] partitions selects the
    /// sparse representation.
    pub fn new(location: BlockLocation, raw_sizes: &[u64]) -> Self {
        let summary = if raw_sizes.len() > SPARSE_SIZE_SUMMARY_THRESHOLD {
            let mut non_empty = Bitmap::new(raw_sizes.len());
            let mut total: u64 = 0;
            let mut count: u64 = 0;
            for (i, &size) in raw_sizes.iter().enumerate() {
                if size > 0 {
                    non_empty.set(i);
                    total += size;
                    count += 1;
                }
            }
            let avg_non_empty_size = if count > 0 { total / count } else { 0 };
            SizeSummary::Sparse {
                non_empty,
                avg_non_empty_size,
            }
        } else {
            SizeSummary::Dense(raw_sizes.iter().map(|&s| compress_size(s)).collect())
        };
        Self { location, summary }
    }

    /// Estimated output size in bytes for the given partition.
    ///
    /// Exactly zero iff the partition was empty. Panics if `partition` is out
    /// of range; an invalid partition index is a programming error, not a
    /// recoverable condition.
    pub fn size_for_block(&self, partition: usize) -> u64 {
        match &self.summary {
            SizeSummary::Dense(sizes) => decompress_size(sizes[partition]),
            SizeSummary::Sparse {
                non_empty,
                avg_non_empty_size,
            } => {
                if non_empty.contains(partition) {
                    *avg_non_empty_size
                } else {
                    0
                }
            }
        }
    }

    /// Number of downstream partitions covered by this record.
    pub fn num_partitions(&self) -> usize {
        match &self.summary {
            SizeSummary::Dense(sizes) => sizes.len(),
            SizeSummary::Sparse { non_empty, .. } => non_empty.num_bits(),
        }
    }

    /// The size representation backing this record.
    pub fn summary(&self) -> &SizeSummary {
        &self.summary
    }

    fn from_parts(location: BlockLocation, summary: SizeSummary) -> Self {
        Self { location, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serde::protobuf;

    fn location() -> BlockLocation {
        BlockLocation::new("host-1", 50051, "exec-1")
    }

    #[test]
    fn dense_up_to_threshold() {
        let sizes = vec![100u64; 2000];
        let record = MapOutputRecord::new(location(), &sizes);
        assert!(matches!(record.summary(), SizeSummary::Dense(_)));
    }

    #[test]
    fn sparse_above_threshold() {
        let sizes = vec![100u64; 2001];
        let record = MapOutputRecord::new(location(), &sizes);
        assert!(matches!(record.summary(), SizeSummary::Sparse { .. }));
    }

    #[test]
    fn dense_zero_is_exact() {
        let sizes = vec![0u64, 1500, 0, 7, 0];
        let record = MapOutputRecord::new(location(), &sizes);
        for (i, &raw) in sizes.iter().enumerate() {
            assert_eq!(raw == 0, record.size_for_block(i) == 0, "partition {i}");
        }
    }

    #[test]
    fn sparse_zero_is_exact() {
        let mut sizes = vec![0u64; 3000];
        sizes[17] = 1_000;
        sizes[1034] = 3_000;
        sizes[2999] = 50;
        let record = MapOutputRecord::new(location(), &sizes);
        for (i, &raw) in sizes.iter().enumerate() {
            assert_eq!(raw == 0, record.size_for_block(i) == 0, "partition {i}");
        }
    }

    #[test]
    fn sparse_average_is_positive_and_exactly_the_mean() {
        let mut sizes = vec![0u64; 2500];
        sizes[1] = 10;
        sizes[2] = 11;
        let record = MapOutputRecord::new(location(), &sizes);
        // integer division of (10 + 11) / 2
        assert_eq!(10, record.size_for_block(1));
        assert_eq!(10, record.size_for_block(2));
        assert_eq!(0, record.size_for_block(3));
    }

    #[test]
    fn dense_sizes_are_approximate_within_ten_percent() {
        let sizes = vec![1_000_000u64, 0, 123];
        let record = MapOutputRecord::new(location(), &sizes);
        let estimated = record.size_for_block(0) as f64;
        assert!((estimated - 1_000_000.0).abs() / 1_000_000.0 <= 0.10);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn sparse_out_of_range_panics() {
        let record = MapOutputRecord::new(location(), &vec![1u64; 2500]);
        record.size_for_block(2500);
    }

    #[test]
    #[should_panic]
    fn dense_out_of_range_panics() {
        let record = MapOutputRecord::new(location(), &[1u64, 2]);
        record.size_for_block(2);
    }

    #[test]
    fn proto_round_trip_dense() {
        let record = MapOutputRecord::new(location(), &[0u64, 42, 9_000]);
        let proto: protobuf::MapOutputRecord = (&record).into();
        let decoded: MapOutputRecord = proto.try_into().unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn proto_round_trip_sparse() {
        let mut sizes = vec![0u64; 2100];
        sizes[5] = 77;
        sizes[2099] = 99;
        let record = MapOutputRecord::new(location(), &sizes);
        let proto: protobuf::MapOutputRecord = (&record).into();
        let decoded: MapOutputRecord = proto.try_into().unwrap();
        assert_eq!(record, decoded);
    }
}
