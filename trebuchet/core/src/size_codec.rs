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

//! Lossy encoding of shuffle partition sizes into single bytes.
//!
//! Map tasks report one size per downstream partition so that reduce tasks
//! can skip fetching empty partitions. Encoding each size as a byte keeps the
//! report small even for wide shuffles; using a base-1.1 logarithm bounds the
//! relative error at roughly 10% over the practical range of partition sizes
//! (up to about 35 GB). Sizes beyond that saturate at byte value 255, an
//! accepted precision loss.

/// Base of the logarithmic quantization.
const LOG_BASE: f64 = 1.1;

/// Compresses a size in bytes into a single byte for network transmission.
///
/// Zero is preserved exactly so that callers can distinguish empty partitions
/// from small ones. The result is monotonic non-decreasing in `size`.
pub fn compress_size(size: u64) -> u8 {
    if size == 0 {
        0
    } else if size <= 1 {
        1
    } else {
        let encoded = ((size as f64).ln() / LOG_BASE.ln()).ceil() as u64;
        encoded.min(255) as u8
    }
}

/// Decompresses a byte produced by [`compress_size`] back into a size.
///
/// The result is within about 10% of the original size for inputs that did
/// not saturate. Zero decodes to zero exactly.
pub fn decompress_size(compressed: u8) -> u64 {
    if compressed == 0 {
        0
    } else {
        LOG_BASE.powi(compressed as i32).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_exact() {
        assert_eq!(0, compress_size(0));
        assert_eq!(0, decompress_size(0));
    }

    #[test]
    fn small_sizes() {
        assert_eq!(1, compress_size(1));
        assert_eq!(1, decompress_size(1));
        assert_eq!(2, decompress_size(compress_size(2)));
    }

    #[test]
    fn round_trip_within_ten_percent() {
        // multiplicative sweep over the documented domain, up to ~35 GB
        let mut size: u64 = 1;
        while size <= 35_000_000_000 {
            let decoded = decompress_size(compress_size(size));
            let error = (decoded as f64 - size as f64).abs() / size as f64;
            assert!(
                error <= 0.10,
                "size {size} decoded to {decoded}, relative error {error}"
            );
            size = size * 21 / 20 + 1;
        }
    }

    #[test]
    fn monotonic() {
        let mut prev = compress_size(0);
        let mut size: u64 = 1;
        while size <= 40_000_000_000 {
            let cur = compress_size(size);
            assert!(
                cur >= prev,
                "compress_size({size}) = {cur} decreased from {prev}"
            );
            prev = cur;
            size = size * 11 / 10 + 1;
        }
    }

    #[test]
    fn saturates_at_255() {
        assert_eq!(255, compress_size(u64::MAX));
        assert_eq!(255, compress_size(40_000_000_000));
    }
}
