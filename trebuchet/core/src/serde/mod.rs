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

//! This module contains code generated from the Trebuchet Protocol Buffer
//! definition as well as convenience code for interacting with the generated
//! code.

pub mod generated;
pub mod scheduler;

pub use generated::trebuchet as protobuf;

/// Marker opening the push header frame embedded in error messages.
const HEADER_FRAME_PREFIX: &str = "[pushHeader=";

/// Embeds the push routing header into an error message.
///
/// Block uploads run concurrently and their responses arrive out of order, so
/// a merge server failing a block prepends the `(app_id, block_id, map_index)`
/// header to its error text. The pusher recovers the failed block from the
/// message rather than trusting response ordering.
pub fn encode_header_into_error_string(
    app_id: &str,
    block_id: &str,
    map_index: u32,
    cause: &str,
) -> String {
    format!("{HEADER_FRAME_PREFIX}{app_id}/{block_id}/{map_index}] {cause}")
}

/// Recovers the push header from an error message produced by
/// [encode_header_into_error_string], if one is present.
pub fn decode_header_from_error_string(message: &str) -> Option<(String, String, u32)> {
    let rest = message.strip_prefix(HEADER_FRAME_PREFIX)?;
    let end = rest.find(']')?;
    let mut parts = rest[..end].rsplitn(3, '/');
    let map_index = parts.next()?.parse::<u32>().ok()?;
    let block_id = parts.next()?.to_string();
    let app_id = parts.next()?.to_string();
    Some((app_id, block_id, map_index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let message = encode_header_into_error_string(
            "app-1",
            "shuffle_push_3_1_7",
            1,
            "disk full",
        );
        let (app_id, block_id, map_index) =
            decode_header_from_error_string(&message).unwrap();
        assert_eq!("app-1", app_id);
        assert_eq!("shuffle_push_3_1_7", block_id);
        assert_eq!(1, map_index);
        assert!(message.ends_with("disk full"));
    }

    #[test]
    fn decode_rejects_plain_messages() {
        assert!(decode_header_from_error_string("disk full").is_none());
        assert!(decode_header_from_error_string("[pushHeader=broken").is_none());
    }
}
