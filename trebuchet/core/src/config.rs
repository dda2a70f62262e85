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

//! Trebuchet configuration

use std::collections::HashMap;
use std::fmt;
use std::result;
use std::sync::LazyLock;

use crate::error::{Result, TrebuchetError};

/// Enable pushing committed shuffle blocks to remote merge servers.
pub const TREBUCHET_PUSH_ENABLED: &str = "trebuchet.shuffle.push.enabled";
/// Upper bound on block uploads in flight for one push job.
pub const TREBUCHET_PUSH_MAX_CONCURRENT_BLOCKS: &str =
    "trebuchet.shuffle.push.max_concurrent_blocks";
/// Blocks larger than this are skipped by the pusher; reduce tasks fetch them
/// directly instead of reading them from the merged output.
pub const TREBUCHET_PUSH_MAX_BLOCK_SIZE_BYTES: &str =
    "trebuchet.shuffle.push.max_block_size_bytes";
/// max message size for gRPC clients
pub const TREBUCHET_GRPC_CLIENT_MAX_MESSAGE_SIZE: &str =
    "trebuchet.grpc_client_max_message_size";
/// Time-to-live for cached merge server connections.
pub const TREBUCHET_MERGE_CLIENT_TTL_SECONDS: &str =
    "trebuchet.merge_client.ttl_seconds";

/// Result type for config value parsing.
pub type ParseResult<T> = result::Result<T, String>;

/// Value types a configuration entry can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Boolean setting, `true`/`false`.
    Boolean,
    /// Small unsigned integer setting.
    UInt16,
    /// Large unsigned integer setting.
    UInt64,
    /// Free-form string setting.
    Utf8,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

static CONFIG_ENTRIES: LazyLock<HashMap<String, ConfigEntry>> = LazyLock::new(|| {
    let entries = vec![
        ConfigEntry::new(
            TREBUCHET_PUSH_ENABLED.to_string(),
            "Push committed shuffle blocks to remote merge servers".to_string(),
            DataType::Boolean,
            Some((false).to_string()),
        ),
        ConfigEntry::new(
            TREBUCHET_PUSH_MAX_CONCURRENT_BLOCKS.to_string(),
            "Maximum number of block uploads in flight for one push job".to_string(),
            DataType::UInt16,
            Some(8.to_string()),
        ),
        ConfigEntry::new(
            TREBUCHET_PUSH_MAX_BLOCK_SIZE_BYTES.to_string(),
            "Blocks larger than this many bytes are not pushed".to_string(),
            DataType::UInt64,
            Some((1024 * 1024).to_string()),
        ),
        ConfigEntry::new(
            TREBUCHET_GRPC_CLIENT_MAX_MESSAGE_SIZE.to_string(),
            "Configuration for max message size in gRPC clients".to_string(),
            DataType::UInt64,
            Some((16 * 1024 * 1024).to_string()),
        ),
        ConfigEntry::new(
            TREBUCHET_MERGE_CLIENT_TTL_SECONDS.to_string(),
            "Seconds a cached merge server connection stays usable".to_string(),
            DataType::UInt64,
            Some(300.to_string()),
        ),
    ];
    entries
        .into_iter()
        .map(|e| (e.name.clone(), e))
        .collect::<HashMap<_, _>>()
});

/// Configuration option meta-data
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    name: String,
    description: String,
    data_type: DataType,
    default_value: Option<String>,
}

impl ConfigEntry {
    fn new(
        name: String,
        description: String,
        data_type: DataType,
        default_value: Option<String>,
    ) -> Self {
        Self {
            name,
            description,
            data_type,
            default_value,
        }
    }

    /// The setting key this entry describes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description of the setting.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Trebuchet configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrebuchetConfig {
    /// Settings stored in map for easy serde
    settings: HashMap<String, String>,
}

impl Default for TrebuchetConfig {
    fn default() -> Self {
        Self::with_settings(HashMap::new()).unwrap()
    }
}

impl TrebuchetConfig {
    /// Create a new configuration based on key-value pairs
    pub fn with_settings(settings: HashMap<String, String>) -> Result<Self> {
        let supported_entries = TrebuchetConfig::valid_entries();
        for (name, entry) in supported_entries {
            if let Some(v) = settings.get(name) {
                // validate that we can parse the user-supplied value
                Self::parse_value(v.as_str(), entry.data_type).map_err(|e| {
                    TrebuchetError::Configuration(format!(
                        "Failed to parse user-supplied value '{v}' for configuration setting '{name}': {e}"
                    ))
                })?;
            } else if let Some(v) = entry.default_value.clone() {
                Self::parse_value(v.as_str(), entry.data_type).map_err(|e| {
                    TrebuchetError::Configuration(format!(
                        "Failed to parse default value '{v}' for configuration setting '{name}': {e}"
                    ))
                })?;
            } else {
                return Err(TrebuchetError::Configuration(format!(
                    "No value specified for mandatory configuration setting '{name}'"
                )));
            }
        }
        for name in settings.keys() {
            if !supported_entries.contains_key(name) {
                return Err(TrebuchetError::Configuration(format!(
                    "Unknown configuration setting '{name}'"
                )));
            }
        }

        Ok(Self { settings })
    }

    /// Validates that `val` parses as the given data type.
    pub fn parse_value(val: &str, data_type: DataType) -> ParseResult<()> {
        match data_type {
            DataType::UInt16 => {
                val.to_string()
                    .parse::<u16>()
                    .map_err(|e| format!("{e:?}"))?;
            }
            DataType::UInt64 => {
                val.to_string()
                    .parse::<u64>()
                    .map_err(|e| format!("{e:?}"))?;
            }
            DataType::Boolean => {
                val.to_string()
                    .parse::<bool>()
                    .map_err(|e| format!("{e:?}"))?;
            }
            DataType::Utf8 => {
                val.to_string();
            }
        }

        Ok(())
    }

    /// All available configuration options
    pub fn valid_entries() -> &'static HashMap<String, ConfigEntry> {
        &CONFIG_ENTRIES
    }

    /// The raw key-value settings backing this configuration.
    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }

    /// Whether committed shuffle blocks are pushed to merge servers.
    pub fn push_enabled(&self) -> bool {
        self.get_bool_setting(TREBUCHET_PUSH_ENABLED)
    }

    /// Upper bound on block uploads in flight for one push job.
    pub fn push_max_concurrent_blocks(&self) -> usize {
        self.get_usize_setting(TREBUCHET_PUSH_MAX_CONCURRENT_BLOCKS)
    }

    /// Blocks larger than this many bytes are not pushed.
    pub fn push_max_block_size_bytes(&self) -> u64 {
        self.get_u64_setting(TREBUCHET_PUSH_MAX_BLOCK_SIZE_BYTES)
    }

    /// Max message size for gRPC clients.
    pub fn grpc_client_max_message_size(&self) -> usize {
        self.get_usize_setting(TREBUCHET_GRPC_CLIENT_MAX_MESSAGE_SIZE)
    }

    /// Seconds a cached merge server connection stays usable.
    pub fn merge_client_ttl_seconds(&self) -> u64 {
        self.get_u64_setting(TREBUCHET_MERGE_CLIENT_TTL_SECONDS)
    }

    fn get_usize_setting(&self, key: &str) -> usize {
        if let Some(v) = self.settings.get(key) {
            // infallible because we validate all configs in the constructor
            v.parse().unwrap()
        } else {
            let entries = Self::valid_entries();
            // infallible because we validate all configs in the constructor
            let v = entries.get(key).unwrap().default_value.as_ref().unwrap();
            v.parse().unwrap()
        }
    }

    fn get_u64_setting(&self, key: &str) -> u64 {
        if let Some(v) = self.settings.get(key) {
            // infallible because we validate all configs in the constructor
            v.parse().unwrap()
        } else {
            let entries = Self::valid_entries();
            // infallible because we validate all configs in the constructor
            let v = entries.get(key).unwrap().default_value.as_ref().unwrap();
            v.parse().unwrap()
        }
    }

    fn get_bool_setting(&self, key: &str) -> bool {
        if let Some(v) = self.settings.get(key) {
            // infallible because we validate all configs in the constructor
            v.parse::<bool>().unwrap()
        } else {
            let entries = Self::valid_entries();
            // infallible because we validate all configs in the constructor
            let v = entries.get(key).unwrap().default_value.as_ref().unwrap();
            v.parse::<bool>().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TrebuchetConfig::default();
        assert!(!config.push_enabled());
        assert_eq!(8, config.push_max_concurrent_blocks());
        assert_eq!(1024 * 1024, config.push_max_block_size_bytes());
        assert_eq!(16 * 1024 * 1024, config.grpc_client_max_message_size());
        assert_eq!(300, config.merge_client_ttl_seconds());
    }

    #[test]
    fn custom_settings() {
        let mut settings = HashMap::new();
        settings.insert(TREBUCHET_PUSH_ENABLED.to_string(), "true".to_string());
        settings.insert(
            TREBUCHET_PUSH_MAX_CONCURRENT_BLOCKS.to_string(),
            "2".to_string(),
        );
        let config = TrebuchetConfig::with_settings(settings).unwrap();
        assert!(config.push_enabled());
        assert_eq!(2, config.push_max_concurrent_blocks());
    }

    #[test]
    fn rejects_bad_value() {
        let mut settings = HashMap::new();
        settings.insert(
            TREBUCHET_PUSH_ENABLED.to_string(),
            "not-a-bool".to_string(),
        );
        assert!(TrebuchetConfig::with_settings(settings).is_err());
    }

    #[test]
    fn rejects_unknown_key() {
        let mut settings = HashMap::new();
        settings.insert("trebuchet.unknown".to_string(), "1".to_string());
        assert!(TrebuchetConfig::with_settings(settings).is_err());
    }
}
