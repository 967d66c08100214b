// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Construction-time configuration handed to component factories.

use crate::error::Error;
use crate::message::Value;
use serde::de::DeserializeOwned;

/// Reserved parameter name opting a segment into metadata delivery.
pub const PROCESS_METADATA_PARAM: &str = "process_metadata";

/// The named parameters a component is constructed with.
///
/// Factories typically deserialize the parameter map into their own `Config`
/// struct via [`NodeConfig::parse`].
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    params: serde_json::Map<String, Value>,
    process_metadata: Option<bool>,
}

impl NodeConfig {
    /// Creates a config from a parameter map. The reserved
    /// `process_metadata` parameter is split off and exposed through
    /// [`NodeConfig::process_metadata`].
    #[must_use]
    pub fn new(mut params: serde_json::Map<String, Value>) -> Self {
        let process_metadata = params
            .remove(PROCESS_METADATA_PARAM)
            .and_then(|v| v.as_bool());
        NodeConfig {
            params,
            process_metadata,
        }
    }

    /// Creates an empty config.
    #[must_use]
    pub fn empty() -> Self {
        NodeConfig::default()
    }

    /// Returns one parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Returns the raw parameter map.
    #[must_use]
    pub fn params(&self) -> &serde_json::Map<String, Value> {
        &self.params
    }

    /// The caller's explicit metadata opt-in, when present. `None` defers to
    /// the segment implementation's default.
    #[must_use]
    pub fn process_metadata(&self) -> Option<bool> {
        self.process_metadata
    }

    /// Deserializes the parameter map into a typed config struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|e| {
            Error::InvalidConfig {
                error: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        data: String,
        #[serde(default)]
        count: u32,
    }

    fn params(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_parse_typed_config() {
        let config = NodeConfig::new(params(json!({"data": "a,b"})));
        let sample: Sample = config.parse().unwrap();
        assert_eq!(sample.data, "a,b");
        assert_eq!(sample.count, 0);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let config = NodeConfig::new(params(json!({"data": 5})));
        assert!(matches!(
            config.parse::<Sample>(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_process_metadata_is_reserved() {
        let config = NodeConfig::new(params(json!({"data": "x", "process_metadata": true})));
        assert_eq!(config.process_metadata(), Some(true));
        assert!(config.get(PROCESS_METADATA_PARAM).is_none());
    }
}
