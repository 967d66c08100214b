// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Source emitting a range of integers.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::context::RuntimeContext;
use chatterflow_engine::error::Error;
use chatterflow_engine::message::{Item, ItemStream};
use chatterflow_engine::registry::{SOURCE_FACTORIES, SourceFactory};
use chatterflow_engine::source::Source;
use linkme::distributed_slice;
use serde::Deserialize;
use std::sync::Arc;

/// The name of the range source.
pub const RANGE_SOURCE_NAME: &str = "range";

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    from: i64,
    to: i64,
    #[serde(default = "Config::default_step")]
    step: i64,
}

impl Config {
    fn default_step() -> i64 {
        1
    }
}

/// Emits integers from `from` (default 0) up to but excluding `to`,
/// advancing by `step` (default 1).
pub struct RangeSource {
    config: Config,
}

impl RangeSource {
    /// Creates a range source from its construction parameters.
    pub fn from_config(config: &NodeConfig) -> Result<Self, Error> {
        let config: Config = config.parse()?;
        if config.step == 0 {
            return Err(Error::InvalidConfig {
                error: "range step must not be zero".to_owned(),
            });
        }
        Ok(RangeSource { config })
    }
}

/// Declares the range source as a built-in source factory.
#[allow(unsafe_code)]
#[distributed_slice(SOURCE_FACTORIES)]
pub static RANGE_SOURCE: SourceFactory = SourceFactory {
    name: RANGE_SOURCE_NAME,
    create: |config| Ok(Box::new(RangeSource::from_config(config)?)),
};

struct RangeStream {
    next: i64,
    to: i64,
    step: i64,
}

impl Iterator for RangeStream {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let ascending = self.step > 0;
        if (ascending && self.next >= self.to) || (!ascending && self.next <= self.to) {
            return None;
        }
        let value = self.next;
        self.next += self.step;
        Some(Ok(Item::data(value)))
    }
}

impl Source for RangeSource {
    fn generate(&self, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        Box::new(RangeStream {
            next: self.config.from,
            to: self.config.to,
            step: self.config.step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatterflow_engine::testing::collect_values;
    use serde_json::json;

    fn config(value: serde_json::Value) -> NodeConfig {
        match value {
            serde_json::Value::Object(map) => NodeConfig::new(map),
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_default_from_and_step() {
        let ctx = Arc::new(RuntimeContext::new());
        let source = RangeSource::from_config(&config(json!({"to": 3}))).unwrap();
        assert_eq!(
            collect_values(source.generate(&ctx)),
            vec![json!(0), json!(1), json!(2)]
        );
    }

    #[test]
    fn test_descending_range() {
        let ctx = Arc::new(RuntimeContext::new());
        let source =
            RangeSource::from_config(&config(json!({"from": 3, "to": 0, "step": -1}))).unwrap();
        assert_eq!(
            collect_values(source.generate(&ctx)),
            vec![json!(3), json!(2), json!(1)]
        );
    }

    #[test]
    fn test_zero_step_is_rejected() {
        assert!(matches!(
            RangeSource::from_config(&config(json!({"to": 3, "step": 0}))),
            Err(Error::InvalidConfig { .. })
        ));
    }
}
