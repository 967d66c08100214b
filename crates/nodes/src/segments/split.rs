// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment splitting a string into several emitted items.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::error::Error;
use chatterflow_engine::message::Value;
use chatterflow_engine::registry::{SEGMENT_FACTORIES, SegmentFactory};
use chatterflow_engine::segment::{FieldFn, FieldFnConfig, FieldValues, Segment};
use linkme::distributed_slice;
use serde::Deserialize;

/// The name of the split segment.
pub const SPLIT_SEGMENT_NAME: &str = "split";

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default = "Config::default_sep")]
    sep: String,
    /// Splitting multi-emits by default; `multi_emit=false` yields one array
    /// item instead.
    #[serde(default = "Config::default_multi_emit")]
    multi_emit: bool,
    #[serde(flatten)]
    field: FieldFnConfig,
}

impl Config {
    fn default_sep() -> String {
        ",".to_owned()
    }

    fn default_multi_emit() -> bool {
        true
    }
}

/// Creates a split segment from its construction parameters.
pub fn from_config(config: &NodeConfig) -> Result<Box<dyn Segment>, Error> {
    let config: Config = config.parse()?;
    let sep = config.sep.clone();
    let mut field = config.field;
    field.multi_emit = config.multi_emit;
    Ok(Box::new(FieldFn::new(
        SPLIT_SEGMENT_NAME,
        field,
        move |value| match value {
            Value::String(s) => Ok(FieldValues::Many(
                s.split(sep.as_str())
                    .map(|part| Value::String(part.to_owned()))
                    .collect(),
            )),
            other => Err(Error::InvalidConfig {
                error: format!("expected a string, got {other}"),
            }),
        },
    )))
}

/// Declares the split segment as a built-in segment factory.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static SPLIT_SEGMENT: SegmentFactory = SegmentFactory {
    name: SPLIT_SEGMENT_NAME,
    create: from_config,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chatterflow_engine::context::RuntimeContext;
    use chatterflow_engine::message::{Item, ItemStream};
    use chatterflow_engine::testing::collect_values;
    use serde_json::json;
    use std::sync::Arc;

    fn split_segment(params: serde_json::Value) -> Box<dyn Segment> {
        match params {
            Value::Object(map) => from_config(&NodeConfig::new(map)).unwrap(),
            _ => panic!("expected an object"),
        }
    }

    fn stream(values: Vec<Value>) -> ItemStream {
        Box::new(values.into_iter().map(|v| Ok(Item::Data(v))))
    }

    #[test]
    fn test_splits_into_separate_items() {
        let ctx = Arc::new(RuntimeContext::new());
        let segment = split_segment(json!({}));
        assert_eq!(
            collect_values(segment.transform(stream(vec![json!("a,b,c")]), &ctx)),
            vec![json!("a"), json!("b"), json!("c")]
        );
    }

    #[test]
    fn test_single_array_mode() {
        let ctx = Arc::new(RuntimeContext::new());
        let segment = split_segment(json!({"sep": " ", "multi_emit": false}));
        assert_eq!(
            collect_values(segment.transform(stream(vec![json!("a b")]), &ctx)),
            vec![json!(["a", "b"])]
        );
    }
}
