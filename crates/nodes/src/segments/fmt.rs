// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment rendering items to text through a field spec.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::error::Error;
use chatterflow_engine::field::format_item;
use chatterflow_engine::message::Value;
use chatterflow_engine::registry::{SEGMENT_FACTORIES, SegmentFactory};
use chatterflow_engine::segment::{FieldFn, FieldFnConfig, FieldValues, Segment};
use linkme::distributed_slice;
use serde::Deserialize;

/// The name of the fmt segment.
pub const FMT_SEGMENT_NAME: &str = "fmt";

#[derive(Debug, Deserialize)]
struct Config {
    /// Comma-separated `source:label` pairs; `_` addresses the whole item.
    spec: String,
    #[serde(flatten)]
    field: FieldFnConfig,
}

/// Creates a fmt segment from its construction parameters.
pub fn from_config(config: &NodeConfig) -> Result<Box<dyn Segment>, Error> {
    let config: Config = config.parse()?;
    let spec = config.spec.clone();
    Ok(Box::new(FieldFn::new(
        FMT_SEGMENT_NAME,
        config.field,
        move |value| {
            format_item(&value, &spec).map(|text| FieldValues::One(Value::String(text)))
        },
    )))
}

/// Declares the fmt segment as a built-in segment factory.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static FMT_SEGMENT: SegmentFactory = SegmentFactory {
    name: FMT_SEGMENT_NAME,
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

    #[test]
    fn test_formats_fields() {
        let ctx = Arc::new(RuntimeContext::new());
        let segment = match json!({"spec": "name:who, score:points"}) {
            Value::Object(map) => from_config(&NodeConfig::new(map)).unwrap(),
            _ => panic!("expected an object"),
        };

        let input: ItemStream = Box::new(std::iter::once(Ok(Item::data(
            json!({"name": "ada", "score": 3}),
        ))));
        assert_eq!(
            collect_values(segment.transform(input, &ctx)),
            vec![json!("who: ada points: 3")]
        );
    }

    #[test]
    fn test_missing_source_field_fails() {
        let ctx = Arc::new(RuntimeContext::new());
        let segment = match json!({"spec": "absent:a"}) {
            Value::Object(map) => from_config(&NodeConfig::new(map)).unwrap(),
            _ => panic!("expected an object"),
        };

        let input: ItemStream = Box::new(std::iter::once(Ok(Item::data(json!({})))));
        let mut out = segment.transform(input, &ctx);
        assert!(matches!(
            out.next(),
            Some(Err(Error::FieldMissing { .. }))
        ));
    }
}
