// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment multiplying numeric items by a constant factor.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::error::Error;
use chatterflow_engine::message::Value;
use chatterflow_engine::registry::{SEGMENT_FACTORIES, SegmentFactory};
use chatterflow_engine::segment::{FieldFn, FieldFnConfig, FieldValues, Segment};
use linkme::distributed_slice;
use serde::Deserialize;

/// The name of the scale segment.
pub const SCALE_SEGMENT_NAME: &str = "scale";

#[derive(Debug, Deserialize)]
struct Config {
    by: serde_json::Number,
    #[serde(flatten)]
    field: FieldFnConfig,
}

fn scale_value(by: &serde_json::Number, value: &Value) -> Result<Value, Error> {
    let Value::Number(n) = value else {
        return Err(Error::InvalidConfig {
            error: format!("cannot scale non-numeric value {value}"),
        });
    };

    // Integer inputs with an integer factor stay integers.
    if let (Some(a), Some(b)) = (n.as_i64(), by.as_i64()) {
        if let Some(product) = a.checked_mul(b) {
            return Ok(Value::from(product));
        }
    }

    match (n.as_f64(), by.as_f64()) {
        (Some(a), Some(b)) => serde_json::Number::from_f64(a * b)
            .map(Value::Number)
            .ok_or_else(|| Error::InvalidConfig {
                error: "scale product is not a representable number".to_owned(),
            }),
        _ => Err(Error::InvalidConfig {
            error: format!("cannot scale non-numeric value {value}"),
        }),
    }
}

/// Creates a scale segment from its construction parameters.
pub fn from_config(config: &NodeConfig) -> Result<Box<dyn Segment>, Error> {
    let config: Config = config.parse()?;
    let by = config.by.clone();
    Ok(Box::new(FieldFn::new(
        SCALE_SEGMENT_NAME,
        config.field,
        move |value| scale_value(&by, &value).map(FieldValues::One),
    )))
}

/// Declares the scale segment as a built-in segment factory.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static SCALE_SEGMENT: SegmentFactory = SegmentFactory {
    name: SCALE_SEGMENT_NAME,
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

    fn scale_segment(params: serde_json::Value) -> Box<dyn Segment> {
        match params {
            Value::Object(map) => from_config(&NodeConfig::new(map)).unwrap(),
            _ => panic!("expected an object"),
        }
    }

    fn stream(values: Vec<Value>) -> ItemStream {
        Box::new(values.into_iter().map(|v| Ok(Item::Data(v))))
    }

    #[test]
    fn test_integer_scaling_stays_integer() {
        let ctx = Arc::new(RuntimeContext::new());
        let segment = scale_segment(json!({"by": 10}));
        assert_eq!(
            collect_values(segment.transform(stream(vec![json!(1), json!(2)]), &ctx)),
            vec![json!(10), json!(20)]
        );
    }

    #[test]
    fn test_float_factor() {
        let ctx = Arc::new(RuntimeContext::new());
        let segment = scale_segment(json!({"by": 0.5}));
        assert_eq!(
            collect_values(segment.transform(stream(vec![json!(4)]), &ctx)),
            vec![json!(2.0)]
        );
    }

    #[test]
    fn test_non_numeric_input_fails() {
        let ctx = Arc::new(RuntimeContext::new());
        let segment = scale_segment(json!({"by": 2}));
        let mut out = segment.transform(stream(vec![json!("x")]), &ctx);
        assert!(matches!(
            out.next(),
            Some(Err(Error::SegmentFailure { .. }))
        ));
    }
}
