// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment casting item values between primitive types.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::error::Error;
use chatterflow_engine::message::Value;
use chatterflow_engine::registry::{SEGMENT_FACTORIES, SegmentFactory};
use chatterflow_engine::segment::{FieldFn, FieldFnConfig, FieldValues, Segment};
use linkme::distributed_slice;
use serde::Deserialize;

/// The name of the cast segment.
pub const CAST_SEGMENT_NAME: &str = "cast";

/// The target type of a cast.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastTarget {
    /// Cast to a signed integer.
    Int,
    /// Cast to a float.
    Float,
    /// Cast to a string.
    Str,
    /// Cast to a boolean.
    Bool,
}

#[derive(Debug, Deserialize)]
struct Config {
    to: CastTarget,
    #[serde(flatten)]
    field: FieldFnConfig,
}

fn invalid(target: &str, value: &Value) -> Error {
    Error::InvalidConfig {
        error: format!("cannot cast {value} to {target}"),
    }
}

fn cast_value(target: CastTarget, value: Value) -> Result<Value, Error> {
    match target {
        CastTarget::Int => match &value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::from)
                .ok_or_else(|| invalid("int", &value)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid("int", &value)),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            _ => Err(invalid("int", &value)),
        },
        CastTarget::Float => match &value {
            Value::Number(n) => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("float", &value)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("float", &value)),
            Value::Bool(b) => Ok(Value::from(if *b { 1.0 } else { 0.0 })),
            _ => Err(invalid("float", &value)),
        },
        CastTarget::Str => match value {
            Value::String(s) => Ok(Value::String(s)),
            other => Ok(Value::String(other.to_string())),
        },
        CastTarget::Bool => match &value {
            Value::Bool(b) => Ok(Value::from(*b)),
            Value::Number(n) => Ok(Value::from(n.as_f64().is_some_and(|f| f != 0.0))),
            Value::String(s) => match s.trim() {
                "true" => Ok(Value::from(true)),
                "false" => Ok(Value::from(false)),
                _ => Err(invalid("bool", &value)),
            },
            _ => Err(invalid("bool", &value)),
        },
    }
}

/// Creates a cast segment from its construction parameters.
pub fn from_config(config: &NodeConfig) -> Result<Box<dyn Segment>, Error> {
    let config: Config = config.parse()?;
    let target = config.to;
    Ok(Box::new(FieldFn::new(
        CAST_SEGMENT_NAME,
        config.field,
        move |value| cast_value(target, value).map(FieldValues::One),
    )))
}

/// Declares the cast segment as a built-in segment factory.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static CAST_SEGMENT: SegmentFactory = SegmentFactory {
    name: CAST_SEGMENT_NAME,
    create: from_config,
};
