// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Case-changing string segments.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::error::Error;
use chatterflow_engine::message::Value;
use chatterflow_engine::registry::{SEGMENT_FACTORIES, SegmentFactory};
use chatterflow_engine::segment::{FieldFn, FieldFnConfig, FieldValues, Segment};
use linkme::distributed_slice;

/// The name of the upper-casing segment.
pub const UPPER_SEGMENT_NAME: &str = "upper";

/// Alias for the upper-casing segment.
pub const UPPER_SEGMENT_ALIAS: &str = "uppercase";

/// The name of the lower-casing segment.
pub const LOWER_SEGMENT_NAME: &str = "lower";

fn casing_segment(
    label: &'static str,
    config: &NodeConfig,
    apply: fn(&str) -> String,
) -> Result<Box<dyn Segment>, Error> {
    let field: FieldFnConfig = config.parse()?;
    Ok(Box::new(FieldFn::new(label, field, move |value| {
        match value {
            Value::String(s) => Ok(FieldValues::One(Value::String(apply(&s)))),
            other => Err(Error::InvalidConfig {
                error: format!("expected a string, got {other}"),
            }),
        }
    })))
}

fn create_upper(config: &NodeConfig) -> Result<Box<dyn Segment>, Error> {
    casing_segment(UPPER_SEGMENT_NAME, config, str::to_uppercase)
}

fn create_lower(config: &NodeConfig) -> Result<Box<dyn Segment>, Error> {
    casing_segment(LOWER_SEGMENT_NAME, config, str::to_lowercase)
}

/// Declares the upper segment as a built-in segment factory.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static UPPER_SEGMENT: SegmentFactory = SegmentFactory {
    name: UPPER_SEGMENT_NAME,
    create: create_upper,
};

/// Aliases map a second name onto the same constructor.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static UPPERCASE_SEGMENT: SegmentFactory = SegmentFactory {
    name: UPPER_SEGMENT_ALIAS,
    create: create_upper,
};

/// Declares the lower segment as a built-in segment factory.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static LOWER_SEGMENT: SegmentFactory = SegmentFactory {
    name: LOWER_SEGMENT_NAME,
    create: create_lower,
};
