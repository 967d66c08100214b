// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment truncating a stream after a fixed number of data items.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::context::RuntimeContext;
use chatterflow_engine::error::Error;
use chatterflow_engine::message::{Item, ItemStream};
use chatterflow_engine::registry::{SEGMENT_FACTORIES, SegmentFactory};
use chatterflow_engine::segment::Segment;
use linkme::distributed_slice;
use serde::Deserialize;
use std::sync::Arc;

/// The name of the take segment.
pub const TAKE_SEGMENT_NAME: &str = "take";

#[derive(Debug, Deserialize)]
struct Config {
    n: u64,
}

/// Yields the first `n` data items, then stops pulling from upstream. Works
/// on infinite inputs.
pub struct TakeSegment {
    n: u64,
}

impl TakeSegment {
    /// Creates a take segment from its construction parameters.
    pub fn from_config(config: &NodeConfig) -> Result<Self, Error> {
        let config: Config = config.parse()?;
        Ok(TakeSegment { n: config.n })
    }
}

/// Declares the take segment as a built-in segment factory.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static TAKE_SEGMENT: SegmentFactory = SegmentFactory {
    name: TAKE_SEGMENT_NAME,
    create: |config| Ok(Box::new(TakeSegment::from_config(config)?)),
};

struct TakeStream {
    input: ItemStream,
    remaining: u64,
}

impl Iterator for TakeStream {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.input.next()?;
        if matches!(item, Ok(Item::Data(_))) {
            self.remaining -= 1;
        }
        Some(item)
    }
}

impl Segment for TakeSegment {
    fn transform(&self, input: ItemStream, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        Box::new(TakeStream {
            input,
            remaining: self.n,
        })
    }
}
