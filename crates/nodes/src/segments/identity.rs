// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment passing items through unchanged.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::context::RuntimeContext;
use chatterflow_engine::error::Error;
use chatterflow_engine::message::ItemStream;
use chatterflow_engine::registry::{SEGMENT_FACTORIES, SegmentFactory};
use chatterflow_engine::segment::Segment;
use linkme::distributed_slice;
use std::sync::Arc;

/// The name of the identity segment.
pub const IDENTITY_SEGMENT_NAME: &str = "identity";

/// Yields its input unchanged.
pub struct IdentitySegment;

impl IdentitySegment {
    /// Creates an identity segment; parameters are accepted and ignored.
    pub fn from_config(_config: &NodeConfig) -> Result<Self, Error> {
        Ok(IdentitySegment)
    }
}

/// Declares the identity segment as a built-in segment factory.
#[allow(unsafe_code)]
#[distributed_slice(SEGMENT_FACTORIES)]
pub static IDENTITY_SEGMENT: SegmentFactory = SegmentFactory {
    name: IDENTITY_SEGMENT_NAME,
    create: |config| Ok(Box::new(IdentitySegment::from_config(config)?)),
};

impl Segment for IdentitySegment {
    fn transform(&self, input: ItemStream, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatterflow_engine::message::Item;
    use chatterflow_engine::testing::collect_items;

    #[test]
    fn test_passthrough() {
        let ctx = Arc::new(RuntimeContext::new());
        let segment = IdentitySegment::from_config(&NodeConfig::empty()).unwrap();
        let input: ItemStream =
            Box::new(vec![Item::data("a"), Item::data(1)].into_iter().map(Ok));
        assert_eq!(
            collect_items(segment.transform(input, &ctx)),
            vec![Item::data("a"), Item::data(1)]
        );
    }
}
