// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! The source contract: a component that lazily produces a sequence of
//! items.

use crate::context::RuntimeContext;
use crate::message::{Item, ItemStream, Value};
use std::sync::Arc;

/// A component that generates a (possibly infinite) lazy item sequence.
///
/// Every call to [`Source::generate`] starts a fresh traversal. A source is
/// owned by exactly one pipeline at a time.
pub trait Source: Send + Sync {
    /// Produces a new lazy traversal of this source's items.
    fn generate(&self, ctx: &Arc<RuntimeContext>) -> ItemStream;
}

/// A source that emits one fixed value. Backs string-literal sources in the
/// DSL (`INPUT FROM "text"`).
pub struct TextSource {
    value: Value,
}

impl TextSource {
    /// Creates a source emitting `value` once per traversal.
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        TextSource {
            value: value.into(),
        }
    }
}

impl Source for TextSource {
    fn generate(&self, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        Box::new(std::iter::once(Ok(Item::Data(self.value.clone()))))
    }
}

/// A source over a fixed list of items, mainly for embedding and tests.
pub struct ItemsSource {
    items: Vec<Item>,
}

impl ItemsSource {
    /// Creates a source that replays `items` on every traversal.
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        ItemsSource { items }
    }
}

impl Source for ItemsSource {
    fn generate(&self, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        Box::new(self.items.clone().into_iter().map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_traversal_per_generate() {
        let ctx = Arc::new(RuntimeContext::new());
        let source = ItemsSource::new(vec![Item::data(1), Item::data(2)]);

        for _ in 0..2 {
            let items: Vec<_> = source.generate(&ctx).map(Result::unwrap).collect();
            assert_eq!(items, vec![Item::data(1), Item::data(2)]);
        }
    }

    #[test]
    fn test_text_source_single_item() {
        let ctx = Arc::new(RuntimeContext::new());
        let source = TextSource::new("hello");
        let items: Vec<_> = source.generate(&ctx).map(Result::unwrap).collect();
        assert_eq!(items, vec![Item::data("hello")]);
    }
}
