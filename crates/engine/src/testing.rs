// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Test helpers shared by the engine's own tests and downstream crates.
//! Gated behind the `test-utils` feature.

use crate::context::RuntimeContext;
use crate::message::{Item, ItemStream, Value};
use crate::source::Source;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A source that counts how many items it has yielded across traversals,
/// for asserting laziness properties.
pub struct CountingSource {
    items: Vec<Item>,
    yielded: Arc<AtomicUsize>,
}

impl CountingSource {
    /// Creates a counting source over `items`.
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        CountingSource {
            items,
            yielded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A handle to the yield counter.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.yielded.clone()
    }
}

impl Source for CountingSource {
    fn generate(&self, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        let counter = self.yielded.clone();
        Box::new(self.items.clone().into_iter().map(move |item| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            Ok(item)
        }))
    }
}

/// Collects a stream, panicking on the first error.
#[must_use]
pub fn collect_items(stream: ItemStream) -> Vec<Item> {
    stream
        .map(|r| r.unwrap_or_else(|e| panic!("stream failed: {e}")))
        .collect()
}

/// Collects the data values of a stream, dropping metadata and panicking on
/// the first error.
#[must_use]
pub fn collect_values(stream: ItemStream) -> Vec<Value> {
    collect_items(stream)
        .into_iter()
        .filter_map(Item::into_data)
        .collect()
}
