// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Item definitions for the pipeline engine.
//!
//! An item is either a `Data` item, carrying an arbitrary JSON value, or a
//! `Meta` item, a control signal that travels inline with the data but
//! bypasses transforms unless a segment opts in.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// The payload type for data items. The engine imposes no schema; the
/// convention for higher-level segments is a key-addressable record.
pub type Value = serde_json::Value;

/// A lazily pulled stream of items. Pulling one item from the downstream end
/// pulls at most one item through each upstream stage.
pub type ItemStream = Box<dyn Iterator<Item = Result<Item, Error>> + Send>;

/// An item traversing a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    /// A data item.
    Data(Value),
    /// A metadata item: a control signal riding the data stream.
    Meta(Metadata),
}

/// A metadata item with arbitrary key/value attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    attributes: serde_json::Map<String, Value>,
}

impl Item {
    /// Creates a data item from anything convertible to a [`Value`].
    #[must_use]
    pub fn data(value: impl Into<Value>) -> Self {
        Item::Data(value.into())
    }

    /// Creates a metadata item.
    #[must_use]
    pub fn meta(metadata: Metadata) -> Self {
        Item::Meta(metadata)
    }

    /// Checks if this item is a data item.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Item::Data(_))
    }

    /// Checks if this item is a metadata item.
    #[must_use]
    pub fn is_metadata(&self) -> bool {
        matches!(self, Item::Meta(_))
    }

    /// Returns the data payload, or `None` for metadata items.
    #[must_use]
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Item::Data(value) => Some(value),
            Item::Meta(_) => None,
        }
    }

    /// Consumes the item and returns the data payload, or `None` for
    /// metadata items.
    #[must_use]
    pub fn into_data(self) -> Option<Value> {
        match self {
            Item::Data(value) => Some(value),
            Item::Meta(_) => None,
        }
    }
}

/// Checks if an item is a metadata item.
#[must_use]
pub fn is_metadata(item: &Item) -> bool {
    item.is_metadata()
}

impl Metadata {
    /// Creates an empty metadata item.
    #[must_use]
    pub fn new() -> Self {
        Metadata::default()
    }

    /// Builder-style attribute insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the attribute stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Inserts an attribute, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &serde_json::Map<String, Value> {
        &self.attributes
    }
}
