// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the pipeline engine.
//!
//! Errors travel in-band through item streams, so every variant is cheap to
//! clone and carries only owned, `Send` data.

use std::fmt;

/// The two component roles a registry can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactoryKind {
    /// A component that produces an item stream from nothing.
    Source,
    /// A component that transforms an item stream.
    Segment,
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FactoryKind::Source => "source",
            FactoryKind::Segment => "segment",
        };
        write!(f, "{label}")
    }
}

/// All errors that can occur in the pipeline engine.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A dot path could not be resolved against an item.
    #[error("Field `{path}` is missing")]
    FieldMissing {
        /// The dot path that failed to resolve.
        path: String,
    },

    /// A dot path step landed on a value that cannot hold children.
    #[error("Path `{path}` is not addressable at step `{step}`")]
    PathNotAddressable {
        /// The full dot path being resolved.
        path: String,
        /// The step at which resolution stopped.
        step: String,
    },

    /// No component is registered under the requested name.
    #[error("No {kind} named `{name}` is registered (known: {known:?})")]
    NotFound {
        /// The name that was looked up.
        name: String,
        /// Which registry was consulted.
        kind: FactoryKind,
        /// Every name the registry knows, loaded or not.
        known: Vec<String>,
    },

    /// Two or more providers claim the same component name.
    #[error("Name `{name}` is provided by more than one entry: {providers:?}")]
    NameCollision {
        /// The contested name.
        name: String,
        /// Every provider claiming the name.
        providers: Vec<String>,
    },

    /// A plugin module failed to load; the failure is cached and re-raised
    /// on every later lookup of a name the module provides.
    #[error("Plugin module `{module}` failed to load: {error}")]
    ModuleLoad {
        /// The module that failed.
        module: String,
        /// A description of the failure.
        error: String,
    },

    /// A component rejected its construction parameters.
    #[error("Invalid configuration: {error}")]
    InvalidConfig {
        /// A description of the rejected configuration.
        error: String,
    },

    /// A segment failed while transforming items.
    #[error("Segment `{segment}` failed: {error}")]
    SegmentFailure {
        /// The failing segment's label.
        segment: String,
        /// A description of the failure.
        error: String,
    },

    /// A variable was read before any pipeline wrote it.
    #[error("Variable `@{name}` has not been set")]
    UnknownVariable {
        /// The variable name, without the `@` sigil.
        name: String,
    },

    /// The consumer went away; branches unwind silently.
    #[error("Cancelled")]
    Cancelled,
}
