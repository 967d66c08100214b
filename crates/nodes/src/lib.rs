// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Built-in sources and segments.
//!
//! Every node registers itself into the engine's factory slices when this
//! crate is linked, so depending on `chatterflow-nodes` is enough to make
//! the names resolvable through the registry.

pub mod segments;
pub mod sources;
