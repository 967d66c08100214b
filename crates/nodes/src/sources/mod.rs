// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Built-in sources.

pub mod echo;
pub mod range;
