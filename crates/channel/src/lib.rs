// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Bounded blocking channels for moving items between fork branch workers.

pub mod error;
pub mod mpsc;
