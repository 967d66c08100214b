// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Source emitting a delimiter-separated list of string items.

use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::context::RuntimeContext;
use chatterflow_engine::error::Error;
use chatterflow_engine::message::{Item, ItemStream};
use chatterflow_engine::registry::{SOURCE_FACTORIES, SourceFactory};
use chatterflow_engine::source::Source;
use linkme::distributed_slice;
use serde::Deserialize;
use std::sync::Arc;

/// The name of the echo source.
pub const ECHO_SOURCE_NAME: &str = "echo";

#[derive(Debug, Deserialize)]
struct Config {
    data: String,
    #[serde(default = "Config::default_delimiter")]
    delimiter: String,
}

impl Config {
    fn default_delimiter() -> String {
        ",".to_owned()
    }
}

/// Emits the `data` parameter split on `delimiter` (default `,`), one string
/// item per part, in order.
pub struct EchoSource {
    config: Config,
}

impl EchoSource {
    /// Creates an echo source from its construction parameters.
    pub fn from_config(config: &NodeConfig) -> Result<Self, Error> {
        Ok(EchoSource {
            config: config.parse()?,
        })
    }
}

/// Declares the echo source as a built-in source factory.
#[allow(unsafe_code)]
#[distributed_slice(SOURCE_FACTORIES)]
pub static ECHO_SOURCE: SourceFactory = SourceFactory {
    name: ECHO_SOURCE_NAME,
    create: |config| Ok(Box::new(EchoSource::from_config(config)?)),
};

impl Source for EchoSource {
    fn generate(&self, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        if self.config.data.is_empty() {
            return Box::new(std::iter::empty());
        }
        let parts: Vec<Item> = self
            .config
            .data
            .split(self.config.delimiter.as_str())
            .map(|part| Item::data(part.to_owned()))
            .collect();
        Box::new(parts.into_iter().map(Ok))
    }
}
