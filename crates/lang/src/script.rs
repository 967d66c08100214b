// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! The compiled script surface: direct invocation and callable adapters.

use crate::error::Error;
use chatterflow_engine::context::RuntimeContext;
use chatterflow_engine::message::{Item, ItemStream, Value};
use chatterflow_engine::pipeline::Script;
use std::sync::Arc;

/// A compiled ChatterLang script.
///
/// Invoking the script runs its pipelines strictly in order, sharing one
/// runtime context; the output is the concatenation of every non-silent
/// pipeline's output.
pub struct CompiledScript {
    script: Script,
}

impl CompiledScript {
    pub(crate) fn new(script: Script) -> Self {
        CompiledScript { script }
    }

    /// The script's runtime context.
    #[must_use]
    pub fn context(&self) -> &Arc<RuntimeContext> {
        self.script.context()
    }

    /// Runs the script lazily. `input` feeds the first pipeline when it is
    /// headless.
    pub fn run(&self, input: Option<ItemStream>) -> ItemStream {
        self.script.stream(input)
    }

    /// Runs the script over a list of input values.
    pub fn run_values(&self, values: Vec<Value>) -> ItemStream {
        let input: ItemStream = Box::new(values.into_iter().map(|v| Ok(Item::Data(v))));
        self.script.stream(Some(input))
    }

    /// Wraps the script as a callable with `single_in` / `single_out`
    /// adapters. The callable is terminal: metadata never appears in its
    /// results.
    #[must_use]
    pub fn as_callable(&self, single_in: bool, single_out: bool) -> ScriptFn {
        ScriptFn {
            script: self.script.clone(),
            single_in,
            single_out,
        }
    }
}

/// The input handed to a [`ScriptFn`].
#[derive(Debug, Clone)]
pub enum CallInput {
    /// No input; the script runs from its own sources.
    None,
    /// One value, wrapped as a one-element input sequence (`single_in`).
    Single(Value),
    /// A whole input sequence.
    Many(Vec<Value>),
}

/// The output of a [`ScriptFn`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutput {
    /// The first output, if any (`single_out`).
    Single(Option<Value>),
    /// Every output.
    Many(Vec<Value>),
}

/// A compiled script exposed as a callable function.
pub struct ScriptFn {
    script: Script,
    single_in: bool,
    single_out: bool,
}

impl ScriptFn {
    /// Invokes the script.
    ///
    /// With `single_in` the input must be [`CallInput::Single`] (or `None`);
    /// without it, [`CallInput::Many`] (or `None`). With `single_out` the
    /// first data output is returned and the rest of the script is left
    /// unpulled; otherwise all data outputs are collected.
    pub fn call(&self, input: CallInput) -> Result<CallOutput, Error> {
        let stream = match (self.single_in, input) {
            (_, CallInput::None) => self.script.stream(None),
            (true, CallInput::Single(value)) => {
                let input: ItemStream = Box::new(std::iter::once(Ok(Item::Data(value))));
                self.script.stream(Some(input))
            }
            (false, CallInput::Many(values)) => {
                let input: ItemStream = Box::new(values.into_iter().map(|v| Ok(Item::Data(v))));
                self.script.stream(Some(input))
            }
            (true, CallInput::Many(_)) => {
                return Err(Error::Engine(
                    chatterflow_engine::error::Error::InvalidConfig {
                        error: "callable was built with single_in; pass a single value".to_owned(),
                    },
                ));
            }
            (false, CallInput::Single(_)) => {
                return Err(Error::Engine(
                    chatterflow_engine::error::Error::InvalidConfig {
                        error: "callable expects an input sequence, not a single value".to_owned(),
                    },
                ));
            }
        };

        if self.single_out {
            for result in stream {
                if let Item::Data(value) = result? {
                    return Ok(CallOutput::Single(Some(value)));
                }
            }
            Ok(CallOutput::Single(None))
        } else {
            let mut values = Vec::new();
            for result in stream {
                if let Item::Data(value) = result? {
                    values.push(value);
                }
            }
            Ok(CallOutput::Many(values))
        }
    }
}
