// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! ChatterLang: a small declarative DSL lowered onto the chatterflow engine.
//!
//! A script is a sequence of pipeline statements, constant declarations and
//! loops:
//!
//! ```text
//! CONST factor = 10;
//! INPUT FROM echo[data="1,2,3"] | cast[to=int] | scale[by=$factor];
//! ```
//!
//! [`compile`] turns script text into a [`CompiledScript`] using the
//! process-wide registry; [`compile_with`] takes an explicit registry.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod parser;
pub mod preprocess;
pub mod script;

pub use compiler::{CONFIG_ENV_PREFIX, compile, compile_with};
pub use error::Error;
pub use script::{CallInput, CallOutput, CompiledScript, ScriptFn};
