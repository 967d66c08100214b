// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for ChatterLang compilation.

/// All errors that can occur while parsing or compiling a script. Every
/// compile-time error is final; nothing is retried.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The script text does not match the grammar.
    #[error("Parse error at {line}:{col}: {message}")]
    Parse {
        /// 1-based line of the offending token.
        line: usize,
        /// 1-based column of the offending token.
        col: usize,
        /// What the parser expected or found.
        message: String,
    },

    /// A `$name` parameter resolved against neither the constant store, the
    /// caller configuration, nor the environment.
    #[error("Unresolved reference `${name}`")]
    UnresolvedRef {
        /// The reference name, without the `$` sigil.
        name: String,
    },

    /// A `CONST` name was declared twice.
    #[error("Constant `{name}` is declared twice")]
    ConstRedefined {
        /// The redeclared constant name.
        name: String,
    },

    /// An error raised by the engine while constructing components.
    #[error(transparent)]
    Engine(#[from] chatterflow_engine::error::Error),
}
