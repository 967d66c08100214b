// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! The ChatterLang abstract syntax tree.

use chatterflow_engine::message::Value;

/// A parsed script: the ordered list of its statements.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptAst {
    /// Top-level statements in source order.
    pub stmts: Vec<Stmt>,
}

/// One top-level (or loop-body) statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A `CONST`/`SET` declaration.
    Const(ConstDecl),
    /// A pipeline statement.
    Pipeline(PipelineAst),
    /// A `LOOP n TIMES { … }` block.
    Loop(LoopAst),
}

/// Which declaration keyword introduced a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstKind {
    /// `CONST`: a single binding, redeclaration is an error.
    Const,
    /// `SET`: may rebind an earlier value.
    Set,
}

/// A constant declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    /// Declaration keyword.
    pub kind: ConstKind,
    /// The constant's name.
    pub name: String,
    /// The literal value.
    pub value: Value,
    /// Source line of the declaration.
    pub line: usize,
}

/// A loop block.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopAst {
    /// Number of sequential iterations.
    pub times: u64,
    /// The loop body.
    pub body: Vec<Stmt>,
    /// Source line of the `LOOP` keyword.
    pub line: usize,
}

/// A pipeline: an optional source clause and a segment chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineAst {
    /// The source, absent for headless pipelines.
    pub source: Option<SourceAst>,
    /// The segment chain, left to right.
    pub segments: Vec<SegAst>,
    /// Source line the pipeline starts on.
    pub line: usize,
}

/// Which keyword introduced the source clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// `INPUT FROM`.
    Input,
    /// `NEW FROM`.
    New,
}

/// A source reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAst {
    /// The introducing keyword.
    pub mode: SourceMode,
    /// What the source resolves to.
    pub kind: SourceKind,
    /// Source line of the clause.
    pub line: usize,
}

/// The kinds of source reference.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// A registered source by name, e.g. `echo[data="a"]`.
    Named {
        /// The registry name.
        name: String,
        /// Construction parameters.
        params: Vec<ParamAst>,
    },
    /// A variable source, e.g. `@xs`.
    Var(String),
    /// A string literal emitting itself as one item.
    Literal(String),
}

/// One operation of a segment chain.
#[derive(Debug, Clone, PartialEq)]
pub enum SegAst {
    /// A registered segment by name.
    Named(SegmentRefAst),
    /// A variable-set segment, e.g. `@xs`.
    Var {
        /// The variable name, without the `@` sigil.
        name: String,
        /// Source line of the reference.
        line: usize,
    },
    /// A fork over parallel branch pipelines.
    Fork(ForkAst),
}

/// A named segment reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRefAst {
    /// The registry name.
    pub name: String,
    /// Construction parameters.
    pub params: Vec<ParamAst>,
    /// Source line of the reference.
    pub line: usize,
}

/// A fork expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ForkAst {
    /// Fork parameters (e.g. `mode`).
    pub params: Vec<ParamAst>,
    /// The branch pipelines.
    pub branches: Vec<PipelineAst>,
    /// Source line of the `fork` keyword.
    pub line: usize,
}

/// One `name=value` construction parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamAst {
    /// The parameter name.
    pub name: String,
    /// The parameter value.
    pub value: ParamValue,
    /// Source line of the parameter.
    pub line: usize,
}

/// A parameter value as written.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A literal (number, bool, string or array).
    Literal(Value),
    /// A bare identifier, resolved against the constant store at compile
    /// time and otherwise kept as a string.
    Ident(String),
    /// A `$name` deferred reference, resolved at compile time against the
    /// constant store, caller configuration and environment in that order.
    Deferred(String),
}
