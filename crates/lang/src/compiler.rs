// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Lowering of the ChatterLang AST into executable pipelines.
//!
//! Compilation builds one runtime context per script, seeds it with the
//! script's constant declarations and the caller configuration, resolves
//! parameter references, constructs every component through the registry and
//! assembles the pipelines, loops and variable plumbing into a
//! [`CompiledScript`].

use crate::ast::{
    ConstKind, ForkAst, ParamAst, ParamValue, PipelineAst, ScriptAst, SegAst, SourceKind, Stmt,
};
use crate::error::Error;
use crate::parser;
use crate::script::CompiledScript;
use chatterflow_engine::config::NodeConfig;
use chatterflow_engine::context::RuntimeContext;
use chatterflow_engine::fork::{ForkMode, ForkSegment};
use chatterflow_engine::message::Value;
use chatterflow_engine::pipeline::{Pipeline, Script, ScriptStep, Stage};
use chatterflow_engine::registry::Registry;
use chatterflow_engine::source::TextSource;
use chatterflow_engine::vars::{VariableSetSegment, VariableSource};
use std::collections::HashSet;
use std::sync::Arc;

/// Environment variables consulted for `$name` references are prefixed
/// `CHATTERFLOW_`.
pub const CONFIG_ENV_PREFIX: &str = "CHATTERFLOW";

/// Compiles a script against the process-wide registry.
pub fn compile(
    text: &str,
    config: Option<serde_json::Map<String, Value>>,
) -> Result<CompiledScript, Error> {
    compile_with(text, config, Registry::global())
}

/// Compiles a script against an explicit registry. Tests use this with
/// isolated registries.
pub fn compile_with(
    text: &str,
    config: Option<serde_json::Map<String, Value>>,
    registry: &Registry,
) -> Result<CompiledScript, Error> {
    let ast = parser::parse(text)?;
    let compiler = Compiler {
        registry,
        config: config.unwrap_or_default(),
        ctx: Arc::new(RuntimeContext::new()),
    };
    compiler.compile(&ast)
}

struct Compiler<'a> {
    registry: &'a Registry,
    config: serde_json::Map<String, Value>,
    ctx: Arc<RuntimeContext>,
}

impl Compiler<'_> {
    fn compile(&self, ast: &ScriptAst) -> Result<CompiledScript, Error> {
        self.seed_consts(&ast.stmts)?;

        let steps = self.build_steps(&ast.stmts)?;
        tracing::debug!(steps = steps.len(), "compiled script");
        Ok(CompiledScript::new(Script::new(steps, self.ctx.clone())))
    }

    /// Collects every constant declaration (loops included) before any
    /// parameter is resolved, then layers the caller configuration on top
    /// without overriding script constants.
    fn seed_consts(&self, stmts: &[Stmt]) -> Result<(), Error> {
        let mut declared = HashSet::new();
        self.collect_consts(stmts, &mut declared)?;
        self.ctx
            .add_consts(self.config.clone().into_iter(), false);
        Ok(())
    }

    fn collect_consts(
        &self,
        stmts: &[Stmt],
        declared: &mut HashSet<String>,
    ) -> Result<(), Error> {
        for stmt in stmts {
            match stmt {
                Stmt::Const(decl) => {
                    // A `CONST` binding is single-assignment: neither a later
                    // `CONST` nor a later `SET` may touch it. `SET` rebinds
                    // only names it owns itself.
                    match decl.kind {
                        ConstKind::Const => {
                            if !declared.insert(decl.name.clone()) {
                                return Err(Error::ConstRedefined {
                                    name: decl.name.clone(),
                                });
                            }
                        }
                        ConstKind::Set => {
                            if declared.contains(&decl.name) {
                                return Err(Error::ConstRedefined {
                                    name: decl.name.clone(),
                                });
                            }
                        }
                    }
                    self.ctx.add_const(&decl.name, decl.value.clone(), true);
                }
                Stmt::Loop(loop_ast) => self.collect_consts(&loop_ast.body, declared)?,
                Stmt::Pipeline(_) => {}
            }
        }
        Ok(())
    }

    fn build_steps(&self, stmts: &[Stmt]) -> Result<Vec<ScriptStep>, Error> {
        let mut steps = Vec::new();
        for stmt in stmts {
            match stmt {
                Stmt::Const(_) => {}
                Stmt::Pipeline(ast) => {
                    let silent = matches!(ast.segments.last(), Some(SegAst::Var { .. }));
                    let pipeline = self.build_pipeline(ast)?;
                    steps.push(ScriptStep::Pipeline { pipeline, silent });
                }
                Stmt::Loop(loop_ast) => {
                    let body = self.build_steps(&loop_ast.body)?;
                    steps.push(ScriptStep::Loop {
                        times: loop_ast.times,
                        body,
                    });
                }
            }
        }
        Ok(steps)
    }

    fn build_pipeline(&self, ast: &PipelineAst) -> Result<Pipeline, Error> {
        let mut pipeline = match &ast.source {
            Some(source) => match &source.kind {
                SourceKind::Named { name, params } => {
                    let config = self.node_config(params)?;
                    let factory = self.registry.get_source(name)?;
                    let source = (factory.create)(&config)?;
                    Pipeline::from_source(Arc::from(source), self.ctx.clone())
                }
                SourceKind::Var(name) => Pipeline::from_source(
                    Arc::new(VariableSource::new(name.clone())),
                    self.ctx.clone(),
                ),
                SourceKind::Literal(text) => Pipeline::from_source(
                    Arc::new(TextSource::new(text.clone())),
                    self.ctx.clone(),
                ),
            },
            None => Pipeline::headless(self.ctx.clone()),
        };

        for seg in &ast.segments {
            pipeline = pipeline.pipe(self.build_stage(seg)?);
        }
        Ok(pipeline)
    }

    fn build_stage(&self, seg: &SegAst) -> Result<Stage, Error> {
        match seg {
            SegAst::Named(seg_ref) => {
                let config = self.node_config(&seg_ref.params)?;
                let factory = self.registry.get_segment(&seg_ref.name)?;
                let segment = (factory.create)(&config)?;
                let mut stage = Stage::new(seg_ref.name.as_str(), Arc::from(segment));
                if let Some(flag) = config.process_metadata() {
                    stage = stage.with_process_metadata(flag);
                }
                Ok(stage)
            }
            SegAst::Var { name, .. } => Ok(Stage::new(
                format!("@{name}"),
                Arc::new(VariableSetSegment::new(name.clone())),
            )),
            SegAst::Fork(fork) => self.build_fork(fork),
        }
    }

    fn build_fork(&self, fork: &ForkAst) -> Result<Stage, Error> {
        let config = self.node_config(&fork.params)?;
        let mode = match config.get("mode") {
            None => ForkMode::Broadcast,
            Some(Value::String(mode)) => match mode.as_str() {
                "broadcast" => ForkMode::Broadcast,
                "rr" | "round_robin" | "round-robin" => ForkMode::RoundRobin,
                other => {
                    return Err(Error::Engine(
                        chatterflow_engine::error::Error::InvalidConfig {
                            error: format!("unknown fork mode `{other}`"),
                        },
                    ));
                }
            },
            Some(other) => {
                return Err(Error::Engine(
                    chatterflow_engine::error::Error::InvalidConfig {
                        error: format!("fork mode must be a string, got {other}"),
                    },
                ));
            }
        };

        let branches = fork
            .branches
            .iter()
            .map(|branch| self.build_pipeline(branch))
            .collect::<Result<Vec<_>, Error>>()?;
        let segment = ForkSegment::new(branches, mode)?;
        Ok(Stage::new("fork", Arc::new(segment)))
    }

    /// Resolves parameter values: literals stand, bare identifiers take a
    /// bound constant's value (or remain as their own name), `$name`
    /// references follow const store → caller config → environment.
    fn node_config(&self, params: &[ParamAst]) -> Result<NodeConfig, Error> {
        let mut map = serde_json::Map::new();
        for param in params {
            let value = match &param.value {
                ParamValue::Literal(value) => value.clone(),
                ParamValue::Ident(name) => self
                    .ctx
                    .get_const(name)
                    .unwrap_or_else(|| Value::String(name.clone())),
                ParamValue::Deferred(name) => self.resolve_deferred(name)?,
            };
            let _ = map.insert(param.name.clone(), value);
        }
        Ok(NodeConfig::new(map))
    }

    fn resolve_deferred(&self, name: &str) -> Result<Value, Error> {
        if let Some(value) = self.ctx.get_const(name) {
            return Ok(value);
        }
        if let Some(value) = self.config.get(name) {
            return Ok(value.clone());
        }
        if let Ok(value) = std::env::var(format!("{CONFIG_ENV_PREFIX}_{name}")) {
            return Ok(Value::String(value));
        }
        Err(Error::UnresolvedRef {
            name: name.to_owned(),
        })
    }
}
