// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! The ChatterLang parser: pest grammar plus AST lowering.

use crate::ast::{
    ConstDecl, ConstKind, ForkAst, LoopAst, ParamAst, ParamValue, PipelineAst, ScriptAst, SegAst,
    SegmentRefAst, SourceAst, SourceKind, SourceMode, Stmt,
};
use crate::error::Error;
use crate::preprocess::strip_comments;
use chatterflow_engine::message::Value;
use pest::Parser as _;
use pest::error::LineColLocation;
use pest::iterators::Pair;

mod grammar {
    #![allow(missing_docs)]

    use pest_derive::Parser;

    #[derive(Parser)]
    #[grammar = "chatterlang.pest"]
    pub(crate) struct ChatterLangParser;
}

use grammar::{ChatterLangParser, Rule};

/// Parses ChatterLang text into an AST. Comments are stripped first,
/// string-literal-aware.
pub fn parse(text: &str) -> Result<ScriptAst, Error> {
    let prepared = strip_comments(text);
    let mut pairs =
        ChatterLangParser::parse(Rule::script, &prepared).map_err(map_pest_error)?;
    match pairs.next() {
        Some(script) => parse_script(script),
        None => panic!("the script rule always yields one pair"),
    }
}

fn map_pest_error(error: pest::error::Error<Rule>) -> Error {
    let (line, col) = match error.line_col {
        LineColLocation::Pos((line, col)) => (line, col),
        LineColLocation::Span((line, col), _) => (line, col),
    };
    Error::Parse {
        line,
        col,
        message: error.variant.message().into_owned(),
    }
}

fn line_of(pair: &Pair<'_, Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn parse_script(pair: Pair<'_, Rule>) -> Result<ScriptAst, Error> {
    let mut stmts = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::statement => stmts.push(parse_statement(inner)?),
            Rule::EOI => {}
            rule => panic!("Unexpected rule in script: {rule:?}"),
        }
    }
    Ok(ScriptAst { stmts })
}

fn parse_statement(pair: Pair<'_, Rule>) -> Result<Stmt, Error> {
    let inner = first_inner(pair);
    match inner.as_rule() {
        Rule::const_decl => Ok(Stmt::Const(parse_const_decl(inner)?)),
        Rule::loop_block => Ok(Stmt::Loop(parse_loop(inner)?)),
        Rule::pipeline => Ok(Stmt::Pipeline(parse_pipeline(inner)?)),
        Rule::reserved_stmt => {
            let (line, col) = inner.as_span().start_pos().line_col();
            Err(Error::Parse {
                line,
                col,
                message: "TOOL and SERVER declarations belong to the hosting layer".to_owned(),
            })
        }
        rule => panic!("Unexpected rule in statement: {rule:?}"),
    }
}

fn first_inner(pair: Pair<'_, Rule>) -> Pair<'_, Rule> {
    match pair.into_inner().next() {
        Some(inner) => inner,
        None => panic!("expected an inner pair"),
    }
}

fn parse_const_decl(pair: Pair<'_, Rule>) -> Result<ConstDecl, Error> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let kind = match inner.next().map(|kw| kw.as_str().to_owned()) {
        Some(kw) if kw == "CONST" => ConstKind::Const,
        Some(kw) if kw == "SET" => ConstKind::Set,
        other => panic!("Unexpected const keyword: {other:?}"),
    };
    let name = match inner.next() {
        Some(ident) => ident.as_str().to_owned(),
        None => panic!("const_decl always has a name"),
    };
    let value = match inner.next() {
        Some(literal) => parse_literal(literal),
        None => panic!("const_decl always has a value"),
    };
    Ok(ConstDecl {
        kind,
        name,
        value,
        line,
    })
}

fn parse_loop(pair: Pair<'_, Rule>) -> Result<LoopAst, Error> {
    let line = line_of(&pair);
    let mut times = 0;
    let mut body = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_loop | Rule::kw_times => {}
            Rule::integer => {
                let (l, c) = inner.as_span().start_pos().line_col();
                times = inner.as_str().parse::<u64>().map_err(|_| Error::Parse {
                    line: l,
                    col: c,
                    message: "loop count is out of range".to_owned(),
                })?;
            }
            Rule::statement => body.push(parse_statement(inner)?),
            rule => panic!("Unexpected rule in loop: {rule:?}"),
        }
    }
    Ok(LoopAst { times, body, line })
}

fn parse_pipeline(pair: Pair<'_, Rule>) -> Result<PipelineAst, Error> {
    let line = line_of(&pair);
    let mut source = None;
    let mut segments = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::source_clause => source = Some(parse_source_clause(inner)?),
            Rule::seg_chain => {
                for seg in inner.into_inner() {
                    segments.push(parse_seg(seg)?);
                }
            }
            rule => panic!("Unexpected rule in pipeline: {rule:?}"),
        }
    }
    Ok(PipelineAst {
        source,
        segments,
        line,
    })
}

fn parse_source_clause(pair: Pair<'_, Rule>) -> Result<SourceAst, Error> {
    let line = line_of(&pair);
    let mut mode = SourceMode::Input;
    let mut kind = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_input => mode = SourceMode::Input,
            Rule::kw_new => mode = SourceMode::New,
            Rule::kw_from => {}
            Rule::src_ref => kind = Some(parse_src_ref(inner)?),
            rule => panic!("Unexpected rule in source clause: {rule:?}"),
        }
    }
    match kind {
        Some(kind) => Ok(SourceAst { mode, kind, line }),
        None => panic!("source_clause always has a src_ref"),
    }
}

fn parse_src_ref(pair: Pair<'_, Rule>) -> Result<SourceKind, Error> {
    let inner = first_inner(pair);
    match inner.as_rule() {
        Rule::var_ref => Ok(SourceKind::Var(var_name(inner))),
        Rule::string => Ok(SourceKind::Literal(parse_string(inner))),
        Rule::comp_ref => {
            let (name, params) = parse_comp_ref(inner)?;
            Ok(SourceKind::Named { name, params })
        }
        rule => panic!("Unexpected rule in src_ref: {rule:?}"),
    }
}

fn parse_seg(pair: Pair<'_, Rule>) -> Result<SegAst, Error> {
    let inner = first_inner(pair);
    match inner.as_rule() {
        Rule::fork => Ok(SegAst::Fork(parse_fork(inner)?)),
        Rule::var_ref => {
            let line = line_of(&inner);
            Ok(SegAst::Var {
                name: var_name(inner),
                line,
            })
        }
        Rule::comp_ref => {
            let line = line_of(&inner);
            let (name, params) = parse_comp_ref(inner)?;
            Ok(SegAst::Named(SegmentRefAst { name, params, line }))
        }
        rule => panic!("Unexpected rule in seg: {rule:?}"),
    }
}

fn parse_fork(pair: Pair<'_, Rule>) -> Result<ForkAst, Error> {
    let line = line_of(&pair);
    let mut params = Vec::new();
    let mut branches = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_fork => {}
            Rule::params => params = parse_params(inner),
            Rule::pipeline => branches.push(parse_pipeline(inner)?),
            rule => panic!("Unexpected rule in fork: {rule:?}"),
        }
    }
    Ok(ForkAst {
        params,
        branches,
        line,
    })
}

fn parse_comp_ref(pair: Pair<'_, Rule>) -> Result<(String, Vec<ParamAst>), Error> {
    let mut name = String::new();
    let mut params = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_owned(),
            Rule::params => params = parse_params(inner),
            rule => panic!("Unexpected rule in comp_ref: {rule:?}"),
        }
    }
    Ok((name, params))
}

fn parse_params(pair: Pair<'_, Rule>) -> Vec<ParamAst> {
    let mut params = Vec::new();
    for kv in pair.into_inner() {
        let line = line_of(&kv);
        let mut inner = kv.into_inner();
        let name = match inner.next() {
            Some(ident) => ident.as_str().to_owned(),
            None => panic!("kv always has a name"),
        };
        let value = match inner.next() {
            Some(pvalue) => parse_pvalue(pvalue),
            None => panic!("kv always has a value"),
        };
        params.push(ParamAst { name, value, line });
    }
    params
}

fn parse_pvalue(pair: Pair<'_, Rule>) -> ParamValue {
    let inner = first_inner(pair);
    match inner.as_rule() {
        Rule::literal => ParamValue::Literal(parse_literal(inner)),
        Rule::deferred => ParamValue::Deferred(var_name(inner)),
        Rule::ident => ParamValue::Ident(inner.as_str().to_owned()),
        rule => panic!("Unexpected rule in pvalue: {rule:?}"),
    }
}

fn parse_literal(pair: Pair<'_, Rule>) -> Value {
    let inner = first_inner(pair);
    match inner.as_rule() {
        Rule::string => Value::String(parse_string(inner)),
        Rule::boolean => Value::Bool(inner.as_str() == "true"),
        Rule::number => parse_number(inner.as_str()),
        Rule::array => Value::Array(inner.into_inner().map(parse_literal).collect()),
        rule => panic!("Unexpected rule in literal: {rule:?}"),
    }
}

fn parse_number(text: &str) -> Value {
    if let Ok(n) = text.parse::<i64>() {
        return Value::from(n);
    }
    match text.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(n) => Value::Number(n),
        None => panic!("the number rule only matches representable numbers"),
    }
}

/// Extracts the identifier of a sigil-prefixed rule (`@x`, `$x`).
fn var_name(pair: Pair<'_, Rule>) -> String {
    first_inner(pair).as_str().to_owned()
}

fn parse_string(pair: Pair<'_, Rule>) -> String {
    // The inner rule carries the raw text between the quotes; `""` is the
    // escaped quote.
    first_inner(pair).as_str().replace("\"\"", "\"")
}
