// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! The segment contract and the metadata side-channel.
//!
//! A segment transforms a lazy input sequence into a lazy output sequence.
//! By default segments never see metadata items: when a downstream consumer
//! exists the bypass driver re-merges metadata into the output preserving its
//! position relative to the data that preceded it, and a terminal segment
//! drops metadata instead. A segment opting in via
//! [`Segment::process_metadata`] receives the raw interleaved stream and owns
//! propagation.

use crate::context::RuntimeContext;
use crate::error::Error;
use crate::field::{WHOLE_ITEM, assign, extract};
use crate::message::{Item, ItemStream, Metadata, Value};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// A component that lazily transforms an input item sequence.
///
/// Cardinality may be 1:1, 1:N, N:1 or 1:0, but implementations must honor
/// lazy pull: pulling one output item may pull at most a bounded number of
/// input items. Bulk buffering is permitted only when documented by the
/// implementation.
pub trait Segment: Send + Sync {
    /// Transforms `input` into a new lazy sequence.
    fn transform(&self, input: ItemStream, ctx: &Arc<RuntimeContext>) -> ItemStream;

    /// Whether this segment wants metadata items delivered to
    /// [`Segment::transform`]. Defaults to false: metadata bypasses the
    /// segment under the side-channel contract.
    fn process_metadata(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct BypassState {
    /// Metadata parked while the transform consumes data, tagged with the
    /// input index it occupied.
    pending: VecDeque<(u64, Metadata)>,
    /// Tag of the most recent data item handed to the transform.
    consumed: u64,
}

/// Filters metadata out of the upstream, parking it for the driver.
struct FilteredInput {
    upstream: ItemStream,
    state: Arc<Mutex<BypassState>>,
    next_tag: u64,
}

impl Iterator for FilteredInput {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.upstream.next() {
                None => return None,
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(Item::Meta(meta))) => {
                    let tag = self.next_tag;
                    self.next_tag += 1;
                    self.state.lock().pending.push_back((tag, meta));
                }
                Some(Ok(item)) => {
                    let tag = self.next_tag;
                    self.next_tag += 1;
                    self.state.lock().consumed = tag;
                    return Some(Ok(item));
                }
            }
        }
    }
}

/// Re-merges parked metadata with the transform's output: before each output
/// item, every pending metadata item whose input position precedes the data
/// the transform has consumed is emitted; stream end flushes the rest.
struct BypassDriver {
    output: ItemStream,
    state: Arc<Mutex<BypassState>>,
    ready: VecDeque<Result<Item, Error>>,
    done: bool,
}

impl Iterator for BypassDriver {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }

            match self.output.next() {
                Some(out) => {
                    let mut state = self.state.lock();
                    let consumed = state.consumed;
                    while state
                        .pending
                        .front()
                        .is_some_and(|(tag, _)| *tag < consumed)
                    {
                        if let Some((_, meta)) = state.pending.pop_front() {
                            self.ready.push_back(Ok(Item::Meta(meta)));
                        }
                    }
                    drop(state);
                    self.ready.push_back(out);
                }
                None => {
                    let mut state = self.state.lock();
                    while let Some((_, meta)) = state.pending.pop_front() {
                        self.ready.push_back(Ok(Item::Meta(meta)));
                    }
                    self.done = true;
                }
            }
        }
    }
}

/// Runs `segment.transform` behind the metadata bypass: the transform sees a
/// data-only stream while metadata is re-merged into the output in its
/// original relative position. Strictly streaming; no full-input buffering.
pub fn transform_with_bypass(
    segment: &Arc<dyn Segment>,
    input: ItemStream,
    ctx: &Arc<RuntimeContext>,
) -> ItemStream {
    let state = Arc::new(Mutex::new(BypassState::default()));
    let filtered: ItemStream = Box::new(FilteredInput {
        upstream: input,
        state: state.clone(),
        next_tag: 1,
    });
    let output = segment.transform(filtered, ctx);
    Box::new(BypassDriver {
        output,
        state,
        ready: VecDeque::new(),
        done: false,
    })
}

/// Removes metadata items from a stream. Applied in front of terminal
/// non-metadata-processing segments, where metadata is dropped.
pub fn strip_metadata(input: ItemStream) -> ItemStream {
    Box::new(input.filter(|item| !matches!(item, Ok(Item::Meta(_)))))
}

/// The common parameters of a field segment.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldFnConfig {
    /// Dot path of the input value; `_` (the default) is the whole item.
    #[serde(default = "FieldFnConfig::default_field")]
    pub field: String,
    /// Dot path the result is assigned to; absent replaces the whole item.
    #[serde(default)]
    pub set_as: Option<String>,
    /// When true the wrapped function returns a sequence and each value is
    /// re-merged with a copy of the original item and emitted separately.
    #[serde(default)]
    pub multi_emit: bool,
    /// When true a per-item failure substitutes `default` (or skips the item
    /// when no default is configured) instead of failing the pipeline.
    #[serde(default)]
    pub fail_silently: bool,
    /// Substitute value used by `fail_silently`.
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldFnConfig {
    fn default_field() -> String {
        WHOLE_ITEM.to_owned()
    }
}

impl Default for FieldFnConfig {
    fn default() -> Self {
        FieldFnConfig {
            field: FieldFnConfig::default_field(),
            set_as: None,
            multi_emit: false,
            fail_silently: false,
            default: None,
        }
    }
}

/// The value(s) a field function produced for one input.
pub enum FieldValues {
    /// A single result value.
    One(Value),
    /// A sequence of result values; emitted separately under `multi_emit`.
    Many(Vec<Value>),
}

type FieldFunc = dyn Fn(Value) -> Result<FieldValues, Error> + Send + Sync;

/// Wraps a per-item function into a segment with `field` / `set_as`
/// addressing, `multi_emit` expansion and the `fail_silently` policy.
pub struct FieldFn {
    label: String,
    config: FieldFnConfig,
    func: Arc<FieldFunc>,
}

impl FieldFn {
    /// Creates a field segment named `label` around `func`.
    pub fn new(
        label: impl Into<String>,
        config: FieldFnConfig,
        func: impl Fn(Value) -> Result<FieldValues, Error> + Send + Sync + 'static,
    ) -> Self {
        FieldFn {
            label: label.into(),
            config,
            func: Arc::new(func),
        }
    }

    /// The segment's display label, used in failure reports.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

struct FieldFnStream {
    input: ItemStream,
    label: String,
    config: FieldFnConfig,
    func: Arc<FieldFunc>,
    ready: VecDeque<Result<Item, Error>>,
}

impl FieldFnStream {
    /// Produces the output items for one data item, or `None` when the item
    /// is silently skipped.
    fn apply(&self, original: &Value) -> Result<Option<Vec<Item>>, Error> {
        let outcome = extract(original, &self.config.field)
            .map(Value::clone)
            .and_then(|input_value| (self.func)(input_value));

        let values = match outcome {
            Ok(FieldValues::One(value)) => vec![value],
            Ok(FieldValues::Many(values)) => {
                if self.config.multi_emit {
                    values
                } else {
                    vec![Value::Array(values)]
                }
            }
            Err(_) if self.config.fail_silently => match &self.config.default {
                Some(default) => vec![default.clone()],
                None => return Ok(None),
            },
            Err(Error::FieldMissing { path }) => return Err(Error::FieldMissing { path }),
            Err(e) => {
                return Err(Error::SegmentFailure {
                    segment: self.label.clone(),
                    error: e.to_string(),
                });
            }
        };

        let mut items = Vec::with_capacity(values.len());
        for value in values {
            let item = match &self.config.set_as {
                None => Item::Data(value),
                Some(path) => {
                    let mut merged = original.clone();
                    assign(&mut merged, path, value)?;
                    Item::Data(merged)
                }
            };
            items.push(item);
        }
        Ok(Some(items))
    }
}

impl Iterator for FieldFnStream {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }

            match self.input.next() {
                None => return None,
                Some(Err(e)) => return Some(Err(e)),
                // Metadata reaches this stream only when the segment was
                // opted in; it is forwarded unchanged.
                Some(Ok(Item::Meta(meta))) => return Some(Ok(Item::Meta(meta))),
                Some(Ok(Item::Data(value))) => match self.apply(&value) {
                    Ok(Some(items)) => self.ready.extend(items.into_iter().map(Ok)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }
}

impl Segment for FieldFn {
    fn transform(&self, input: ItemStream, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        Box::new(FieldFnStream {
            input,
            label: self.label.clone(),
            config: self.config.clone(),
            func: self.func.clone(),
            ready: VecDeque::new(),
        })
    }
}
