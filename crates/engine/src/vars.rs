// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Variable sources and sinks over the runtime context's variable store.

use crate::context::RuntimeContext;
use crate::message::{Item, ItemStream};
use crate::segment::Segment;
use crate::source::Source;
use std::sync::Arc;

/// A source reading a variable's items.
///
/// The stored list is snapshotted when `generate` is called, so a pipeline
/// may rewrite the same variable it reads from.
pub struct VariableSource {
    name: String,
}

impl VariableSource {
    /// Creates a source over the variable `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        VariableSource { name: name.into() }
    }
}

impl Source for VariableSource {
    fn generate(&self, ctx: &Arc<RuntimeContext>) -> ItemStream {
        match ctx.get_var(&self.name) {
            Ok(items) => Box::new(items.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

/// A segment writing the items that flow through it into a variable.
///
/// The slot is cleared when consumption starts and appended to as each item
/// is yielded, so readers observe the value as of the last complete writer.
pub struct VariableSetSegment {
    name: String,
}

impl VariableSetSegment {
    /// Creates a sink into the variable `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        VariableSetSegment { name: name.into() }
    }
}

struct VariableSetStream {
    input: ItemStream,
    name: String,
    ctx: Arc<RuntimeContext>,
    started: bool,
}

impl Iterator for VariableSetStream {
    type Item = Result<Item, crate::error::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.ctx.clear_var(&self.name);
            self.started = true;
        }

        match self.input.next() {
            Some(Ok(item)) => {
                self.ctx.append_var(&self.name, item.clone());
                Some(Ok(item))
            }
            other => other,
        }
    }
}

impl Segment for VariableSetSegment {
    fn transform(&self, input: ItemStream, ctx: &Arc<RuntimeContext>) -> ItemStream {
        Box::new(VariableSetStream {
            input,
            name: self.name.clone(),
            ctx: ctx.clone(),
            started: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_read() {
        let ctx = Arc::new(RuntimeContext::new());
        let sink = VariableSetSegment::new("xs");
        let input: ItemStream = Box::new(vec![Item::data("a"), Item::data("b")].into_iter().map(Ok));

        let passed: Vec<_> = sink.transform(input, &ctx).map(Result::unwrap).collect();
        assert_eq!(passed, vec![Item::data("a"), Item::data("b")]);

        let source = VariableSource::new("xs");
        let read: Vec<_> = source.generate(&ctx).map(Result::unwrap).collect();
        assert_eq!(read, passed);
    }

    #[test]
    fn test_set_replaces_previous_value() {
        let ctx = Arc::new(RuntimeContext::new());
        ctx.set_var("n", vec![Item::data(1), Item::data(2)]);

        let sink = VariableSetSegment::new("n");
        let input: ItemStream = Box::new(std::iter::once(Ok(Item::data(3))));
        let _drained: Vec<_> = sink.transform(input, &ctx).collect();

        assert_eq!(ctx.get_var("n").unwrap(), vec![Item::data(3)]);
    }

    #[test]
    fn test_source_snapshots_before_rewrite() {
        let ctx = Arc::new(RuntimeContext::new());
        ctx.set_var("n", vec![Item::data(2)]);

        // Reading and rewriting the same variable in one pass observes the
        // pre-pipeline snapshot.
        let source = VariableSource::new("n");
        let sink = VariableSetSegment::new("n");
        let doubled = source.generate(&ctx).map(|r| {
            r.map(|item| match item {
                Item::Data(v) => Item::data(v.as_i64().unwrap_or(0) * 2),
                meta => meta,
            })
        });
        let out: Vec<_> = sink
            .transform(Box::new(doubled), &ctx)
            .map(Result::unwrap)
            .collect();

        assert_eq!(out, vec![Item::data(4)]);
        assert_eq!(ctx.get_var("n").unwrap(), vec![Item::data(4)]);
    }

    #[test]
    fn test_unknown_variable_read_fails() {
        let ctx = Arc::new(RuntimeContext::new());
        let mut stream = VariableSource::new("missing").generate(&ctx);
        assert!(matches!(
            stream.next(),
            Some(Err(crate::error::Error::UnknownVariable { .. }))
        ));
    }
}
