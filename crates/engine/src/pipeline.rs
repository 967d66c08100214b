// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Pipelines, scripts and loops.
//!
//! A pipeline is a left-to-right composition of an optional source and a
//! list of segment stages sharing one runtime context. A script is an
//! ordered sequence of pipelines and loops; each pipeline is fully consumed
//! before the next begins, and their outputs concatenate into the script
//! output.

use crate::context::RuntimeContext;
use crate::error::Error;
use crate::message::{Item, ItemStream};
use crate::segment::{Segment, strip_metadata, transform_with_bypass};
use crate::source::Source;
use std::collections::VecDeque;
use std::sync::Arc;

/// One segment stage of a pipeline: the segment plus its effective metadata
/// policy.
#[derive(Clone)]
pub struct Stage {
    label: String,
    segment: Arc<dyn Segment>,
    process_metadata: bool,
}

impl Stage {
    /// Creates a stage, taking the metadata policy from the segment
    /// implementation.
    #[must_use]
    pub fn new(label: impl Into<String>, segment: Arc<dyn Segment>) -> Self {
        let process_metadata = segment.process_metadata();
        Stage {
            label: label.into(),
            segment,
            process_metadata,
        }
    }

    /// Overrides the metadata policy (the `process_metadata` construction
    /// parameter).
    #[must_use]
    pub fn with_process_metadata(mut self, process_metadata: bool) -> Self {
        self.process_metadata = process_metadata;
        self
    }

    /// The stage's display label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn apply(&self, input: ItemStream, ctx: &Arc<RuntimeContext>, has_downstream: bool) -> ItemStream {
        if self.process_metadata {
            self.segment.transform(input, ctx)
        } else if has_downstream {
            transform_with_bypass(&self.segment, input, ctx)
        } else {
            // Terminal stage: metadata is dropped from the output.
            self.segment.transform(strip_metadata(input), ctx)
        }
    }
}

/// An ordered composition of an optional source and segment stages.
///
/// A pipeline with a source behaves as a source; a headless pipeline behaves
/// as a composite segment and receives its input externally.
#[derive(Clone)]
pub struct Pipeline {
    source: Option<Arc<dyn Source>>,
    stages: Vec<Stage>,
    ctx: Arc<RuntimeContext>,
}

impl Pipeline {
    /// Creates a pipeline headed by `source`.
    #[must_use]
    pub fn from_source(source: Arc<dyn Source>, ctx: Arc<RuntimeContext>) -> Self {
        Pipeline {
            source: Some(source),
            stages: Vec::new(),
            ctx,
        }
    }

    /// Creates a headless pipeline.
    #[must_use]
    pub fn headless(ctx: Arc<RuntimeContext>) -> Self {
        Pipeline {
            source: None,
            stages: Vec::new(),
            ctx,
        }
    }

    /// Left-to-right composition: extends the pipeline with one stage. The
    /// pipeline's context propagates to everything downstream of it.
    #[must_use]
    pub fn pipe(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// True when the pipeline is headed by a source.
    #[must_use]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// The runtime context shared by every operation of this pipeline.
    #[must_use]
    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    /// The labels of the pipeline's stages, in order.
    #[must_use]
    pub fn stage_labels(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::label).collect()
    }

    /// Wires the stages into one lazy stream.
    ///
    /// `input` feeds a headless pipeline and is ignored when a source is
    /// present. With `terminal` true the last stage has no downstream
    /// consumer and non-metadata-processing stages there drop metadata.
    pub fn stream(&self, input: Option<ItemStream>, terminal: bool) -> ItemStream {
        let mut stream = match &self.source {
            Some(source) => source.generate(&self.ctx),
            None => input.unwrap_or_else(|| Box::new(std::iter::empty())),
        };

        let count = self.stages.len();
        for (i, stage) in self.stages.iter().enumerate() {
            let has_downstream = i + 1 < count || !terminal;
            stream = stage.apply(stream, &self.ctx, has_downstream);
        }
        stream
    }
}

impl Segment for Pipeline {
    fn transform(&self, input: ItemStream, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        self.stream(Some(input), false)
    }

    // The composite handles the side-channel stage by stage.
    fn process_metadata(&self) -> bool {
        true
    }
}

impl Source for Pipeline {
    fn generate(&self, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        self.stream(None, false)
    }
}

/// One step of a script.
#[derive(Clone)]
pub enum ScriptStep {
    /// A pipeline. A `silent` pipeline (one ending in a variable-set) is
    /// drained for its side effect and contributes no output.
    Pipeline {
        /// The compiled pipeline.
        pipeline: Pipeline,
        /// Whether the pipeline's output is suppressed.
        silent: bool,
    },
    /// A loop: the body executes `times` times sequentially.
    Loop {
        /// Number of sequential iterations.
        times: u64,
        /// The loop body.
        body: Vec<ScriptStep>,
    },
}

/// An ordered sequence of pipelines and loops over one runtime context.
#[derive(Clone)]
pub struct Script {
    steps: Vec<ScriptStep>,
    ctx: Arc<RuntimeContext>,
}

impl Script {
    /// Creates a script from its steps.
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>, ctx: Arc<RuntimeContext>) -> Self {
        Script { steps, ctx }
    }

    /// The script's runtime context.
    #[must_use]
    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    /// Executes the script lazily. `input` feeds the first pipeline when it
    /// is headless; every later headless pipeline sees an empty input.
    ///
    /// Pipelines run strictly one after another. A pipeline error ends that
    /// pipeline and surfaces in the stream; pulling past it continues with
    /// the next pipeline.
    pub fn stream(&self, input: Option<ItemStream>) -> ItemStream {
        let mut pending = VecDeque::new();
        flatten(&self.steps, &mut pending);
        Box::new(ScriptStream {
            pending,
            current: None,
            input,
            first: true,
        })
    }
}

fn flatten(steps: &[ScriptStep], out: &mut VecDeque<(Pipeline, bool)>) {
    for step in steps {
        match step {
            ScriptStep::Pipeline { pipeline, silent } => out.push_back((pipeline.clone(), *silent)),
            ScriptStep::Loop { times, body } => {
                for _ in 0..*times {
                    flatten(body, out);
                }
            }
        }
    }
}

struct ScriptStream {
    pending: VecDeque<(Pipeline, bool)>,
    current: Option<ItemStream>,
    input: Option<ItemStream>,
    first: bool,
}

impl Iterator for ScriptStream {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(Ok(item)) => return Some(Ok(item)),
                    Some(Err(e)) => {
                        // The error terminates this pipeline; the caller
                        // decides whether to keep iterating the script.
                        self.current = None;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }

            let (pipeline, silent) = self.pending.pop_front()?;
            let feed = if self.first && !pipeline.has_source() {
                self.input.take()
            } else {
                None
            };
            self.first = false;

            if silent {
                for result in pipeline.stream(feed, true) {
                    if let Err(e) = result {
                        return Some(Err(e));
                    }
                }
            } else {
                self.current = Some(pipeline.stream(feed, false));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Metadata, Value};
    use crate::segment::{FieldFn, FieldFnConfig, FieldValues};
    use crate::source::ItemsSource;
    use crate::vars::{VariableSetSegment, VariableSource};

    fn upper_stage() -> Stage {
        Stage::new(
            "upper",
            Arc::new(FieldFn::new(
                "upper",
                FieldFnConfig::default(),
                |value| match value {
                    Value::String(s) => Ok(FieldValues::One(Value::String(s.to_uppercase()))),
                    _ => Err(Error::InvalidConfig {
                        error: "expected a string".to_owned(),
                    }),
                },
            )),
        )
    }

    fn collect(stream: ItemStream) -> Vec<Item> {
        stream.map(Result::unwrap).collect()
    }

    #[test]
    fn test_sourced_pipeline() {
        let ctx = Arc::new(RuntimeContext::new());
        let pipeline = Pipeline::from_source(
            Arc::new(ItemsSource::new(vec![Item::data("a"), Item::data("b")])),
            ctx,
        )
        .pipe(upper_stage());

        assert!(pipeline.has_source());
        assert_eq!(
            collect(pipeline.stream(None, false)),
            vec![Item::data("A"), Item::data("B")]
        );
    }

    #[test]
    fn test_headless_pipeline_behaves_as_segment() {
        let ctx = Arc::new(RuntimeContext::new());
        let inner = Pipeline::headless(ctx.clone()).pipe(upper_stage());

        let outer = Pipeline::from_source(
            Arc::new(ItemsSource::new(vec![Item::data("x")])),
            ctx,
        )
        .pipe(Stage::new("inner", Arc::new(inner)));

        assert_eq!(collect(outer.stream(None, false)), vec![Item::data("X")]);
    }

    #[test]
    fn test_terminal_stage_drops_metadata() {
        let ctx = Arc::new(RuntimeContext::new());
        let source = Arc::new(ItemsSource::new(vec![
            Item::data("x"),
            Item::meta(Metadata::new().with("end", 1)),
            Item::data("y"),
        ]));

        let pipeline = Pipeline::from_source(source, ctx).pipe(upper_stage());

        // A downstream consumer exists: metadata passes through in position.
        assert_eq!(
            collect(pipeline.stream(None, false)),
            vec![
                Item::data("X"),
                Item::meta(Metadata::new().with("end", 1)),
                Item::data("Y"),
            ]
        );
        // Terminal configuration: metadata is dropped.
        assert_eq!(
            collect(pipeline.stream(None, true)),
            vec![Item::data("X"), Item::data("Y")]
        );
    }

    #[test]
    fn test_script_concatenates_and_silences_sinks() {
        let ctx = Arc::new(RuntimeContext::new());

        let writer = Pipeline::from_source(
            Arc::new(ItemsSource::new(vec![Item::data("a"), Item::data("b")])),
            ctx.clone(),
        )
        .pipe(Stage::new("@xs", Arc::new(VariableSetSegment::new("xs"))));

        let reader_upper =
            Pipeline::from_source(Arc::new(VariableSource::new("xs")), ctx.clone())
                .pipe(upper_stage());
        let reader_plain =
            Pipeline::from_source(Arc::new(VariableSource::new("xs")), ctx.clone());

        let script = Script::new(
            vec![
                ScriptStep::Pipeline {
                    pipeline: writer,
                    silent: true,
                },
                ScriptStep::Pipeline {
                    pipeline: reader_upper,
                    silent: false,
                },
                ScriptStep::Pipeline {
                    pipeline: reader_plain,
                    silent: false,
                },
            ],
            ctx,
        );

        assert_eq!(
            collect(script.stream(None)),
            vec![
                Item::data("A"),
                Item::data("B"),
                Item::data("a"),
                Item::data("b"),
            ]
        );
    }

    #[test]
    fn test_loop_repeats_body_sequentially() {
        let ctx = Arc::new(RuntimeContext::new());
        ctx.set_var("n", vec![Item::data(1)]);

        let double = Stage::new(
            "double",
            Arc::new(FieldFn::new(
                "double",
                FieldFnConfig::default(),
                |value| match value.as_i64() {
                    Some(n) => Ok(FieldValues::One(Value::from(n * 2))),
                    None => Err(Error::InvalidConfig {
                        error: "expected an integer".to_owned(),
                    }),
                },
            )),
        );

        let body = Pipeline::from_source(Arc::new(VariableSource::new("n")), ctx.clone())
            .pipe(double)
            .pipe(Stage::new("@n", Arc::new(VariableSetSegment::new("n"))));

        let script = Script::new(
            vec![
                ScriptStep::Loop {
                    times: 3,
                    body: vec![ScriptStep::Pipeline {
                        pipeline: body,
                        silent: true,
                    }],
                },
                ScriptStep::Pipeline {
                    pipeline: Pipeline::from_source(
                        Arc::new(VariableSource::new("n")),
                        ctx.clone(),
                    ),
                    silent: false,
                },
            ],
            ctx,
        );

        assert_eq!(collect(script.stream(None)), vec![Item::data(8)]);
    }

    #[test]
    fn test_script_feeds_input_to_first_headless_pipeline() {
        let ctx = Arc::new(RuntimeContext::new());
        let script = Script::new(
            vec![ScriptStep::Pipeline {
                pipeline: Pipeline::headless(ctx.clone()).pipe(upper_stage()),
                silent: false,
            }],
            ctx,
        );

        let input: ItemStream = Box::new(std::iter::once(Ok(Item::data("hi"))));
        assert_eq!(collect(script.stream(Some(input))), vec![Item::data("HI")]);
    }
}
