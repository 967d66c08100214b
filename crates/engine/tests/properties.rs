// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Engine-level behavior properties: laziness, ordering, the metadata
//! side-channel and fork semantics.

use chatterflow_engine::context::RuntimeContext;
use chatterflow_engine::error::Error;
use chatterflow_engine::fork::{ForkMode, ForkSegment};
use chatterflow_engine::message::{Item, Metadata, Value};
use chatterflow_engine::pipeline::{Pipeline, Stage};
use chatterflow_engine::segment::{FieldFn, FieldFnConfig, FieldValues};
use chatterflow_engine::source::ItemsSource;
use chatterflow_engine::testing::{CountingSource, collect_items};
use std::sync::Arc;
use std::sync::atomic::Ordering;

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

fn scale_stage(by: i64) -> Stage {
    Stage::new(
        "scale",
        Arc::new(FieldFn::new(
            "scale",
            FieldFnConfig::default(),
            move |value| match value.as_i64() {
                Some(n) => Ok(FieldValues::One(Value::from(n * by))),
                None => Err(Error::InvalidConfig {
                    error: "expected an integer".to_owned(),
                }),
            },
        )),
    )
}

fn repeat_stage(times: usize) -> Stage {
    Stage::new(
        "repeat",
        Arc::new(FieldFn::new(
            "repeat",
            FieldFnConfig {
                multi_emit: true,
                ..FieldFnConfig::default()
            },
            move |value| Ok(FieldValues::Many(vec![value; times])),
        )),
    )
}

fn scale_branch(ctx: &Arc<RuntimeContext>, by: i64) -> Pipeline {
    Pipeline::headless(ctx.clone()).pipe(scale_stage(by))
}

#[test]
fn pulling_k_items_pulls_at_most_k_plus_depth_from_the_source() {
    let ctx = Arc::new(RuntimeContext::new());
    let source = CountingSource::new((0..1000).map(|s| Item::data(s.to_string())).collect());
    let counter = source.counter();

    let pipeline = Pipeline::from_source(Arc::new(source), ctx)
        .pipe(upper_stage())
        .pipe(upper_stage());

    let mut stream = pipeline.stream(None, false);
    let k = 5;
    for _ in 0..k {
        assert!(stream.next().is_some());
    }

    let depth = 2;
    assert!(counter.load(Ordering::SeqCst) <= k + depth);
}

#[test]
fn linear_pipeline_preserves_total_order() {
    let ctx = Arc::new(RuntimeContext::new());
    let items: Vec<Item> = (0..20).map(Item::data).collect();
    let pipeline = Pipeline::from_source(Arc::new(ItemsSource::new(items)), ctx)
        .pipe(scale_stage(3));

    let out = collect_items(pipeline.stream(None, false));
    let expected: Vec<Item> = (0..20).map(|n| Item::data(n * 3)).collect();
    assert_eq!(out, expected);
}

#[test]
fn metadata_keeps_its_relative_position_through_two_passthrough_segments() {
    let ctx = Arc::new(RuntimeContext::new());
    let m0 = Metadata::new().with("mark", 0);
    let m1 = Metadata::new().with("mark", 1);
    let source = ItemsSource::new(vec![
        Item::data("d0"),
        Item::meta(m0.clone()),
        Item::data("d1"),
        Item::meta(m1.clone()),
        Item::data("d2"),
    ]);

    let pipeline = Pipeline::from_source(Arc::new(source), ctx)
        .pipe(upper_stage())
        .pipe(upper_stage());

    let out = collect_items(pipeline.stream(None, false));
    assert_eq!(
        out,
        vec![
            Item::data("D0"),
            Item::meta(m0),
            Item::data("D1"),
            Item::meta(m1),
            Item::data("D2"),
        ]
    );
}

#[test]
fn broadcast_fork_interleaves_per_input_item() {
    let ctx = Arc::new(RuntimeContext::new());
    let fork = ForkSegment::new(
        vec![scale_branch(&ctx, 10), scale_branch(&ctx, 100)],
        ForkMode::Broadcast,
    )
    .expect("fork construction");

    let pipeline = Pipeline::from_source(
        Arc::new(ItemsSource::new(vec![Item::data(1), Item::data(2)])),
        ctx,
    )
    .pipe(Stage::new("fork", Arc::new(fork)));

    let out = collect_items(pipeline.stream(None, false));
    assert_eq!(
        out,
        vec![
            Item::data(10),
            Item::data(100),
            Item::data(20),
            Item::data(200),
        ]
    );
}

#[test]
fn round_robin_fork_partitions_by_index() {
    let ctx = Arc::new(RuntimeContext::new());
    let fork = ForkSegment::new(
        vec![scale_branch(&ctx, 1), scale_branch(&ctx, -1)],
        ForkMode::RoundRobin,
    )
    .expect("fork construction");

    let items: Vec<Item> = (1..=5).map(Item::data).collect();
    let pipeline = Pipeline::from_source(Arc::new(ItemsSource::new(items)), ctx)
        .pipe(Stage::new("fork", Arc::new(fork)));

    let out = collect_items(pipeline.stream(None, false));
    // Even input positions flow through branch 0, odd ones through branch 1.
    assert_eq!(
        out,
        vec![
            Item::data(1),
            Item::data(-2),
            Item::data(3),
            Item::data(-4),
            Item::data(5),
        ]
    );
}

#[test]
fn fork_branches_may_emit_multiple_items_in_branch_order() {
    let ctx = Arc::new(RuntimeContext::new());
    let doubling = Pipeline::headless(ctx.clone()).pipe(repeat_stage(2));
    let fork = ForkSegment::new(
        vec![doubling, scale_branch(&ctx, 10)],
        ForkMode::Broadcast,
    )
    .expect("fork construction");

    let pipeline = Pipeline::from_source(
        Arc::new(ItemsSource::new(vec![Item::data(7)])),
        ctx,
    )
    .pipe(Stage::new("fork", Arc::new(fork)));

    let out = collect_items(pipeline.stream(None, false));
    assert_eq!(out, vec![Item::data(7), Item::data(7), Item::data(70)]);
}

#[test]
fn metadata_rides_through_a_fork_in_position() {
    let ctx = Arc::new(RuntimeContext::new());
    let fork = ForkSegment::new(vec![scale_branch(&ctx, 10)], ForkMode::Broadcast)
        .expect("fork construction");

    let mark = Metadata::new().with("end", 1);
    let pipeline = Pipeline::from_source(
        Arc::new(ItemsSource::new(vec![
            Item::data(1),
            Item::meta(mark.clone()),
            Item::data(2),
        ])),
        ctx,
    )
    .pipe(Stage::new("fork", Arc::new(fork)));

    let out = collect_items(pipeline.stream(None, false));
    assert_eq!(
        out,
        vec![Item::data(10), Item::meta(mark), Item::data(20)]
    );
}

#[test]
fn dropping_the_fork_consumer_terminates_all_branches() {
    let ctx = Arc::new(RuntimeContext::new());
    let fork = ForkSegment::new(
        vec![scale_branch(&ctx, 2), scale_branch(&ctx, 3)],
        ForkMode::Broadcast,
    )
    .expect("fork construction");

    let items: Vec<Item> = (0..100).map(Item::data).collect();
    let pipeline = Pipeline::from_source(Arc::new(ItemsSource::new(items)), ctx)
        .pipe(Stage::new("fork", Arc::new(fork)));

    let mut stream = pipeline.stream(None, false);
    assert_eq!(stream.next().map(Result::ok).flatten(), Some(Item::data(0)));
    // Dropping the stream joins every branch worker before returning; a
    // leaked worker would keep the process alive past the harness timeout.
    drop(stream);
}

#[test]
fn fork_surfaces_the_first_branch_error_and_stops() {
    let ctx = Arc::new(RuntimeContext::new());
    let failing = Pipeline::headless(ctx.clone()).pipe(upper_stage());
    let fork = ForkSegment::new(
        vec![scale_branch(&ctx, 2), failing],
        ForkMode::Broadcast,
    )
    .expect("fork construction");

    // Integers make the `upper` branch fail on its first item.
    let pipeline = Pipeline::from_source(
        Arc::new(ItemsSource::new(vec![Item::data(1), Item::data(2)])),
        ctx,
    )
    .pipe(Stage::new("fork", Arc::new(fork)));

    let mut stream = pipeline.stream(None, false);
    assert_eq!(stream.next().map(Result::ok).flatten(), Some(Item::data(2)));
    assert!(matches!(
        stream.next(),
        Some(Err(Error::SegmentFailure { .. }))
    ));
}
