// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! The fork/join segment: N parallel sub-pipelines over a shared input.
//!
//! Each branch runs on its own worker thread behind bounded channels
//! (capacity one, giving back-pressure). Input items are distributed by
//! broadcast or round-robin; the join emits, per input item, the outputs of
//! branch 0, then branch 1, … preserving in-branch order. Dropping the join
//! closes every channel and joins every worker before returning.

use crate::context::RuntimeContext;
use crate::error::Error;
use crate::message::{Item, ItemStream, Metadata};
use crate::pipeline::Pipeline;
use crate::segment::Segment;
use chatterflow_channel::error::{RecvError, SendError};
use chatterflow_channel::mpsc::{Channel, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

/// How fork input items are distributed across branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForkMode {
    /// Every input item is delivered to every branch (logical copy).
    #[default]
    Broadcast,
    /// Input item `i` is delivered to branch `i mod N` only.
    RoundRobin,
}

/// Per-branch buffer size. One slot is enough for back-pressure while still
/// letting branches overlap on neighboring input items.
const BRANCH_BUFFER: usize = 1;

enum BranchOut {
    Item(Result<Item, Error>),
    /// Terminates one input item's output group.
    End,
}

/// A segment that distributes its input across parallel branch pipelines and
/// joins their outputs in branch order.
pub struct ForkSegment {
    branches: Vec<Pipeline>,
    mode: ForkMode,
}

impl ForkSegment {
    /// Creates a fork over `branches`. At least one branch is required, and
    /// branches must be headless (they receive the fork's input).
    pub fn new(branches: Vec<Pipeline>, mode: ForkMode) -> Result<Self, Error> {
        if branches.is_empty() {
            return Err(Error::InvalidConfig {
                error: "fork requires at least one branch".to_owned(),
            });
        }
        if branches.iter().any(Pipeline::has_source) {
            return Err(Error::InvalidConfig {
                error: "fork branches must not declare their own source".to_owned(),
            });
        }
        Ok(ForkSegment { branches, mode })
    }

    /// The number of branches.
    #[must_use]
    pub fn width(&self) -> usize {
        self.branches.len()
    }
}

impl Segment for ForkSegment {
    fn transform(&self, input: ItemStream, _ctx: &Arc<RuntimeContext>) -> ItemStream {
        match ForkJoin::spawn(self.branches.clone(), self.mode, input) {
            Ok(join) => Box::new(join),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    // The fork dispatches ahead of collection, so it keeps metadata in
    // position itself instead of relying on the generic bypass driver.
    fn process_metadata(&self) -> bool {
        true
    }
}

fn run_branch(branch: Pipeline, in_rx: Receiver<Item>, out_tx: Sender<BranchOut>) {
    while let Ok(item) = in_rx.recv() {
        let single: ItemStream = Box::new(std::iter::once(Ok(item)));
        for result in branch.stream(Some(single), false) {
            if out_tx.send(BranchOut::Item(result)).is_err() {
                return;
            }
        }
        if out_tx.send(BranchOut::End).is_err() {
            return;
        }
    }
}

struct BranchHandle {
    in_tx: Option<Sender<Item>>,
    out_rx: Option<Receiver<BranchOut>>,
    worker: Option<JoinHandle<()>>,
}

struct HeldItem {
    item: Item,
    targets: Vec<usize>,
    sent: usize,
}

enum GroupEntry {
    /// A dispatched input item's target branches, awaiting collection.
    Group(Vec<usize>),
    /// A metadata item holding its position between data groups.
    Meta(Metadata),
}

struct ForkJoin {
    branches: Vec<BranchHandle>,
    input: Option<ItemStream>,
    held: Option<HeldItem>,
    /// Fully dispatched input items (and in-position metadata) awaiting
    /// collection.
    outstanding: VecDeque<GroupEntry>,
    /// The item group currently being collected: its targets and a cursor.
    current: Option<(Vec<usize>, usize)>,
    mode: ForkMode,
    next_index: u64,
    done: bool,
}

impl ForkJoin {
    fn spawn(branches: Vec<Pipeline>, mode: ForkMode, input: ItemStream) -> Result<Self, Error> {
        tracing::debug!(branches = branches.len(), ?mode, "starting fork");

        let mut handles = Vec::with_capacity(branches.len());
        for (i, branch) in branches.into_iter().enumerate() {
            let (in_tx, in_rx) = Channel::new(BRANCH_BUFFER);
            let (out_tx, out_rx) = Channel::new(BRANCH_BUFFER);

            let spawned = std::thread::Builder::new()
                .name(format!("fork-branch-{i}"))
                .spawn(move || run_branch(branch, in_rx, out_tx));

            match spawned {
                Ok(worker) => handles.push(BranchHandle {
                    in_tx: Some(in_tx),
                    out_rx: Some(out_rx),
                    worker: Some(worker),
                }),
                Err(e) => {
                    let mut join = ForkJoin {
                        branches: handles,
                        input: None,
                        held: None,
                        outstanding: VecDeque::new(),
                        current: None,
                        mode,
                        next_index: 0,
                        done: true,
                    };
                    join.abort();
                    return Err(Error::SegmentFailure {
                        segment: "fork".to_owned(),
                        error: format!("failed to spawn branch worker: {e}"),
                    });
                }
            }
        }

        Ok(ForkJoin {
            branches: handles,
            input: Some(input),
            held: None,
            outstanding: VecDeque::new(),
            current: None,
            mode,
            next_index: 0,
            done: false,
        })
    }

    fn targets_for(&mut self) -> Vec<usize> {
        let width = self.branches.len();
        let targets = match self.mode {
            ForkMode::Broadcast => (0..width).collect(),
            ForkMode::RoundRobin => vec![(self.next_index % width as u64) as usize],
        };
        self.next_index += 1;
        targets
    }

    /// Dispatches input items into branch channels without blocking. Stops
    /// at the first full channel; a partially dispatched item is completed
    /// on a later call.
    fn pump(&mut self) -> Result<(), Error> {
        loop {
            if let Some(held) = &mut self.held {
                while held.sent < held.targets.len() {
                    let target = held.targets[held.sent];
                    let Some(in_tx) = self.branches[target].in_tx.as_ref() else {
                        return Err(Error::Cancelled);
                    };
                    match in_tx.try_send(held.item.clone()) {
                        Ok(()) => held.sent += 1,
                        Err(SendError::Full(_)) => return Ok(()),
                        Err(SendError::Closed(_)) => return Err(Error::Cancelled),
                    }
                }
                if let Some(done) = self.held.take() {
                    self.outstanding.push_back(GroupEntry::Group(done.targets));
                }
                continue;
            }

            let Some(input) = self.input.as_mut() else {
                return Ok(());
            };
            match input.next() {
                None => {
                    self.input = None;
                    // End of input: closing the feeds lets idle workers exit
                    // once their outstanding items drain.
                    for branch in &mut self.branches {
                        branch.in_tx = None;
                    }
                    return Ok(());
                }
                Some(Err(e)) => return Err(e),
                // Metadata is never dispatched to a branch; it is queued
                // between data groups so the join emits it in position.
                Some(Ok(Item::Meta(meta))) => {
                    self.outstanding.push_back(GroupEntry::Meta(meta));
                }
                Some(Ok(item)) => {
                    let targets = self.targets_for();
                    self.held = Some(HeldItem {
                        item,
                        targets,
                        sent: 0,
                    });
                }
            }
        }
    }

    /// Closes every channel and joins every worker. Idempotent.
    fn abort(&mut self) {
        for branch in &mut self.branches {
            if let Some(out_rx) = branch.out_rx.take() {
                out_rx.close();
            }
            branch.in_tx = None;
        }
        for branch in &mut self.branches {
            if let Some(worker) = branch.worker.take() {
                let _ = worker.join();
            }
        }
        self.done = true;
    }
}

impl Iterator for ForkJoin {
    type Item = Result<Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some((targets, mut cursor)) = self.current.take() {
                let target = targets[cursor];
                let received = match &self.branches[target].out_rx {
                    Some(out_rx) => out_rx.recv(),
                    None => Err(RecvError::Closed),
                };
                match received {
                    Ok(BranchOut::Item(Ok(item))) => {
                        self.current = Some((targets, cursor));
                        return Some(Ok(item));
                    }
                    Ok(BranchOut::Item(Err(e))) => {
                        // First branch error aborts the whole fork.
                        self.abort();
                        return Some(Err(e));
                    }
                    Ok(BranchOut::End) => {
                        cursor += 1;
                        if cursor < targets.len() {
                            self.current = Some((targets, cursor));
                        }
                        // Keep the branch feeds full between groups.
                        if let Err(e) = self.pump() {
                            self.abort();
                            return Some(Err(e));
                        }
                        continue;
                    }
                    Err(RecvError::Closed | RecvError::Empty) => {
                        // A worker vanished without its end marker.
                        self.abort();
                        return Some(Err(Error::Cancelled));
                    }
                }
            }

            if let Err(e) = self.pump() {
                self.abort();
                return Some(Err(e));
            }

            match self.outstanding.pop_front() {
                Some(GroupEntry::Group(targets)) => {
                    self.current = Some((targets, 0));
                    continue;
                }
                Some(GroupEntry::Meta(meta)) => return Some(Ok(Item::Meta(meta))),
                None => {}
            }

            if let Some(mut held) = self.held.take() {
                // Every dispatched group is collected, so the remaining
                // target slots are free; finish the partial dispatch with
                // blocking sends.
                while held.sent < held.targets.len() {
                    let target = held.targets[held.sent];
                    let delivered = match &self.branches[target].in_tx {
                        Some(in_tx) => in_tx.send(held.item.clone()).is_ok(),
                        None => false,
                    };
                    if !delivered {
                        self.abort();
                        return Some(Err(Error::Cancelled));
                    }
                    held.sent += 1;
                }
                self.outstanding.push_back(GroupEntry::Group(held.targets));
                continue;
            }

            if self.input.is_none() {
                // Everything dispatched and collected.
                self.abort();
                return None;
            }
        }
    }
}

impl Drop for ForkJoin {
    fn drop(&mut self) {
        // Cancellation: terminate all branches before the drop returns.
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Value;
    use crate::pipeline::Stage;
    use crate::segment::{FieldFn, FieldFnConfig, FieldValues};
    use crate::source::ItemsSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scale_branch(ctx: &Arc<RuntimeContext>, by: i64) -> Pipeline {
        Pipeline::headless(ctx.clone()).pipe(Stage::new(
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
        ))
    }

    fn items(values: &[i64]) -> ItemStream {
        let owned: Vec<_> = values.iter().map(|n| Ok(Item::data(*n))).collect();
        Box::new(owned.into_iter())
    }

    #[test]
    fn test_broadcast_groups_per_input_item() {
        let ctx = Arc::new(RuntimeContext::new());
        let fork = ForkSegment::new(
            vec![scale_branch(&ctx, 10), scale_branch(&ctx, 100)],
            ForkMode::Broadcast,
        )
        .unwrap();

        let out: Vec<_> = fork
            .transform(items(&[1, 2]), &ctx)
            .map(Result::unwrap)
            .collect();
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
    fn test_round_robin_alternates_branches() {
        let ctx = Arc::new(RuntimeContext::new());
        let fork = ForkSegment::new(
            vec![scale_branch(&ctx, 10), scale_branch(&ctx, 100)],
            ForkMode::RoundRobin,
        )
        .unwrap();

        let out: Vec<_> = fork
            .transform(items(&[1, 2, 3]), &ctx)
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, vec![Item::data(10), Item::data(200), Item::data(30)]);
    }

    #[test]
    fn test_branch_error_aborts_fork() {
        let ctx = Arc::new(RuntimeContext::new());
        let failing = Pipeline::headless(ctx.clone()).pipe(Stage::new(
            "fail",
            Arc::new(FieldFn::new("fail", FieldFnConfig::default(), |_| {
                Err(Error::InvalidConfig {
                    error: "boom".to_owned(),
                })
            })),
        ));

        let fork = ForkSegment::new(
            vec![scale_branch(&ctx, 10), failing],
            ForkMode::Broadcast,
        )
        .unwrap();

        let mut out = fork.transform(items(&[1, 2]), &ctx);
        assert_eq!(out.next().unwrap().unwrap(), Item::data(10));
        assert!(matches!(
            out.next(),
            Some(Err(Error::SegmentFailure { .. }))
        ));
        assert!(out.next().is_none());
    }

    #[test]
    fn test_dropping_join_terminates_branches() {
        static STARTED: AtomicUsize = AtomicUsize::new(0);

        let ctx = Arc::new(RuntimeContext::new());
        let counting = Pipeline::headless(ctx.clone()).pipe(Stage::new(
            "count",
            Arc::new(FieldFn::new("count", FieldFnConfig::default(), |value| {
                let _ = STARTED.fetch_add(1, Ordering::SeqCst);
                Ok(FieldValues::One(value))
            })),
        ));

        let fork =
            ForkSegment::new(vec![counting.clone(), counting], ForkMode::Broadcast).unwrap();

        let mut out = fork.transform(items(&[1, 2, 3, 4]), &ctx);
        let first = out.next().unwrap().unwrap();
        assert_eq!(first, Item::data(1));
        // Dropping the join joins every worker thread before returning.
        drop(out);
    }

    #[test]
    fn test_fork_rejects_empty_and_sourced_branches() {
        let ctx = Arc::new(RuntimeContext::new());
        assert!(matches!(
            ForkSegment::new(Vec::new(), ForkMode::Broadcast),
            Err(Error::InvalidConfig { .. })
        ));

        let sourced = Pipeline::from_source(
            Arc::new(ItemsSource::new(vec![Item::data(1)])),
            ctx,
        );
        assert!(matches!(
            ForkSegment::new(vec![sourced], ForkMode::Broadcast),
            Err(Error::InvalidConfig { .. })
        ));
    }
}
