// Copyright The Chatterflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Multiple-producer, single-consumer bounded channel with blocking send and
//! receive.
//!
//! The buffer is a fixed-capacity ring; a full channel applies back-pressure
//! by blocking the sender. Dropping the receiver closes the channel, which
//! unblocks every sender with [`SendError::Closed`]. Dropping the last sender
//! closes the channel for the receiver once the buffer drains.

use crate::error::{RecvError, SendError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

struct ChannelState<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    is_closed: bool,
    senders: usize,
    has_receiver: bool,
}

struct Shared<T> {
    state: Mutex<ChannelState<T>>,
    send_ready: Condvar,
    recv_ready: Condvar,
}

/// A bounded MPSC channel.
pub struct Channel<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Channel<T> {
    /// Creates a new channel with the given capacity (clamped to at least one
    /// slot).
    #[allow(clippy::new_ret_no_self)]
    #[must_use]
    pub fn new(capacity: usize) -> (Sender<T>, Receiver<T>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(ChannelState {
                buffer: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
                is_closed: false,
                senders: 1,
                has_receiver: true,
            }),
            send_ready: Condvar::new(),
            recv_ready: Condvar::new(),
        });

        (
            Sender {
                shared: shared.clone(),
            },
            Receiver { shared },
        )
    }
}

/// A sender for the channel.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// A receiver for the channel.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        {
            let mut state = self.shared.state.lock();
            state.senders += 1;
        }
        Sender {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.senders -= 1;

        if state.senders == 0 {
            state.is_closed = true;
            let _ = self.shared.recv_ready.notify_all();
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.has_receiver = false;
        state.is_closed = true;
        // Unblock every sender waiting on a full buffer.
        let _ = self.shared.send_ready.notify_all();
    }
}

impl<T> Sender<T> {
    /// Attempts to send a value without blocking.
    pub fn try_send(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.shared.state.lock();

        if state.is_closed || !state.has_receiver {
            return Err(SendError::Closed(value));
        }

        if state.buffer.len() >= state.capacity {
            return Err(SendError::Full(value));
        }

        state.buffer.push_back(value);
        let _ = self.shared.recv_ready.notify_one();
        Ok(())
    }

    /// Sends a value, blocking while the buffer is full.
    ///
    /// Returns [`SendError::Closed`] once the receiver is gone or the channel
    /// was closed, which is the cancellation signal for producer loops.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.shared.state.lock();

        loop {
            if state.is_closed || !state.has_receiver {
                return Err(SendError::Closed(value));
            }

            if state.buffer.len() < state.capacity {
                state.buffer.push_back(value);
                let _ = self.shared.recv_ready.notify_one();
                return Ok(());
            }

            self.shared.send_ready.wait(&mut state);
        }
    }

    /// Closes the channel. Buffered items remain receivable.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.is_closed = true;
        let _ = self.shared.recv_ready.notify_all();
        let _ = self.shared.send_ready.notify_all();
    }

    /// Returns true once the channel is closed or the receiver is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let state = self.shared.state.lock();
        state.is_closed || !state.has_receiver
    }
}

impl<T> Receiver<T> {
    /// Attempts to receive a value without blocking.
    pub fn try_recv(&self) -> Result<T, RecvError> {
        let mut state = self.shared.state.lock();

        if let Some(value) = state.buffer.pop_front() {
            let _ = self.shared.send_ready.notify_one();
            Ok(value)
        } else if state.is_closed {
            Err(RecvError::Closed)
        } else {
            Err(RecvError::Empty)
        }
    }

    /// Receives a value, blocking while the channel is empty and open.
    ///
    /// Buffered items are still delivered after close; [`RecvError::Closed`]
    /// is returned only once the channel is closed and drained.
    pub fn recv(&self) -> Result<T, RecvError> {
        let mut state = self.shared.state.lock();

        loop {
            if let Some(value) = state.buffer.pop_front() {
                let _ = self.shared.send_ready.notify_one();
                return Ok(value);
            }

            if state.is_closed {
                return Err(RecvError::Closed);
            }

            self.shared.recv_ready.wait(&mut state);
        }
    }

    /// Closes the channel from the consumer side without dropping the
    /// receiver. Blocked senders observe [`SendError::Closed`].
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.is_closed = true;
        let _ = self.shared.recv_ready.notify_all();
        let _ = self.shared.send_ready.notify_all();
    }
}
