//! Core types for fork/join coordination

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ordered sequence of values a task reported when it completed.
///
/// The coordinator imposes no convention on the contents; callback consumers
/// destructure it however they like (error-first, single payload, empty).
pub type CallbackArgs = Vec<Value>;

/// An observed async call.
///
/// Invoked exactly once, synchronously, during `join`, with the arguments it
/// was registered with plus the [`Completion`] handle injected by the
/// coordinator. The operation must eventually invoke the handle to report
/// completion; returning `Err` here aborts the start loop.
pub type Operation = Box<dyn FnOnce(Vec<Value>, Completion) -> anyhow::Result<()> + Send>;

/// Per-task completion callback, invoked once per completion of its task.
pub type TaskCallback = Box<dyn FnMut(&[Value]) + Send>;

/// One registered operation together with its bound arguments and optional
/// per-task callback.
pub struct Task {
    pub(crate) operation: Operation,
    pub(crate) bound_args: Vec<Value>,
    pub(crate) callback: Option<TaskCallback>,
}

/// Coordinator lifecycle.
///
/// Transitions are one-way: `Pending -> Running` when `join` starts the
/// tasks, `Running -> Done` when the last outstanding task completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum State {
    Pending = 0,
    Running = 1,
    Done = 2,
}

/// Shared lifecycle cell. The collection loop owns the `Running -> Done`
/// transition after the coordinator has handed the run off.
#[derive(Clone, Debug)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(State::Pending as u8)))
    }

    pub(crate) fn load(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            0 => State::Pending,
            1 => State::Running,
            _ => State::Done,
        }
    }

    pub(crate) fn store(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Completion report sent from a task back to the collection loop.
#[derive(Clone, Debug)]
pub(crate) struct CompletionEvent {
    pub(crate) ordinal: usize,
    pub(crate) args: CallbackArgs,
}

/// Handle passed as the trailing argument of every started operation.
///
/// Cloneable and invokable any number of times, from any thread. Each call
/// reports one completion of the owning task; if a task reports more than
/// once, the arguments of the last report overwrite the previous ones in the
/// aggregate.
#[derive(Clone, Debug)]
pub struct Completion {
    ordinal: usize,
    tx: mpsc::UnboundedSender<CompletionEvent>,
}

impl Completion {
    pub(crate) fn new(ordinal: usize, tx: mpsc::UnboundedSender<CompletionEvent>) -> Self {
        Self { ordinal, tx }
    }

    /// Reports the owning task as completed with `args`.
    pub fn complete(&self, args: CallbackArgs) {
        // A closed channel means the join future was dropped; there is
        // nobody left to report to.
        let _ = self.tx.send(CompletionEvent {
            ordinal: self.ordinal,
            args,
        });
    }
}
