//! ForkJoinCoordinator - the heart of callback fork/join
//!
//! The coordinator collects callback-style async calls while `Pending`,
//! starts all of them synchronously on `join`, and resolves the returned
//! future with the registration-ordered sequence of completion arguments
//! once every task has reported in. Completions flow back over a channel,
//! so all bookkeeping happens serially in one collection loop.

use serde_json::Value;
use std::future::Future;
use tokio::sync::mpsc;

use crate::coord::events::{EventKind, HandlerTable};
use crate::coord::types::{
    CallbackArgs, Completion, CompletionEvent, State, StateCell, Task, TaskCallback,
};
use crate::errors::{ForkJoinError, Result};

/// Coordinator for a dynamic set of callback-style async calls.
///
/// The only requirement on an observed call is that it accepts a trailing
/// [`Completion`] handle and eventually invokes it. Start order is strictly
/// registration order; completion order is unconstrained; the aggregate the
/// join future resolves with is always registration-ordered.
///
/// A coordinator can be started exactly once and is inert after its run
/// resolves.
pub struct ForkJoinCoordinator {
    tasks: Vec<Task>,
    handlers: HandlerTable,
    state: StateCell,
}

impl ForkJoinCoordinator {
    /// Create an empty coordinator in the `Pending` state.
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            handlers: HandlerTable::default(),
            state: StateCell::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state.load()
    }

    /// Number of currently registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Set the handler for an event kind, replacing any previous handler.
    pub fn on<H>(&mut self, kind: EventKind, handler: H) -> &mut Self
    where
        H: FnMut(&[Value]) + Send + 'static,
    {
        self.handlers.set(kind, Box::new(handler));
        self
    }

    /// Append a task with no per-task callback.
    ///
    /// `operation` is invoked during `join` with `args` plus the injected
    /// [`Completion`] handle. Fails with `IllegalState` once the coordinator
    /// has left `Pending`.
    pub fn add_task<F>(&mut self, operation: F, args: Vec<Value>) -> Result<&mut Self>
    where
        F: FnOnce(Vec<Value>, Completion) -> anyhow::Result<()> + Send + 'static,
    {
        self.ensure_pending("add_task")?;
        tracing::debug!(ordinal = self.tasks.len(), "task registered");
        self.tasks.push(Task {
            operation: Box::new(operation),
            bound_args: args,
            callback: None,
        });
        Ok(self)
    }

    /// Append a task with a per-task completion callback.
    ///
    /// `callback` is invoked with the completion arguments every time this
    /// task completes, before the [`EventKind::Callback`] handler fires for
    /// the same completion.
    pub fn add_task_with_callback<F, C>(
        &mut self,
        operation: F,
        callback: C,
        args: Vec<Value>,
    ) -> Result<&mut Self>
    where
        F: FnOnce(Vec<Value>, Completion) -> anyhow::Result<()> + Send + 'static,
        C: FnMut(&[Value]) + Send + 'static,
    {
        self.ensure_pending("add_task_with_callback")?;
        tracing::debug!(ordinal = self.tasks.len(), "task registered with callback");
        self.tasks.push(Task {
            operation: Box::new(operation),
            bound_args: args,
            callback: Some(Box::new(callback)),
        });
        Ok(self)
    }

    /// Remove up to `count` tasks starting at `index`, clamped at the end of
    /// the list. Subsequent tasks are renumbered downward. Returns how many
    /// tasks were removed.
    pub fn remove(&mut self, index: usize, count: usize) -> Result<usize> {
        self.ensure_pending("remove")?;
        let start = index.min(self.tasks.len());
        let end = start.saturating_add(count).min(self.tasks.len());
        let removed = end - start;
        self.tasks.drain(start..end);
        if removed > 0 {
            tracing::debug!(index, removed, "tasks removed");
        }
        Ok(removed)
    }

    /// Start every registered task, in registration order, and return the
    /// future that resolves with the aggregate result.
    ///
    /// Entry `i` of the aggregate holds the arguments from task `i`'s last
    /// completion, regardless of the order tasks actually completed in. With
    /// no tasks registered the future resolves immediately with an empty
    /// aggregate.
    ///
    /// Fails with `IllegalState` if the coordinator is not `Pending`, and
    /// with `TaskStart` if an operation errors while being started; tasks
    /// after a failed one are never started and the run can no longer reach
    /// `Done`.
    pub fn join(&mut self) -> Result<impl Future<Output = Vec<CallbackArgs>>> {
        self.ensure_pending("join")?;
        self.state.store(State::Running);

        let tasks = std::mem::take(&mut self.tasks);
        let handlers = std::mem::take(&mut self.handlers);
        let (tx, rx) = mpsc::unbounded_channel();

        let total = tasks.len();
        tracing::debug!(tasks = total, "starting fork/join run");

        let mut run = RunState {
            slots: Vec::with_capacity(total),
            callbacks: Vec::with_capacity(total),
            handlers,
            outstanding: total,
            rx,
            state: self.state.clone(),
        };

        for (ordinal, task) in tasks.into_iter().enumerate() {
            run.slots.push(None);
            run.callbacks.push(task.callback);
            let completion = Completion::new(ordinal, tx.clone());
            tracing::debug!(ordinal, "starting task");
            (task.operation)(task.bound_args, completion)
                .map_err(|source| ForkJoinError::TaskStart {
                    index: ordinal,
                    source,
                })?;
        }

        // Only the Completion handles keep the channel open now; a closed
        // channel in the collection loop means no completion can ever arrive.
        drop(tx);

        Ok(run.collect())
    }

    fn ensure_pending(&self, operation: &'static str) -> Result<()> {
        match self.state.load() {
            State::Pending => Ok(()),
            state => Err(ForkJoinError::IllegalState { operation, state }),
        }
    }
}

impl Default for ForkJoinCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping for one in-flight run, snapshotted from the coordinator at
/// `join` time. Structural changes to the coordinator afterwards cannot
/// desynchronize the ordinals captured by in-flight completions.
struct RunState {
    slots: Vec<Option<CallbackArgs>>,
    callbacks: Vec<Option<TaskCallback>>,
    handlers: HandlerTable,
    outstanding: usize,
    rx: mpsc::UnboundedReceiver<CompletionEvent>,
    state: StateCell,
}

impl RunState {
    /// Drain completion events until every task has completed at least once,
    /// then resolve with the registration-ordered aggregate.
    async fn collect(mut self) -> Vec<CallbackArgs> {
        while self.outstanding > 0 {
            match self.rx.recv().await {
                Some(event) => {
                    self.apply(event);
                    if self.outstanding == 0 {
                        // A repeat completion already queued behind the final
                        // one must still overwrite its slot before resolving.
                        while let Ok(event) = self.rx.try_recv() {
                            self.apply(event);
                        }
                    }
                }
                None => {
                    tracing::warn!(
                        outstanding = self.outstanding,
                        "all completion handles dropped; the aggregate can never resolve"
                    );
                    futures::future::pending::<()>().await;
                }
            }
        }

        self.state.store(State::Done);
        tracing::info!(tasks = self.slots.len(), "fork/join run complete");
        self.slots
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect()
    }

    /// Apply one completion: store the arguments (last completion wins),
    /// settle the outstanding count on the task's first completion, then
    /// notify the per-task callback and the global handler, in that order.
    fn apply(&mut self, event: CompletionEvent) {
        let ordinal = event.ordinal;
        tracing::trace!(ordinal, "completion received");

        let first = self.slots[ordinal].is_none();
        self.slots[ordinal] = Some(event.args);
        if first {
            self.outstanding -= 1;
        }

        let args: &[Value] = self.slots[ordinal].as_deref().unwrap_or(&[]);
        if let Some(callback) = self.callbacks[ordinal].as_mut() {
            callback(args);
        }
        self.handlers.emit(EventKind::Callback, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_operation(_args: Vec<Value>, _completion: Completion) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_new_coordinator_is_pending_and_empty() {
        let coordinator = ForkJoinCoordinator::new();
        assert_eq!(coordinator.state(), State::Pending);
        assert_eq!(coordinator.task_count(), 0);
    }

    #[test]
    fn test_registration_is_chainable() {
        let mut coordinator = ForkJoinCoordinator::new();
        coordinator
            .add_task(noop_operation, vec![json!(1)])
            .and_then(|c| c.add_task(noop_operation, vec![json!(2)]))
            .expect("registration while pending");
        assert_eq!(coordinator.task_count(), 2);
    }

    #[test]
    fn test_remove_clamps_at_list_end() {
        let mut coordinator = ForkJoinCoordinator::new();
        for i in 0..4 {
            coordinator
                .add_task(noop_operation, vec![json!(i)])
                .expect("registration while pending");
        }

        assert_eq!(coordinator.remove(1, 10).expect("pending"), 3);
        assert_eq!(coordinator.task_count(), 1);
        assert_eq!(coordinator.remove(5, 1).expect("pending"), 0);
        assert_eq!(coordinator.task_count(), 1);
    }

    #[tokio::test]
    async fn test_join_transitions_running_then_done() {
        let mut coordinator = ForkJoinCoordinator::new();
        coordinator
            .add_task(
                |args, completion| {
                    completion.complete(args);
                    Ok(())
                },
                vec![json!("payload")],
            )
            .expect("registration while pending");

        let aggregate = coordinator.join().expect("first join");
        assert_eq!(coordinator.state(), State::Running);

        let results = aggregate.await;
        assert_eq!(results, vec![vec![json!("payload")]]);
        assert_eq!(coordinator.state(), State::Done);
    }

    #[tokio::test]
    async fn test_registration_rejected_after_join() {
        let mut coordinator = ForkJoinCoordinator::new();
        let aggregate = coordinator.join().expect("first join");
        aggregate.await;

        let err = coordinator
            .add_task(noop_operation, vec![])
            .err()
            .expect("add_task after join must fail");
        assert!(matches!(
            err,
            ForkJoinError::IllegalState {
                operation: "add_task",
                state: State::Done,
            }
        ));

        let err = coordinator.remove(0, 1).err().expect("remove after join must fail");
        assert!(matches!(err, ForkJoinError::IllegalState { .. }));
    }
}
