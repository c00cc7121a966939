use crate::component::Instance;
use crate::element::{HookError, Props, StateMap};
use crate::error::Phase;
use crate::tree::NodeId;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use std::collections::VecDeque;
use std::future::Future;

/// Completion callback for an update, invoked with the settled instance.
pub type UpdateCallback = Box<dyn FnOnce(&Instance) + Send>;

/// What triggered an update, controlling which pre-commit guards run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCause {
    /// `force_update`: skip the props and should-update guards entirely.
    Forced,
    /// New props arrived from the parent's render.
    PropsChanged,
    /// Queued state is waiting to be merged.
    StateChanged,
}

impl UpdateCause {
    /// Ordered guard pipeline computed from the cause; no fallthrough.
    pub(crate) fn runs_receive_props(self) -> bool {
        self == UpdateCause::PropsChanged
    }

    pub(crate) fn runs_should_update(self) -> bool {
        self != UpdateCause::Forced
    }

    pub(crate) fn merges_queued_state(self) -> bool {
        self == UpdateCause::StateChanged
    }
}

/// A state transition requested by application code.
///
/// Resolution is never eager: the scheduler normalizes recursively until
/// it holds a concrete map, deferring through the work queue where the
/// input is asynchronous.
pub enum StateUpdate {
    /// Shallow-merged over the current state.
    Map(StateMap),
    /// Invoked synchronously with `(current_state, current_props)`; its
    /// result re-enters as a plain map. Failures route to the boundary
    /// dispatcher with phase [`Phase::StateCallback`].
    Updater(Box<dyn FnOnce(&StateMap, &Props) -> Result<StateMap, HookError> + Send>),
    /// Applied once the future resolves, via the work queue. Failures
    /// route to the boundary dispatcher with phase [`Phase::AsyncState`].
    Remote(BoxFuture<'static, Result<StateMap, HookError>>),
}

impl StateUpdate {
    /// A state delta from an updater closure.
    pub fn updater(
        f: impl FnOnce(&StateMap, &Props) -> Result<StateMap, HookError> + Send + 'static,
    ) -> Self {
        StateUpdate::Updater(Box::new(f))
    }

    /// A state delta that arrives asynchronously.
    pub fn remote(future: impl Future<Output = Result<StateMap, HookError>> + Send + 'static) -> Self {
        StateUpdate::Remote(Box::pin(future))
    }
}

impl From<StateMap> for StateUpdate {
    fn from(map: StateMap) -> Self {
        StateUpdate::Map(map)
    }
}

impl From<serde_json::Value> for StateUpdate {
    fn from(value: serde_json::Value) -> Self {
        StateUpdate::Map(crate::element::props(value))
    }
}

/// Deferred work executed by [`Runtime::flush`](crate::Runtime::flush).
pub(crate) enum Task {
    /// Run (or retry) an update pass.
    Update {
        node: NodeId,
        cause: UpdateCause,
        callback: Option<UpdateCallback>,
    },
    /// Re-enter `set_state` with a normalized input.
    SetState {
        node: NodeId,
        update: StateUpdate,
        callback: Option<UpdateCallback>,
    },
    /// A deferred teardown settled; remove the parked subtree.
    FinishUnmount { node: NodeId },
    /// An asynchronous input failed; dispatch to the nearest boundary.
    Fail {
        node: NodeId,
        phase: Phase,
        error: HookError,
    },
}

/// The engine-wide batching primitive: an append-only task queue plus a
/// pool of in-flight futures that resolve into tasks.
///
/// Tasks run after the current synchronous turn, in submission order.
/// Re-entrancy on a single node is resolved by deferral: an update that
/// finds its target busy re-schedules itself rather than nesting.
#[derive(Default)]
pub struct Scheduler {
    queue: VecDeque<Task>,
    pending: FuturesUnordered<BoxFuture<'static, Task>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn schedule(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    pub(crate) fn defer(&mut self, future: BoxFuture<'static, Task>) {
        self.pending.push(future);
    }

    pub(crate) fn take_ready(&mut self) -> Option<Task> {
        self.queue.pop_front()
    }

    pub(crate) fn pending_mut(&mut self) -> &mut FuturesUnordered<BoxFuture<'static, Task>> {
        &mut self.pending
    }

    /// Whether any queued task or unresolved future remains.
    pub fn has_work(&self) -> bool {
        !self.queue.is_empty() || !self.pending.is_empty()
    }
}

/// Handle passed to lifecycle hooks for requesting further updates.
///
/// Requests made through a `Link` are always routed through the work
/// queue, so they run after the in-flight pass completes, never inside
/// it.
pub struct Link<'a> {
    pub(crate) node: NodeId,
    pub(crate) scheduler: &'a mut Scheduler,
}

impl Link<'_> {
    /// The element this hook belongs to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Queue a state transition for this element.
    pub fn set_state(&mut self, update: impl Into<StateUpdate>) {
        self.scheduler.schedule(Task::SetState {
            node: self.node,
            update: update.into(),
            callback: None,
        });
    }

    /// Queue a state transition with a completion callback.
    pub fn set_state_with(
        &mut self,
        update: impl Into<StateUpdate>,
        callback: impl FnOnce(&Instance) + Send + 'static,
    ) {
        self.scheduler.schedule(Task::SetState {
            node: self.node,
            update: update.into(),
            callback: Some(Box::new(callback)),
        });
    }

    /// Queue a re-render that skips the props and should-update guards.
    pub fn force_update(&mut self) {
        self.scheduler.schedule(Task::Update {
            node: self.node,
            cause: UpdateCause::Forced,
            callback: None,
        });
    }
}
