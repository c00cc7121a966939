use crate::component::{Catch, FunctionComponent, Instance, NullComponent, StateInit, Teardown};
use crate::element::{shallow_merge, ComponentDef, ComponentView, Context, HookError, Props, View};
use crate::error::{Phase, RuntimeError};
use crate::host::{HostAdapter, HostId};
use crate::reconcile;
use crate::refs::{self, same_ref, Ref, RefPhase};
use crate::schedule::{Link, Scheduler, StateUpdate, Task, UpdateCallback, UpdateCause};
use crate::tree::{Node, NodeId, NodeKind, Tree, WorkState};
use std::collections::HashMap;
use tracing::{debug, trace};

/// The engine context: owns the retained element tree, the root
/// registry, the work queue, and the host adapter.
///
/// There is no ambient global state; every mount, update, and unmount
/// goes through a `Runtime` value, and the registry of mounted roots
/// lives and dies with it.
///
/// # Entry points
///
/// | Operation | Purpose |
/// |-----------|---------|
/// | [`render`](Runtime::render) | Mount a view into a container, or reconcile the root already there |
/// | [`set_state`](Runtime::set_state) | Request a state transition on a component |
/// | [`force_update`](Runtime::force_update) | Re-render a component, skipping the update guards |
/// | [`unmount_root`](Runtime::unmount_root) | Tear down a mounted root |
/// | [`flush`](Runtime::flush) | Drain queued work after the current turn |
/// | [`run_until_settled`](Runtime::run_until_settled) | Drain queued work and all pending async results |
pub struct Runtime {
    pub(crate) tree: Tree,
    pub(crate) scheduler: Scheduler,
    pub(crate) host: Box<dyn HostAdapter>,
    roots: HashMap<HostId, NodeId>,
}

impl Runtime {
    pub fn new(host: impl HostAdapter + 'static) -> Self {
        Self {
            tree: Tree::new(),
            scheduler: Scheduler::new(),
            host: Box::new(host),
            roots: HashMap::new(),
        }
    }

    /// Mount `view` into `container`, or reconcile against the root
    /// already mounted there. Returns the root node.
    pub fn render(
        &mut self,
        view: impl Into<View>,
        container: HostId,
    ) -> Result<NodeId, RuntimeError> {
        let view = view.into().normalize();
        if let Some(&root) = self.roots.get(&container) {
            debug!(container, "reconcile root");
            let root = reconcile::diff(self, root, view)?;
            self.roots.insert(container, root);
            return Ok(root);
        }
        debug!(container, "mount root");
        let root = self.mount_node(view, None, container, Context::new())?;
        self.roots.insert(container, root);
        Ok(root)
    }

    /// Like [`render`](Runtime::render), invoking `callback` with the
    /// root instance once the tree has committed.
    pub fn render_with(
        &mut self,
        view: impl Into<View>,
        container: HostId,
        callback: impl FnOnce(&Instance) + Send + 'static,
    ) -> Result<NodeId, RuntimeError> {
        let root = self.render(view, container)?;
        if let Some(instance) = self.tree.get(root).and_then(|node| node.instance.as_ref()) {
            callback(instance);
        }
        Ok(root)
    }

    /// Tear down the root mounted in `container`. Returns `false` if the
    /// container had none.
    pub fn unmount_root(&mut self, container: HostId) -> Result<bool, RuntimeError> {
        match self.roots.remove(&container) {
            Some(root) => {
                debug!(container, "unmount root");
                self.unmount_node(root, true);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Request a state transition on the component backing `node`.
    ///
    /// Plain maps shallow-merge; updater closures run against the
    /// current state and props; remote futures apply once resolved. A
    /// stale `node` makes this a silent no-op.
    pub fn set_state(
        &mut self,
        node: NodeId,
        update: impl Into<StateUpdate>,
    ) -> Result<(), RuntimeError> {
        self.set_state_inner(node, update.into(), None)
    }

    /// [`set_state`](Runtime::set_state) with a completion callback,
    /// invoked with the instance after the resolved update has applied.
    pub fn set_state_with(
        &mut self,
        node: NodeId,
        update: impl Into<StateUpdate>,
        callback: impl FnOnce(&Instance) + Send + 'static,
    ) -> Result<(), RuntimeError> {
        self.set_state_inner(node, update.into(), Some(Box::new(callback)))
    }

    /// Re-render `node`, skipping the props and should-update guards.
    pub fn force_update(&mut self, node: NodeId) -> Result<(), RuntimeError> {
        self.enqueue_update(node, None, UpdateCause::Forced)
    }

    /// [`force_update`](Runtime::force_update) with a completion callback.
    pub fn force_update_with(
        &mut self,
        node: NodeId,
        callback: impl FnOnce(&Instance) + Send + 'static,
    ) -> Result<(), RuntimeError> {
        self.enqueue_update(node, Some(Box::new(callback)), UpdateCause::Forced)
    }

    /// Drain the work queue in submission order.
    pub fn flush(&mut self) -> Result<(), RuntimeError> {
        while let Some(task) = self.scheduler.take_ready() {
            self.run_task(task)?;
        }
        Ok(())
    }

    /// Drain the work queue and every pending asynchronous result
    /// (deferred state, deferred teardowns) until the engine is idle.
    pub async fn run_until_settled(&mut self) -> Result<(), RuntimeError> {
        use futures::StreamExt;
        loop {
            self.flush()?;
            if self.scheduler.pending_mut().is_empty() {
                return Ok(());
            }
            match self.scheduler.pending_mut().next().await {
                Some(task) => self.scheduler.schedule(task),
                None => return Ok(()),
            }
        }
    }

    /// The instance backing a mounted component node, if any.
    pub fn instance(&self, node: NodeId) -> Option<&Instance> {
        self.tree.get(node)?.instance.as_ref()
    }

    /// Whether `node` still resolves to a mounted element.
    pub fn is_mounted(&self, node: NodeId) -> bool {
        self.tree.contains(node)
    }

    /// Child nodes of a mounted element.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// The root node mounted in `container`, if any.
    pub fn root(&self, container: HostId) -> Option<NodeId> {
        self.roots.get(&container).copied()
    }

    // ---- mounting -------------------------------------------------------

    pub(crate) fn mount_node(
        &mut self,
        view: View,
        parent: Option<NodeId>,
        host_parent: HostId,
        context: Context,
    ) -> Result<NodeId, RuntimeError> {
        match view {
            View::Empty => {
                let mut node = Node::new(NodeKind::Empty, context, host_parent);
                node.parent = parent;
                node.work = WorkState::Idle;
                Ok(self.tree.insert(node))
            }
            View::Text(text) => {
                let handle = self.host.create_text(&text);
                self.host.append(host_parent, handle);
                let mut node = Node::new(NodeKind::Text(text), context, host_parent);
                node.parent = parent;
                node.host = Some(handle);
                node.work = WorkState::Idle;
                Ok(self.tree.insert(node))
            }
            View::Host(view) => {
                let handle = self.host.create_element(&view.tag, &view.props);
                self.host.append(host_parent, handle);
                let mut node = Node::new(NodeKind::Host { tag: view.tag }, context.clone(), host_parent);
                node.parent = parent;
                node.props = view.props;
                node.node_ref = view.node_ref;
                node.host = Some(handle);
                node.work = WorkState::Idle;
                let id = self.tree.insert(node);
                for child in view.children {
                    match self.mount_node(child.normalize(), Some(id), handle, context.clone()) {
                        Ok(child) => {
                            if let Some(node) = self.tree.get_mut(id) {
                                node.children.push(child);
                            }
                        }
                        Err(error) => {
                            self.abort_mount(id);
                            return Err(error);
                        }
                    }
                }
                self.commit_node_ref(id, RefPhase::Mount);
                Ok(id)
            }
            View::Fragment(children) => {
                let mut node = Node::new(NodeKind::Fragment, context.clone(), host_parent);
                node.parent = parent;
                node.work = WorkState::Idle;
                let id = self.tree.insert(node);
                for child in children {
                    match self.mount_node(child.normalize(), Some(id), host_parent, context.clone())
                    {
                        Ok(child) => {
                            if let Some(node) = self.tree.get_mut(id) {
                                node.children.push(child);
                            }
                        }
                        Err(error) => {
                            self.abort_mount(id);
                            return Err(error);
                        }
                    }
                }
                Ok(id)
            }
            View::Component(view) => self.component_mount(view, parent, host_parent, context),
        }
    }

    /// Mount a component element: construct (or synthesize) the
    /// instance, resolve initial state and child context, render, and
    /// mount the produced subtree.
    fn component_mount(
        &mut self,
        view: ComponentView,
        parent: Option<NodeId>,
        host_parent: HostId,
        context: Context,
    ) -> Result<NodeId, RuntimeError> {
        let ComponentView {
            def,
            props,
            node_ref,
        } = view;
        trace!(component = def.name(), "mount");

        let mut node = Node::new(NodeKind::Component(def.clone()), context.clone(), host_parent);
        node.parent = parent;
        node.props = props.clone();
        node.node_ref = node_ref;
        let id = self.tree.insert(node);

        // Construct. A failed constructor routes to the nearest boundary;
        // when one recovers, a no-op instance lets the mount proceed and
        // the recovery view stands in for the subtree.
        let mut constructor_recovery = None;
        let component = match &def {
            ComponentDef::Stateful(factory) => match factory.create(&props, &context) {
                Ok(component) => component,
                Err(error) => match self.dispatch(id, error, Phase::Constructor, true) {
                    Ok(recovered) => {
                        constructor_recovery = Some(recovered);
                        Box::new(NullComponent)
                    }
                    Err(uncaught) => {
                        self.abort_mount(id);
                        return Err(uncaught);
                    }
                },
            },
            ComponentDef::Function(render) => Box::new(FunctionComponent(render.clone())),
        };

        let mut instance = Instance::new(component, props, context);

        // Initial state; an asynchronous result becomes a deferred
        // set_state and the mount proceeds with the default state.
        match instance.component.initial_state(&instance.props) {
            StateInit::State(map) => instance.state = map,
            StateInit::Deferred(future) => {
                trace!(component = def.name(), "initial state deferred");
                self.scheduler.defer(Box::pin(async move {
                    match future.await {
                        Ok(map) => Task::SetState {
                            node: id,
                            update: StateUpdate::Map(map),
                            callback: None,
                        },
                        Err(error) => Task::Fail {
                            node: id,
                            phase: Phase::AsyncState,
                            error,
                        },
                    }
                }));
            }
            StateInit::Unset | StateInit::Legacy(_) => {}
        }

        // Child context is merged into this element's context so
        // descendants inherit it.
        if let Some(extra) =
            instance
                .component
                .child_context(&instance.props, &instance.state, &instance.context)
        {
            shallow_merge(&mut instance.context, extra);
        }

        let rendered = match constructor_recovery {
            Some(view) => view,
            None => {
                match instance
                    .component
                    .render(&instance.props, &instance.state, &instance.context)
                {
                    Ok(view) => view,
                    Err(error) => match self.dispatch(id, error, Phase::Render, true) {
                        Ok(view) => view,
                        Err(uncaught) => {
                            self.abort_mount(id);
                            return Err(uncaught);
                        }
                    },
                }
            }
        };

        let child_context = instance.context.clone();
        if let Some(node) = self.tree.get_mut(id) {
            node.context = child_context.clone();
            node.instance = Some(instance);
        }

        match self.mount_node(rendered.normalize(), Some(id), host_parent, child_context) {
            Ok(child) => {
                if let Some(node) = self.tree.get_mut(id) {
                    node.children.push(child);
                    node.work = WorkState::Idle;
                }
            }
            Err(error) => {
                self.abort_mount(id);
                return Err(error);
            }
        }
        self.commit_node_ref(id, RefPhase::Mount);
        Ok(id)
    }

    /// Unwind a node that failed mid-mount: the failing child already
    /// cleaned itself up, so only this node's committed pieces remain.
    /// Its ref was never assigned and must not be cleared as if it had
    /// been.
    fn abort_mount(&mut self, id: NodeId) {
        if let Some(node) = self.tree.get_mut(id) {
            node.node_ref = None;
        }
        self.finish_unmount(id);
    }

    fn commit_node_ref(&mut self, id: NodeId, phase: RefPhase) {
        let node_ref = self.tree.get(id).and_then(|node| node.node_ref.clone());
        if node_ref.is_some() {
            refs::commit_ref(&mut self.tree, id, None, node_ref.as_ref(), phase);
        }
    }

    // ---- updating -------------------------------------------------------

    /// One full update pass over a component element.
    ///
    /// `next` carries the incoming props and ref when the pass was
    /// triggered by the parent's render; `None` reuses the committed
    /// props (state-driven and forced updates).
    pub(crate) fn component_update(
        &mut self,
        id: NodeId,
        next: Option<(Props, Option<Ref>)>,
        cause: UpdateCause,
    ) -> Result<(), RuntimeError> {
        let Some(node) = self.tree.get_mut(id) else {
            return Ok(());
        };
        if node.work != WorkState::Idle {
            return Ok(());
        }
        node.work = WorkState::Updating;

        let queued = if cause.merges_queued_state() {
            Some(std::mem::take(&mut node.queued_state))
        } else {
            None
        };
        let Some(mut instance) = node.instance.take() else {
            node.work = WorkState::Idle;
            return Ok(());
        };

        let prev_props = instance.props.clone();
        let prev_state = instance.state.clone();
        let (next_props, next_ref) = match next {
            Some((props, node_ref)) => (props, Some(node_ref)),
            None => (prev_props.clone(), None),
        };

        // Context can change on every pass, not just at mount.
        if let Some(extra) =
            instance
                .component
                .child_context(&next_props, &instance.state, &instance.context)
        {
            shallow_merge(&mut instance.context, extra);
        }
        let next_context = instance.context.clone();

        let next_state = match queued {
            Some(queued) => {
                let mut merged = prev_state.clone();
                shallow_merge(&mut merged, queued);
                merged
            }
            None => prev_state.clone(),
        };

        // Pre-commit guards, an explicit pipeline ordered by cause.
        if cause.runs_receive_props() {
            instance.component.will_receive_props(
                &next_props,
                &next_context,
                &mut Link {
                    node: id,
                    scheduler: &mut self.scheduler,
                },
            );
        }
        if cause.runs_should_update()
            && !instance
                .component
                .should_update(&next_props, &next_state, &next_context)
        {
            trace!(cause = ?cause, "update aborted by should_update");
            if let Some(node) = self.tree.get_mut(id) {
                node.instance = Some(instance);
                node.work = WorkState::Idle;
            }
            return Ok(());
        }

        instance.component.will_update(
            &next_props,
            &next_state,
            &next_context,
            &mut Link {
                node: id,
                scheduler: &mut self.scheduler,
            },
        );

        instance.state = next_state;
        instance.props = next_props.clone();

        let rendered = match instance
            .component
            .render(&instance.props, &instance.state, &instance.context)
        {
            Ok(view) => view,
            Err(error) => match self.dispatch(id, error, Phase::Render, true) {
                Ok(view) => view,
                Err(uncaught) => {
                    if let Some(node) = self.tree.get_mut(id) {
                        node.instance = Some(instance);
                        node.work = WorkState::Idle;
                    }
                    return Err(uncaught);
                }
            },
        };

        if let Some(node) = self.tree.get_mut(id) {
            node.props = next_props;
            node.context = next_context.clone();
            node.instance = Some(instance);
        }

        // Reconcile the old child tree against the fresh render.
        if let Some(&child) = self.tree.get(id).and_then(|node| node.children.first()) {
            let new_child = reconcile::diff(self, child, rendered.normalize())?;
            if let Some(node) = self.tree.get_mut(id) {
                node.children[0] = new_child;
            }
        }

        // Post-commit hook sees the pre-update snapshots.
        if let Some(mut instance) = self.tree.get_mut(id).and_then(|node| node.instance.take()) {
            instance.component.did_update(
                &prev_props,
                &prev_state,
                &next_context,
                &mut Link {
                    node: id,
                    scheduler: &mut self.scheduler,
                },
            );
            if let Some(node) = self.tree.get_mut(id) {
                node.instance = Some(instance);
            }
        }

        // Ref transitions ride on the update that changed them.
        if let Some(next_ref) = next_ref {
            let prev_ref = self.tree.get(id).and_then(|node| node.node_ref.clone());
            if !same_ref(prev_ref.as_ref(), next_ref.as_ref()) {
                refs::commit_ref(
                    &mut self.tree,
                    id,
                    prev_ref.as_ref(),
                    next_ref.as_ref(),
                    RefPhase::Update,
                );
                if let Some(node) = self.tree.get_mut(id) {
                    node.node_ref = next_ref;
                }
            }
        }

        if let Some(node) = self.tree.get_mut(id) {
            node.work = WorkState::Idle;
        }
        Ok(())
    }

    /// The single path by which any update reaches
    /// [`component_update`](Runtime::component_update).
    fn enqueue_update(
        &mut self,
        id: NodeId,
        callback: Option<UpdateCallback>,
        cause: UpdateCause,
    ) -> Result<(), RuntimeError> {
        let Some(node) = self.tree.get(id) else {
            // Detached: the update targets a node that no longer exists.
            return Ok(());
        };
        match node.work {
            WorkState::Unattached | WorkState::Updating => {
                // Never re-entrant on one element: defer and retry.
                self.scheduler.schedule(Task::Update {
                    node: id,
                    cause,
                    callback,
                });
                return Ok(());
            }
            WorkState::Unmounting => return Ok(()),
            WorkState::Idle => {}
        }
        self.component_update(id, None, cause)?;
        if let Some(callback) = callback {
            if let Some(instance) = self.tree.get(id).and_then(|node| node.instance.as_ref()) {
                callback(instance);
            }
        }
        Ok(())
    }

    fn set_state_inner(
        &mut self,
        id: NodeId,
        update: StateUpdate,
        callback: Option<UpdateCallback>,
    ) -> Result<(), RuntimeError> {
        if !self.tree.contains(id) {
            return Ok(());
        }
        match update {
            StateUpdate::Remote(future) => {
                trace!("state deferred until remote value resolves");
                self.scheduler.defer(Box::pin(async move {
                    match future.await {
                        Ok(map) => Task::SetState {
                            node: id,
                            update: StateUpdate::Map(map),
                            callback,
                        },
                        Err(error) => Task::Fail {
                            node: id,
                            phase: Phase::AsyncState,
                            error,
                        },
                    }
                }));
                Ok(())
            }
            StateUpdate::Updater(updater) => {
                let Some((state, props)) = self
                    .tree
                    .get(id)
                    .and_then(|node| node.instance.as_ref())
                    .map(|instance| (instance.state.clone(), instance.props.clone()))
                else {
                    return Ok(());
                };
                match updater(&state, &props) {
                    Ok(map) => self.set_state_inner(id, StateUpdate::Map(map), callback),
                    Err(error) => {
                        let view = self.dispatch(id, error, Phase::StateCallback, true)?;
                        self.apply_recovery(id, view)
                    }
                }
            }
            StateUpdate::Map(map) => {
                if let Some(node) = self.tree.get_mut(id) {
                    if node.work == WorkState::Updating {
                        // Mid-pass: fold into the queued target; the
                        // deferred retry pass picks it up.
                        shallow_merge(&mut node.queued_state, map);
                    } else {
                        node.queued_state = map;
                    }
                }
                self.enqueue_update(id, callback, UpdateCause::StateChanged)
            }
        }
    }

    fn run_task(&mut self, task: Task) -> Result<(), RuntimeError> {
        match task {
            Task::Update {
                node,
                cause,
                callback,
            } => self.enqueue_update(node, callback, cause),
            Task::SetState {
                node,
                update,
                callback,
            } => self.set_state_inner(node, update, callback),
            Task::FinishUnmount { node } => {
                self.finish_unmount(node);
                Ok(())
            }
            Task::Fail { node, phase, error } => {
                if !self.tree.contains(node) {
                    return Ok(());
                }
                let view = self.dispatch(node, error, phase, true)?;
                self.apply_recovery(node, view)
            }
        }
    }

    // ---- error boundaries ----------------------------------------------

    /// Walk ancestors of `from` for the nearest `did_catch` willing to
    /// handle `error`. The first handler terminates the search; with no
    /// handler and `rethrow` set, the error surfaces to the caller.
    fn dispatch(
        &mut self,
        from: NodeId,
        error: HookError,
        phase: Phase,
        rethrow: bool,
    ) -> Result<View, RuntimeError> {
        let mut cursor = self.tree.get(from).and_then(|node| node.parent);
        while let Some(id) = cursor {
            let next = self.tree.get(id).and_then(|node| node.parent);
            let taken = self
                .tree
                .get_mut(id)
                .filter(|node| node.is_component())
                .and_then(|node| node.instance.take());
            if let Some(mut instance) = taken {
                let caught = instance.component.did_catch(
                    &*error,
                    phase,
                    &mut Link {
                        node: id,
                        scheduler: &mut self.scheduler,
                    },
                );
                if let Some(node) = self.tree.get_mut(id) {
                    node.instance = Some(instance);
                }
                if let Catch::Recover(view) = caught {
                    debug!(%phase, boundary = %self.display_name(id), "error recovered by boundary");
                    return Ok(view);
                }
            }
            cursor = next;
        }
        if rethrow {
            debug!(%phase, component = %self.display_name(from), "uncaught error");
            Err(RuntimeError::Uncaught {
                phase,
                component: self.display_name(from),
                source: error,
            })
        } else {
            Ok(View::Empty)
        }
    }

    /// Replace the failing component's subtree with a boundary's
    /// recovery view.
    fn apply_recovery(&mut self, id: NodeId, view: View) -> Result<(), RuntimeError> {
        let Some(&child) = self.tree.get(id).and_then(|node| node.children.first()) else {
            return Ok(());
        };
        let new_child = reconcile::diff(self, child, view.normalize())?;
        if let Some(node) = self.tree.get_mut(id) {
            node.children[0] = new_child;
        }
        Ok(())
    }

    fn display_name(&self, id: NodeId) -> String {
        match self.tree.get(id).map(|node| &node.kind) {
            Some(NodeKind::Component(def)) => def.name().to_owned(),
            Some(NodeKind::Host { tag }) => tag.clone(),
            Some(NodeKind::Text(_)) => "#text".to_owned(),
            Some(NodeKind::Fragment) => "#fragment".to_owned(),
            Some(NodeKind::Empty) | None => "#empty".to_owned(),
        }
    }

    // ---- unmounting -----------------------------------------------------

    /// Tear down a subtree. A `will_unmount` hook returning a deferred
    /// teardown parks the subtree in `Unmounting`; host removal then
    /// waits for the future to settle while the caller proceeds.
    pub(crate) fn unmount_node(&mut self, id: NodeId, run_hooks: bool) {
        let Some(node) = self.tree.get_mut(id) else {
            return;
        };
        if node.work == WorkState::Unmounting {
            return;
        }
        if run_hooks && node.is_component() {
            if let Some(mut instance) = node.instance.take() {
                let teardown = instance.component.will_unmount();
                node.instance = Some(instance);
                if let Teardown::Deferred(future) = teardown {
                    trace!(component = %self.display_name(id), "teardown deferred");
                    if let Some(node) = self.tree.get_mut(id) {
                        node.work = WorkState::Unmounting;
                    }
                    self.scheduler
                        .defer(Box::pin(async move {
                            future.await;
                            Task::FinishUnmount { node: id }
                        }));
                    return;
                }
            }
        }
        self.finish_unmount(id);
    }

    /// Remove a subtree's host nodes and clear its refs. Runs at most
    /// once per logical unmount.
    fn finish_unmount(&mut self, id: NodeId) {
        let Some(node) = self.tree.get_mut(id) else {
            return;
        };
        node.work = WorkState::Idle;
        let children = node.children.clone();
        for child in children {
            self.unmount_node(child, true);
        }
        let Some(node) = self.tree.get(id) else {
            return;
        };
        let node_ref = node.node_ref.clone();
        let host = node.host;
        let host_parent = node.host_parent;
        if node_ref.is_some() {
            refs::commit_ref(&mut self.tree, id, node_ref.as_ref(), None, RefPhase::Unmount);
        }
        if let Some(host) = host {
            self.host.remove(host_parent, host);
        }
        self.tree.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Catch, Component, ComponentFactory, StateInit, Teardown};
    use crate::element::{component, function, host, props, text, Context, HookError, Props, StateMap, View};
    use crate::refs::{Ref, RefValue};
    use crate::schedule::StateUpdate;
    use crate::testing::TestRuntime;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    struct FnFactory<F>(&'static str, F);

    impl<F> ComponentFactory for FnFactory<F>
    where
        F: Fn(&Props, &Context) -> Result<Box<dyn Component>, HookError> + Send + Sync,
    {
        fn name(&self) -> &str {
            self.0
        }

        fn create(&self, props: &Props, context: &Context) -> Result<Box<dyn Component>, HookError> {
            (self.1)(props, context)
        }
    }

    fn factory(
        name: &'static str,
        create: impl Fn(&Props, &Context) -> Result<Box<dyn Component>, HookError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<dyn ComponentFactory> {
        Arc::new(FnFactory(name, create))
    }

    // Logs every hook invocation and renders its state's `n` field.
    struct Probe {
        log: Log,
    }

    impl Component for Probe {
        fn render(
            &self,
            _props: &Props,
            state: &StateMap,
            _context: &Context,
        ) -> Result<View, HookError> {
            self.log.lock().unwrap().push("render".into());
            Ok(text(state.get("n").cloned().unwrap_or(json!(0))))
        }

        fn initial_state(&self, _props: &Props) -> StateInit {
            self.log.lock().unwrap().push("initial_state".into());
            StateInit::State(props(json!({"n": 0})))
        }

        fn child_context(
            &self,
            _props: &Props,
            _state: &StateMap,
            _context: &Context,
        ) -> Option<Context> {
            self.log.lock().unwrap().push("child_context".into());
            None
        }

        fn will_receive_props(
            &mut self,
            _next_props: &Props,
            _context: &Context,
            _link: &mut Link<'_>,
        ) {
            self.log.lock().unwrap().push("will_receive_props".into());
        }

        fn will_update(
            &mut self,
            _next_props: &Props,
            _next_state: &StateMap,
            _context: &Context,
            _link: &mut Link<'_>,
        ) {
            self.log.lock().unwrap().push("will_update".into());
        }

        fn did_update(
            &mut self,
            _prev_props: &Props,
            _prev_state: &StateMap,
            _context: &Context,
            _link: &mut Link<'_>,
        ) {
            self.log.lock().unwrap().push("did_update".into());
        }
    }

    fn probe_factory(log: &Log) -> Arc<dyn ComponentFactory> {
        let log = log.clone();
        factory("Probe", move |_, _| Ok(Box::new(Probe { log: log.clone() })))
    }

    #[test]
    fn mount_runs_hooks_in_order() {
        let log = Log::default();
        let def = probe_factory(&log);
        let mut rt = TestRuntime::new();
        rt.render(component(&def).build());
        assert_eq!(entries(&log), ["initial_state", "child_context", "render"]);
        assert_eq!(rt.output(), "0");
    }

    #[test]
    fn set_state_runs_update_hooks_in_order() {
        let log = Log::default();
        let def = probe_factory(&log);
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());
        log.lock().unwrap().clear();

        rt.runtime().set_state(root, json!({"n": 1})).unwrap();
        assert_eq!(rt.output(), "1");
        // State-driven: no props hook, then guard order.
        assert_eq!(
            entries(&log),
            ["child_context", "will_update", "render", "did_update"]
        );
    }

    #[test]
    fn state_merges_are_shallow() {
        let log = Log::default();
        let def = probe_factory(&log);
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());

        rt.runtime().set_state(root, json!({"a": 1})).unwrap();
        rt.runtime().set_state(root, json!({"n": 7})).unwrap();
        let state = &rt.runtime().instance(root).unwrap().state;
        assert_eq!(state.get("a"), Some(&json!(1)));
        assert_eq!(state.get("n"), Some(&json!(7)));
        assert_eq!(rt.output(), "7");
    }

    #[test]
    fn new_props_run_the_props_guard() {
        let log = Log::default();
        let def = probe_factory(&log);
        let mut rt = TestRuntime::new();
        rt.render(component(&def).prop("v", 1).build());
        log.lock().unwrap().clear();

        rt.render(component(&def).prop("v", 2).build());
        let hooks = entries(&log);
        assert_eq!(hooks.first().map(String::as_str), Some("child_context"));
        assert!(hooks.contains(&"will_receive_props".to_owned()));
    }

    // Refuses every guarded update; counts renders.
    struct Stubborn {
        log: Log,
    }

    impl Component for Stubborn {
        fn render(
            &self,
            _props: &Props,
            state: &StateMap,
            _context: &Context,
        ) -> Result<View, HookError> {
            self.log.lock().unwrap().push("render".into());
            Ok(text(state.get("n").cloned().unwrap_or(json!(0))))
        }

        fn should_update(
            &self,
            _next_props: &Props,
            _next_state: &StateMap,
            _context: &Context,
        ) -> bool {
            false
        }
    }

    #[test]
    fn should_update_false_aborts_before_commit() {
        let log = Log::default();
        let inner = log.clone();
        let def = factory("Stubborn", move |_, _| {
            Ok(Box::new(Stubborn { log: inner.clone() }))
        });
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());

        rt.runtime().set_state(root, json!({"n": 9})).unwrap();
        // Nothing committed: no re-render, state untouched.
        assert_eq!(entries(&log), ["render"]);
        assert!(rt.runtime().instance(root).unwrap().state.get("n").is_none());
        assert_eq!(rt.output(), "0");
    }

    #[test]
    fn force_update_skips_the_guards() {
        let log = Log::default();
        let inner = log.clone();
        let def = factory("Stubborn", move |_, _| {
            Ok(Box::new(Stubborn { log: inner.clone() }))
        });
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());

        rt.runtime().force_update(root).unwrap();
        assert_eq!(entries(&log), ["render", "render"]);
    }

    #[test]
    fn reconcile_patches_text_and_props_in_place() {
        let mut rt = TestRuntime::new();
        rt.render(host("div").prop("id", "a").child(text("one")).build());
        rt.render(host("div").prop("id", "b").child(text("two")).build());
        assert_eq!(rt.output(), "<div id=\"b\">two</div>");
        // Patched, not replaced: nothing was detached.
        assert!(rt.host().removals().is_empty());
    }

    #[test]
    fn reconcile_replaces_on_tag_change() {
        let mut rt = TestRuntime::new();
        rt.render(host("div").build());
        rt.render(host("span").build());
        assert_eq!(rt.output(), "<span></span>");
        assert_eq!(rt.host().removals().len(), 1);
    }

    #[test]
    fn reconcile_replaces_on_kind_change() {
        let mut rt = TestRuntime::new();
        rt.render(text("plain"));
        rt.render(host("div").child(text("boxed")).build());
        assert_eq!(rt.output(), "<div>boxed</div>");
        assert_eq!(rt.host().removals().len(), 1);
    }

    #[test]
    fn reconcile_trims_surplus_children() {
        let mut rt = TestRuntime::new();
        rt.render(host("ul").children([text("a"), text("b"), text("c")]).build());
        rt.render(host("ul").child(text("a")).build());
        assert_eq!(rt.output(), "<ul>a</ul>");
    }

    #[test]
    fn nearest_boundary_wins() {
        let failing = function(|_| Err("boom".into())).build();

        struct Boundary {
            log: Log,
            child: View,
        }

        impl Component for Boundary {
            fn render(
                &self,
                _props: &Props,
                _state: &StateMap,
                _context: &Context,
            ) -> Result<View, HookError> {
                Ok(self.child.clone())
            }

            fn did_catch(
                &mut self,
                error: &(dyn std::error::Error + Send + Sync),
                _phase: Phase,
                _link: &mut Link<'_>,
            ) -> Catch {
                self.log.lock().unwrap().push(format!("caught: {error}"));
                Catch::Recover(text("fallback"))
            }
        }

        let inner_log = Log::default();
        let outer_log = Log::default();

        let log = inner_log.clone();
        let child = failing.clone();
        let inner = factory("Inner", move |_, _| {
            Ok(Box::new(Boundary {
                log: log.clone(),
                child: child.clone(),
            }))
        });

        let log = outer_log.clone();
        let child = component(&inner).build();
        let outer = factory("Outer", move |_, _| {
            Ok(Box::new(Boundary {
                log: log.clone(),
                child: child.clone(),
            }))
        });

        let mut rt = TestRuntime::new();
        rt.render(component(&outer).build());

        assert_eq!(rt.output(), "fallback");
        assert_eq!(entries(&inner_log), ["caught: boom"]);
        assert!(entries(&outer_log).is_empty());
    }

    #[test]
    fn unhandled_errors_surface_to_the_caller() {
        let mut rt = TestRuntime::new();
        let container = rt.container();
        let result = rt
            .runtime()
            .render(function(|_| Err("boom".into())).build(), container);
        assert!(matches!(
            result,
            Err(RuntimeError::Uncaught {
                phase: Phase::Render,
                ..
            })
        ));
    }

    #[test]
    fn constructor_failures_reach_a_boundary() {
        let failing = factory("Broken", |_, _| Err("ctor".into()));

        struct Boundary {
            child: View,
        }

        impl Component for Boundary {
            fn render(
                &self,
                _props: &Props,
                _state: &StateMap,
                _context: &Context,
            ) -> Result<View, HookError> {
                Ok(self.child.clone())
            }

            fn did_catch(
                &mut self,
                _error: &(dyn std::error::Error + Send + Sync),
                phase: Phase,
                _link: &mut Link<'_>,
            ) -> Catch {
                assert_eq!(phase, Phase::Constructor);
                Catch::Recover(text("recovered"))
            }
        }

        let child = component(&failing).build();
        let boundary = factory("Boundary", move |_, _| {
            Ok(Box::new(Boundary {
                child: child.clone(),
            }))
        });

        let mut rt = TestRuntime::new();
        rt.render(component(&boundary).build());
        assert_eq!(rt.output(), "recovered");
    }

    // Requests one extra pass from inside a pass.
    struct Reentrant {
        log: Log,
        asked: bool,
    }

    impl Component for Reentrant {
        fn render(
            &self,
            _props: &Props,
            state: &StateMap,
            _context: &Context,
        ) -> Result<View, HookError> {
            self.log.lock().unwrap().push("render".into());
            Ok(text(state.get("n").cloned().unwrap_or(json!(0))))
        }

        fn will_update(
            &mut self,
            _next_props: &Props,
            _next_state: &StateMap,
            _context: &Context,
            link: &mut Link<'_>,
        ) {
            if !self.asked {
                self.asked = true;
                link.force_update();
            }
        }

        fn did_update(
            &mut self,
            _prev_props: &Props,
            _prev_state: &StateMap,
            _context: &Context,
            _link: &mut Link<'_>,
        ) {
            self.log.lock().unwrap().push("did_update".into());
        }
    }

    #[test]
    fn hook_requested_updates_defer_past_the_pass() {
        let log = Log::default();
        let inner = log.clone();
        let def = factory("Reentrant", move |_, _| {
            Ok(Box::new(Reentrant {
                log: inner.clone(),
                asked: false,
            }))
        });
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());
        log.lock().unwrap().clear();

        rt.runtime().set_state(root, json!({"n": 1})).unwrap();
        // The in-flight pass completed before the requested one started.
        assert_eq!(entries(&log), ["render", "did_update"]);
        rt.flush();
        assert_eq!(
            entries(&log),
            ["render", "did_update", "render", "did_update"]
        );
    }

    #[test]
    fn updates_to_stale_nodes_are_dropped() {
        let log = Log::default();
        let def = probe_factory(&log);
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());
        assert!(rt.unmount());

        assert!(!rt.runtime().is_mounted(root));
        rt.runtime().set_state(root, json!({"n": 1})).unwrap();
        rt.runtime().force_update(root).unwrap();
        rt.flush();
    }

    #[test]
    fn callback_refs_fire_symmetrically() {
        let seen: Arc<Mutex<Vec<Option<RefValue>>>> = Arc::default();
        let log = seen.clone();
        let mut rt = TestRuntime::new();
        rt.render(
            host("div")
                .node_ref(Ref::callback(move |value| log.lock().unwrap().push(value)))
                .build(),
        );
        assert!(matches!(
            seen.lock().unwrap().as_slice(),
            [Some(RefValue::Host(_))]
        ));

        rt.unmount();
        assert!(matches!(
            seen.lock().unwrap().as_slice(),
            [Some(RefValue::Host(_)), None]
        ));
    }

    // Renders a keyed-ref child only while state says so.
    struct KeyedOwner;

    impl Component for KeyedOwner {
        fn render(
            &self,
            _props: &Props,
            state: &StateMap,
            _context: &Context,
        ) -> Result<View, HookError> {
            if state.get("show") == Some(&json!(false)) {
                Ok(View::Empty)
            } else {
                Ok(host("div").node_ref(Ref::key("el")).build())
            }
        }

        fn initial_state(&self, _props: &Props) -> StateInit {
            StateInit::State(props(json!({"show": true})))
        }
    }

    #[test]
    fn key_refs_resolve_and_null_out() {
        let def = factory("KeyedOwner", |_, _| Ok(Box::new(KeyedOwner)));
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());

        let refs = &rt.runtime().instance(root).unwrap().refs;
        assert!(matches!(refs.get("el"), Some(Some(RefValue::Host(_)))));

        rt.runtime().set_state(root, json!({"show": false})).unwrap();
        let refs = &rt.runtime().instance(root).unwrap().refs;
        // Unmounted target: the key stays, its value nulls out.
        assert_eq!(refs.get("el"), Some(&None));
    }

    #[test]
    fn context_flows_to_descendants() {
        struct Provider {
            child: View,
        }

        impl Component for Provider {
            fn render(
                &self,
                _props: &Props,
                _state: &StateMap,
                _context: &Context,
            ) -> Result<View, HookError> {
                Ok(self.child.clone())
            }

            fn child_context(
                &self,
                _props: &Props,
                _state: &StateMap,
                _context: &Context,
            ) -> Option<Context> {
                Some(props(json!({"theme": "dark"})))
            }
        }

        struct Consumer;

        impl Component for Consumer {
            fn render(
                &self,
                _props: &Props,
                _state: &StateMap,
                context: &Context,
            ) -> Result<View, HookError> {
                Ok(text(
                    context
                        .get("theme")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unset"),
                ))
            }
        }

        let consumer = factory("Consumer", |_, _| Ok(Box::new(Consumer)));
        let child = component(&consumer).build();
        let provider = factory("Provider", move |_, _| {
            Ok(Box::new(Provider {
                child: child.clone(),
            }))
        });

        let mut rt = TestRuntime::new();
        rt.render(component(&provider).build());
        assert_eq!(rt.output(), "dark");
    }

    #[tokio::test]
    async fn deferred_initial_state_applies_on_settle() {
        struct Lazy;

        impl Component for Lazy {
            fn render(
                &self,
                _props: &Props,
                state: &StateMap,
                _context: &Context,
            ) -> Result<View, HookError> {
                Ok(text(state.get("n").cloned().unwrap_or(json!(0))))
            }

            fn initial_state(&self, _props: &Props) -> StateInit {
                StateInit::Deferred(Box::pin(async { Ok(props(json!({"n": 42}))) }))
            }
        }

        let def = factory("Lazy", |_, _| Ok(Box::new(Lazy)));
        let mut rt = TestRuntime::new();
        rt.render(component(&def).build());
        // Mount does not block on the future.
        assert_eq!(rt.output(), "0");

        rt.settle().await;
        assert_eq!(rt.output(), "42");
    }

    #[tokio::test]
    async fn remote_state_applies_on_settle() {
        let log = Log::default();
        let def = probe_factory(&log);
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());

        let done = Arc::new(Mutex::new(false));
        let flag = done.clone();
        rt.runtime()
            .set_state_with(
                root,
                StateUpdate::remote(async { Ok(props(json!({"n": 5}))) }),
                move |instance| {
                    assert_eq!(instance.state.get("n"), Some(&json!(5)));
                    *flag.lock().unwrap() = true;
                },
            )
            .unwrap();

        assert_eq!(rt.output(), "0");
        assert!(!*done.lock().unwrap());

        rt.settle().await;
        assert_eq!(rt.output(), "5");
        assert!(*done.lock().unwrap());
    }

    #[tokio::test]
    async fn deferred_teardown_keeps_the_host_until_settled() {
        struct Slow;

        impl Component for Slow {
            fn render(
                &self,
                _props: &Props,
                _state: &StateMap,
                _context: &Context,
            ) -> Result<View, HookError> {
                Ok(host("div").child(text("alive")).build())
            }

            fn will_unmount(&mut self) -> Teardown {
                Teardown::Deferred(Box::pin(async {}))
            }
        }

        let def = factory("Slow", |_, _| Ok(Box::new(Slow)));
        let mut rt = TestRuntime::new();
        rt.render(component(&def).build());
        assert_eq!(rt.output(), "<div>alive</div>");

        assert!(rt.unmount());
        // Parked: the host subtree survives until the teardown settles.
        assert_eq!(rt.output(), "<div>alive</div>");

        rt.settle().await;
        assert_eq!(rt.output(), "");
        let removals = rt.host().removals();
        assert_eq!(
            removals
                .iter()
                .filter(|&&(parent, _)| parent == rt.container())
                .count(),
            1
        );
    }

    #[test]
    fn failed_mounts_leave_no_orphaned_host_nodes() {
        let mut rt = TestRuntime::new();
        let container = rt.container();
        let result = rt.runtime().render(
            host("div")
                .child(function(|_| Err("boom".into())).build())
                .build(),
            container,
        );
        assert!(matches!(result, Err(RuntimeError::Uncaught { .. })));
        // The committed <div> unwinds with the failed mount.
        assert_eq!(rt.output(), "");
        assert!(rt.runtime().root(container).is_none());

        // The container is clean for the next mount.
        rt.render(text("ok"));
        assert_eq!(rt.output(), "ok");
    }

    // Renders a host child whose ref key comes from state.
    struct Rekey;

    impl Component for Rekey {
        fn render(
            &self,
            _props: &Props,
            state: &StateMap,
            _context: &Context,
        ) -> Result<View, HookError> {
            let key = state.get("key").and_then(|v| v.as_str()).unwrap_or("x");
            Ok(host("div").node_ref(Ref::key(key)).build())
        }

        fn initial_state(&self, _props: &Props) -> StateInit {
            StateInit::State(props(json!({"key": "x"})))
        }
    }

    #[test]
    fn changing_a_key_ref_moves_the_entry() {
        let def = factory("Rekey", |_, _| Ok(Box::new(Rekey)));
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());

        let refs = &rt.runtime().instance(root).unwrap().refs;
        assert!(matches!(refs.get("x"), Some(Some(RefValue::Host(_)))));

        rt.runtime().set_state(root, json!({"key": "y"})).unwrap();
        let refs = &rt.runtime().instance(root).unwrap().refs;
        // The old key is deleted outright, never left set alongside the
        // new one.
        assert!(refs.get("x").is_none());
        assert!(matches!(refs.get("y"), Some(Some(RefValue::Host(_)))));
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn failing_updaters_reach_a_boundary() {
        struct Boundary {
            log: Log,
            child: View,
        }

        impl Component for Boundary {
            fn render(
                &self,
                _props: &Props,
                _state: &StateMap,
                _context: &Context,
            ) -> Result<View, HookError> {
                Ok(self.child.clone())
            }

            fn did_catch(
                &mut self,
                error: &(dyn std::error::Error + Send + Sync),
                phase: Phase,
                _link: &mut Link<'_>,
            ) -> Catch {
                self.log.lock().unwrap().push(format!("{phase}: {error}"));
                Catch::Recover(text("fallback"))
            }
        }

        let probe_log = Log::default();
        let child_def = probe_factory(&probe_log);
        let caught = Log::default();

        let log = caught.clone();
        let child = component(&child_def).build();
        let boundary = factory("Boundary", move |_, _| {
            Ok(Box::new(Boundary {
                log: log.clone(),
                child: child.clone(),
            }))
        });

        let mut rt = TestRuntime::new();
        let root = rt.render(component(&boundary).build());
        let child = rt.runtime().children(root)[0];

        rt.runtime()
            .set_state(
                child,
                StateUpdate::updater(|_, _| Err("bad updater".into())),
            )
            .unwrap();
        assert_eq!(entries(&caught), ["state callback: bad updater"]);
        assert_eq!(rt.output(), "fallback");
    }

    #[tokio::test]
    async fn rejected_remote_state_surfaces_without_a_boundary() {
        let log = Log::default();
        let def = probe_factory(&log);
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).build());

        rt.runtime()
            .set_state(root, StateUpdate::remote(async { Err("offline".into()) }))
            .unwrap();
        let result = rt.runtime().run_until_settled().await;
        assert!(matches!(
            result,
            Err(RuntimeError::Uncaught {
                phase: Phase::AsyncState,
                ..
            })
        ));
        // The rejection never touched committed state.
        assert_eq!(rt.output(), "0");
    }

    #[test]
    fn updater_sees_current_state_and_props() {
        let log = Log::default();
        let def = probe_factory(&log);
        let mut rt = TestRuntime::new();
        let root = rt.render(component(&def).prop("step", 10).build());

        rt.runtime()
            .set_state(
                root,
                StateUpdate::updater(|state, props| {
                    let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                    let step = props.get("step").and_then(|v| v.as_i64()).unwrap_or(1);
                    Ok(crate::element::props(json!({"n": n + step})))
                }),
            )
            .unwrap();
        assert_eq!(rt.output(), "10");
    }
}
