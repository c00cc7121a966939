//! Child-tree reconciliation.
//!
//! The diff is intentionally naive: children pair by index, host nodes
//! match on tag, component nodes match on definition identity. Anything
//! that does not match is replaced wholesale. Keyed reordering belongs to
//! a smarter host layer and is out of scope here.

use crate::element::View;
use crate::error::RuntimeError;
use crate::refs::{self, same_ref, RefPhase};
use crate::runtime::Runtime;
use crate::schedule::UpdateCause;
use crate::tree::{NodeId, NodeKind};
use tracing::trace;

/// Reconcile the mounted node `prev` against the fresh view `next`,
/// returning the node that now occupies its position (the same id when
/// patched in place, a new one when replaced).
///
/// `next` must already be [normalized](View::normalize). A stale `prev`
/// makes this a no-op.
pub(crate) fn diff(rt: &mut Runtime, prev: NodeId, next: View) -> Result<NodeId, RuntimeError> {
    let Some(node) = rt.tree.get(prev) else {
        return Ok(prev);
    };

    // Kind is resolved once at construction; a changed kind always
    // replaces, no shape probing.
    if node.kind.class() != next.kind() {
        return replace(rt, prev, next);
    }

    match (&node.kind, next) {
        (NodeKind::Empty, View::Empty) => Ok(prev),

        (NodeKind::Text(old), View::Text(new)) => {
            if *old != new {
                if let Some(host) = node.host {
                    rt.host.set_text(host, &new);
                }
                if let Some(node) = rt.tree.get_mut(prev) {
                    node.kind = NodeKind::Text(new);
                }
            }
            Ok(prev)
        }

        (NodeKind::Host { tag }, View::Host(view)) if *tag == view.tag => {
            let host = node.host;
            let prev_props = node.props.clone();
            let prev_ref = node.node_ref.clone();
            let context = node.context.clone();

            if prev_props != view.props {
                if let Some(host) = host {
                    rt.host.update_props(host, &prev_props, &view.props);
                }
                if let Some(node) = rt.tree.get_mut(prev) {
                    node.props = view.props;
                }
            }

            if !same_ref(prev_ref.as_ref(), view.node_ref.as_ref()) {
                refs::commit_ref(
                    &mut rt.tree,
                    prev,
                    prev_ref.as_ref(),
                    view.node_ref.as_ref(),
                    RefPhase::Update,
                );
                if let Some(node) = rt.tree.get_mut(prev) {
                    node.node_ref = view.node_ref;
                }
            }

            let attach = host.unwrap_or_default();
            diff_children(rt, prev, view.children, attach, context)?;
            Ok(prev)
        }

        (NodeKind::Component(def), View::Component(view)) if def.same(&view.def) => {
            trace!(component = def.name(), "reconcile in place");
            rt.component_update(
                prev,
                Some((view.props, view.node_ref)),
                UpdateCause::PropsChanged,
            )?;
            Ok(prev)
        }

        (NodeKind::Fragment, View::Fragment(children)) => {
            let attach = node.host_parent;
            let context = node.context.clone();
            diff_children(rt, prev, children, attach, context)?;
            Ok(prev)
        }

        // Same kind but a different tag or definition: replace.
        (_, next) => replace(rt, prev, next),
    }
}

/// Tear the old subtree down and mount the new view in its position.
fn replace(rt: &mut Runtime, prev: NodeId, next: View) -> Result<NodeId, RuntimeError> {
    let Some(node) = rt.tree.get(prev) else {
        return Ok(prev);
    };
    let parent = node.parent;
    let host_parent = node.host_parent;
    let context = node.context.clone();
    rt.unmount_node(prev, true);
    rt.mount_node(next, parent, host_parent, context)
}

/// Index-paired child reconciliation: shared prefix diffs in place,
/// surplus old children unmount, surplus new children mount at the end.
fn diff_children(
    rt: &mut Runtime,
    parent: NodeId,
    next: Vec<View>,
    host_parent: crate::host::HostId,
    context: crate::element::Context,
) -> Result<(), RuntimeError> {
    let old: Vec<NodeId> = rt
        .tree
        .get(parent)
        .map(|node| node.children.clone())
        .unwrap_or_default();
    let shared = old.len().min(next.len());
    let mut children = Vec::with_capacity(next.len());
    let mut fresh = next.into_iter();

    for (index, view) in fresh.by_ref().take(shared).enumerate() {
        children.push(diff(rt, old[index], view.normalize())?);
    }
    for &stale in &old[shared..] {
        rt.unmount_node(stale, true);
    }
    for view in fresh {
        children.push(rt.mount_node(view.normalize(), Some(parent), host_parent, context.clone())?);
    }

    if let Some(node) = rt.tree.get_mut(parent) {
        node.children = children;
    }
    Ok(())
}
