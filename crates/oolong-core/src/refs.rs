use crate::host::HostId;
use crate::tree::{NodeId, Tree};
use std::fmt;
use std::sync::Arc;

/// A ref request carried on a view.
#[derive(Clone)]
pub enum Ref {
    /// Invoked with `Some(value)` when the target resolves and `None`
    /// when it unmounts or the ref moves away.
    Callback(Arc<dyn Fn(Option<RefValue>) + Send + Sync>),
    /// Written into the owning instance's `refs` map under this key.
    Key(String),
}

impl Ref {
    /// A callback ref.
    pub fn callback(f: impl Fn(Option<RefValue>) + Send + Sync + 'static) -> Self {
        Ref::Callback(Arc::new(f))
    }

    /// A string-key ref.
    pub fn key(key: impl Into<String>) -> Self {
        Ref::Key(key.into())
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Callback(_) => f.write_str("Ref::Callback(..)"),
            Ref::Key(key) => write!(f, "Ref::Key({key:?})"),
        }
    }
}

/// Whether two ref requests are the same request.
///
/// Keys compare by value, callbacks by identity.
pub fn same_ref(a: Option<&Ref>, b: Option<&Ref>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Ref::Key(a)), Some(Ref::Key(b))) => a == b,
        (Some(Ref::Callback(a)), Some(Ref::Callback(b))) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// What a ref resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefValue {
    /// The mounted component node backing a component element.
    Component(NodeId),
    /// The host node handle backing a host or text element.
    Host(HostId),
}

/// Which lifecycle edge a ref commit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefPhase {
    Mount,
    Update,
    Unmount,
}

/// Apply a ref transition for `id`.
///
/// The stale request is always cleared before the new one is assigned:
/// callback refs are invoked with `None`, a replaced key is deleted from
/// the owner's `refs` map, and an unmounted key is nulled out in place.
pub(crate) fn commit_ref(
    tree: &mut Tree,
    id: NodeId,
    prev: Option<&Ref>,
    next: Option<&Ref>,
    phase: RefPhase,
) {
    let value = match phase {
        RefPhase::Unmount => None,
        RefPhase::Mount | RefPhase::Update => resolve(tree, id),
    };
    let owner = ref_owner(tree, id);

    if let Some(prev) = prev {
        if phase == RefPhase::Unmount || !same_ref(Some(prev), next) {
            match prev {
                Ref::Callback(f) => f(None),
                Ref::Key(key) => {
                    if let Some(refs) = owner.and_then(|o| owner_refs(tree, o)) {
                        if phase == RefPhase::Unmount {
                            refs.insert(key.clone(), None);
                        } else {
                            refs.remove(key);
                        }
                    }
                }
            }
        }
    }

    if phase != RefPhase::Unmount {
        if let Some(next) = next {
            match next {
                Ref::Callback(f) => f(value),
                Ref::Key(key) => {
                    if let Some(refs) = owner.and_then(|o| owner_refs(tree, o)) {
                        refs.insert(key.clone(), value);
                    }
                }
            }
        }
    }
}

fn resolve(tree: &Tree, id: NodeId) -> Option<RefValue> {
    let node = tree.get(id)?;
    if node.is_component() {
        Some(RefValue::Component(id))
    } else {
        node.host.map(RefValue::Host)
    }
}

/// The instance that tracks string-key refs for `id`: its nearest
/// ancestor component.
fn ref_owner(tree: &Tree, id: NodeId) -> Option<NodeId> {
    let mut cursor = tree.get(id)?.parent;
    while let Some(ancestor) = cursor {
        let node = tree.get(ancestor)?;
        if node.is_component() && node.instance.is_some() {
            return Some(ancestor);
        }
        cursor = node.parent;
    }
    None
}

fn owner_refs(
    tree: &mut Tree,
    owner: NodeId,
) -> Option<&mut std::collections::HashMap<String, Option<RefValue>>> {
    tree.get_mut(owner)
        .and_then(|node| node.instance.as_mut())
        .map(|instance| &mut instance.refs)
}
