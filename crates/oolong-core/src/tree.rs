use crate::component::Instance;
use crate::element::{ComponentDef, ComponentKind, Context, Props, StateMap};
use crate::host::HostId;
use crate::refs::Ref;

/// Generational handle to a retained [`Node`].
///
/// Stale handles (their node was unmounted) simply fail to resolve, which
/// is the engine's only cancellation mechanism: a deferred update whose
/// target is gone becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Per-element gate against re-entrant updates.
///
/// Transitions move only forward within one pass: `Idle -> Updating ->
/// Idle`. A node parked in `Unmounting` is waiting on a deferred
/// teardown and accepts no further work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// Instance not yet attached to a live host subtree.
    Unattached,
    /// Settled; safe to update immediately.
    Idle,
    /// An update pass is in flight; re-entrant triggers must defer.
    Updating,
    /// A deferred teardown is in flight.
    Unmounting,
}

/// What a retained node is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Component(ComponentDef),
    Host { tag: String },
    Text(String),
    Fragment,
    Empty,
}

impl NodeKind {
    /// The closed kind this node was constructed as, comparable against
    /// [`View::kind`](crate::element::View::kind) when reconciling.
    pub fn class(&self) -> ComponentKind {
        match self {
            NodeKind::Component(ComponentDef::Stateful(_)) => ComponentKind::Stateful,
            NodeKind::Component(ComponentDef::Function(_)) => ComponentKind::Function,
            NodeKind::Host { .. } => ComponentKind::Host,
            NodeKind::Text(_) => ComponentKind::Text,
            NodeKind::Fragment => ComponentKind::Fragment,
            NodeKind::Empty => ComponentKind::Empty,
        }
    }
}

/// A retained element: the mounted counterpart of a
/// [`View`](crate::element::View).
pub struct Node {
    pub kind: NodeKind,
    pub props: Props,
    pub node_ref: Option<Ref>,
    pub context: Context,
    /// State written by `set_state` but not yet committed by an update
    /// pass.
    pub queued_state: StateMap,
    pub work: WorkState,
    /// Present exactly when `kind` is `Component`.
    pub instance: Option<Instance>,
    /// Host handle, for host and text nodes.
    pub host: Option<HostId>,
    /// The host node new children of this subtree attach to.
    pub host_parent: HostId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, context: Context, host_parent: HostId) -> Self {
        Self {
            kind,
            props: Props::new(),
            node_ref: None,
            context,
            queued_state: StateMap::new(),
            work: WorkState::Unattached,
            instance: None,
            host: None,
            host_parent,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Whether this node is a component element.
    pub fn is_component(&self) -> bool {
        matches!(self.kind, NodeKind::Component(_))
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Generational arena holding the retained element tree.
#[derive(Default)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Remove a node, invalidating its id and any copies of it.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }
}
