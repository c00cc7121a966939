use crate::element::Props;

/// Opaque handle to a node owned by the host adapter.
pub type HostId = u64;

/// The commit layer: physically creates and mutates host nodes.
///
/// The engine consumes this contract and nothing more; how nodes are
/// realized (DOM, terminal cells, an in-memory tree for tests) is the
/// adapter's business. Attribute and style serialization also live behind
/// this seam.
///
/// `remove` is called at most once per logical unmount of a node, and
/// must tolerate a parent that was already detached by an earlier
/// removal higher up the tree.
pub trait HostAdapter: Send {
    /// Create an element node for a host intrinsic.
    fn create_element(&mut self, tag: &str, props: &Props) -> HostId;

    /// Create a text node.
    fn create_text(&mut self, text: &str) -> HostId;

    /// Replace a text node's content.
    fn set_text(&mut self, node: HostId, text: &str);

    /// Apply a props delta to an element node.
    fn update_props(&mut self, node: HostId, prev: &Props, next: &Props);

    /// Append `child` as the last child of `parent`.
    fn append(&mut self, parent: HostId, child: HostId);

    /// Detach `child` from `parent`.
    fn remove(&mut self, parent: HostId, child: HostId);
}
