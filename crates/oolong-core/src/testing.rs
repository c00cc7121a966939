use crate::element::{Props, Value, View};
use crate::host::{HostAdapter, HostId};
use crate::runtime::Runtime;
use crate::tree::NodeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An in-memory host adapter that records the committed node tree.
///
/// `MemoryHost` is the headless stand-in for a real commit target: every
/// create, append, and remove lands in a shared map you can assert
/// against from a plain `#[test]` function. Clones share the same
/// underlying store, so the copy handed to the runtime and the copy kept
/// by the test observe the same tree.
#[derive(Clone, Default)]
pub struct MemoryHost {
    inner: Arc<Mutex<MemoryHostInner>>,
}

#[derive(Default)]
struct MemoryHostInner {
    next_id: HostId,
    nodes: HashMap<HostId, MemNode>,
    removals: Vec<(HostId, HostId)>,
}

struct MemNode {
    tag: Option<String>,
    text: Option<String>,
    props: Props,
    children: Vec<HostId>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a detached container node to mount roots into.
    pub fn container(&self) -> HostId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.alloc();
        inner.nodes.insert(
            id,
            MemNode {
                tag: Some("#container".to_owned()),
                text: None,
                props: Props::new(),
                children: Vec::new(),
            },
        );
        id
    }

    /// Whether the node is still attached to the recorded tree.
    pub fn contains(&self, id: HostId) -> bool {
        self.inner.lock().unwrap().nodes.contains_key(&id)
    }

    /// Number of children currently attached to `id`.
    pub fn child_count(&self, id: HostId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(&id)
            .map(|node| node.children.len())
            .unwrap_or(0)
    }

    /// Every `(parent, child)` removal in call order, for asserting that
    /// a node was detached exactly once.
    pub fn removals(&self) -> Vec<(HostId, HostId)> {
        self.inner.lock().unwrap().removals.clone()
    }

    /// Serialize the subtree under `id` into an HTML-ish string.
    ///
    /// Props with a `null` value are skipped, matching how the engine
    /// treats them as "attribute absent".
    pub fn render_string(&self, id: HostId) -> String {
        let inner = self.inner.lock().unwrap();
        let mut out = String::new();
        if let Some(node) = inner.nodes.get(&id) {
            for &child in &node.children {
                inner.write_node(child, &mut out);
            }
        }
        out
    }
}

impl MemoryHostInner {
    fn alloc(&mut self) -> HostId {
        self.next_id += 1;
        self.next_id
    }

    fn write_node(&self, id: HostId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if let Some(text) = &node.text {
            out.push_str(text);
            return;
        }
        let tag = node.tag.as_deref().unwrap_or("node");
        out.push('<');
        out.push_str(tag);
        for (key, value) in &node.props {
            match value {
                Value::Null => {}
                Value::String(s) => {
                    out.push_str(&format!(" {key}=\"{s}\""));
                }
                other => {
                    out.push_str(&format!(" {key}=\"{other}\""));
                }
            }
        }
        out.push('>');
        for &child in &node.children {
            self.write_node(child, out);
        }
        out.push_str(&format!("</{tag}>"));
    }

    fn drop_subtree(&mut self, id: HostId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_element(&mut self, tag: &str, props: &Props) -> HostId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.alloc();
        inner.nodes.insert(
            id,
            MemNode {
                tag: Some(tag.to_owned()),
                text: None,
                props: props.clone(),
                children: Vec::new(),
            },
        );
        id
    }

    fn create_text(&mut self, text: &str) -> HostId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.alloc();
        inner.nodes.insert(
            id,
            MemNode {
                tag: None,
                text: Some(text.to_owned()),
                props: Props::new(),
                children: Vec::new(),
            },
        );
        id
    }

    fn set_text(&mut self, node: HostId, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(node) = inner.nodes.get_mut(&node) {
            node.text = Some(text.to_owned());
        }
    }

    fn update_props(&mut self, node: HostId, _prev: &Props, next: &Props) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(node) = inner.nodes.get_mut(&node) {
            node.props = next.clone();
        }
    }

    fn append(&mut self, parent: HostId, child: HostId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(parent) = inner.nodes.get_mut(&parent) {
            parent.children.push(child);
        }
    }

    fn remove(&mut self, parent: HostId, child: HostId) {
        let mut inner = self.inner.lock().unwrap();
        inner.removals.push((parent, child));
        if let Some(parent) = inner.nodes.get_mut(&parent) {
            parent.children.retain(|&c| c != child);
        }
        inner.drop_subtree(child);
    }
}

/// A headless harness bundling a [`Runtime`], a [`MemoryHost`], and one
/// container, so a test can mount, mutate, and assert in a few lines.
///
/// # Example
///
/// ```rust,ignore
/// use oolong_core::testing::TestRuntime;
/// use oolong_core::element::{host, text};
///
/// let mut rt = TestRuntime::new();
/// rt.render(host("div").child(text("hi")).build());
/// assert_eq!(rt.output(), "<div>hi</div>");
/// ```
pub struct TestRuntime {
    host: MemoryHost,
    runtime: Runtime,
    container: HostId,
}

impl TestRuntime {
    pub fn new() -> Self {
        let host = MemoryHost::new();
        let container = host.container();
        Self {
            runtime: Runtime::new(host.clone()),
            host,
            container,
        }
    }

    /// Mount (or reconcile) a view into the harness container.
    pub fn render(&mut self, view: impl Into<View>) -> NodeId {
        self.runtime.render(view, self.container).unwrap()
    }

    /// Drain queued synchronous work.
    pub fn flush(&mut self) {
        self.runtime.flush().unwrap();
    }

    /// Drain queued work and all pending async results.
    pub async fn settle(&mut self) {
        self.runtime.run_until_settled().await.unwrap();
    }

    /// Tear down the mounted root, if any.
    pub fn unmount(&mut self) -> bool {
        self.runtime.unmount_root(self.container).unwrap()
    }

    /// The committed tree, serialized for assertions.
    pub fn output(&self) -> String {
        self.host.render_string(self.container)
    }

    pub fn runtime(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    pub fn host(&self) -> &MemoryHost {
        &self.host
    }

    pub fn container(&self) -> HostId {
        self.container
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}
