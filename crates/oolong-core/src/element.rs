use crate::component::ComponentFactory;
use crate::refs::Ref;
use std::fmt;
use std::sync::Arc;

/// Dynamic value carried in props, state, and context maps.
pub type Value = serde_json::Value;

/// Immutable-per-render input data for a component or host element.
pub type Props = serde_json::Map<String, Value>;

/// A component instance's state. Merges are always shallow.
pub type StateMap = serde_json::Map<String, Value>;

/// Ambient data inherited from ancestor components via `child_context`.
pub type Context = serde_json::Map<String, Value>;

/// Error raised by application hook code (constructors, render, updaters).
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A plain render function standing in for a full component.
pub type RenderFn = dyn Fn(&Props) -> Result<View, HookError> + Send + Sync;

/// Convert a `serde_json::json!({..})` object literal into a [`Props`] map.
///
/// Non-object values yield an empty map.
pub fn props(value: Value) -> Props {
    match value {
        Value::Object(map) => map,
        _ => Props::new(),
    }
}

/// Shallow-merge `from` over `into`, replacing colliding keys.
pub fn shallow_merge(into: &mut StateMap, from: StateMap) {
    for (key, value) in from {
        into.insert(key, value);
    }
}

/// What produced a [`View`] node, resolved once at construction.
///
/// The runtime switches on this closed set instead of probing shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// A class-like component constructed through a [`ComponentFactory`].
    Stateful,
    /// A plain render function with no lifecycle of its own.
    Function,
    /// A host intrinsic (e.g. a DOM tag) realized by the host adapter.
    Host,
    /// A text node.
    Text,
    /// A grouping node with no host representation.
    Fragment,
    /// Nothing to render.
    Empty,
}

/// The resolved producer of a component element.
///
/// Identity (for reconciliation) is pointer identity of the inner `Arc`:
/// two views share a definition only if they were built from the same
/// factory or function value.
#[derive(Clone)]
pub enum ComponentDef {
    /// Constructs a boxed component instance; construction may fail.
    Stateful(Arc<dyn ComponentFactory>),
    /// A render-only function. The runtime synthesizes a throwaway
    /// instance wrapping it.
    Function(Arc<RenderFn>),
}

impl ComponentDef {
    /// Display name used in error messages and trace output.
    pub fn name(&self) -> &str {
        match self {
            ComponentDef::Stateful(factory) => factory.name(),
            ComponentDef::Function(_) => "anonymous",
        }
    }

    /// Whether two definitions refer to the same component type.
    pub fn same(&self, other: &ComponentDef) -> bool {
        match (self, other) {
            (ComponentDef::Stateful(a), ComponentDef::Stateful(b)) => Arc::ptr_eq(a, b),
            (ComponentDef::Function(a), ComponentDef::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn default_props(&self) -> Option<Props> {
        match self {
            ComponentDef::Stateful(factory) => factory.default_props(),
            ComponentDef::Function(_) => None,
        }
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentDef(<{}>)", self.name())
    }
}

/// A declarative description of a node, produced by a render call.
///
/// Views are cheap descriptions; the runtime turns them into retained
/// [`Node`](crate::tree::Node)s on mount. Construction is pure and cannot
/// fail for well-formed input.
#[derive(Debug, Clone)]
pub enum View {
    /// Nothing. Mounts as a placeholder with no host node.
    Empty,
    /// A text node.
    Text(String),
    /// A host intrinsic with a tag, props, an optional ref, and children.
    Host(HostView),
    /// A component element.
    Component(ComponentView),
    /// An ordered group of children with no host node of its own.
    Fragment(Vec<View>),
}

/// The body of a [`View::Host`] node.
#[derive(Debug, Clone)]
pub struct HostView {
    pub tag: String,
    pub props: Props,
    pub node_ref: Option<Ref>,
    pub children: Vec<View>,
}

/// The body of a [`View::Component`] node.
#[derive(Debug, Clone)]
pub struct ComponentView {
    pub def: ComponentDef,
    pub props: Props,
    pub node_ref: Option<Ref>,
}

impl View {
    /// The resolved kind of this view.
    pub fn kind(&self) -> ComponentKind {
        match self {
            View::Empty => ComponentKind::Empty,
            View::Text(_) => ComponentKind::Text,
            View::Host(_) => ComponentKind::Host,
            View::Component(view) => match view.def {
                ComponentDef::Stateful(_) => ComponentKind::Stateful,
                ComponentDef::Function(_) => ComponentKind::Function,
            },
            View::Fragment(_) => ComponentKind::Fragment,
        }
    }

    /// Canonicalize a render result: flatten nested fragments and collapse
    /// an empty fragment into [`View::Empty`].
    pub fn normalize(self) -> View {
        match self {
            View::Fragment(children) => {
                let mut flat = Vec::with_capacity(children.len());
                flatten_into(children, &mut flat);
                if flat.is_empty() {
                    View::Empty
                } else {
                    View::Fragment(flat)
                }
            }
            other => other,
        }
    }
}

fn flatten_into(children: Vec<View>, out: &mut Vec<View>) {
    for child in children {
        match child {
            View::Fragment(inner) => flatten_into(inner, out),
            other => out.push(other),
        }
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        View::Text(text.to_owned())
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        View::Text(text)
    }
}

impl From<Vec<View>> for View {
    fn from(children: Vec<View>) -> Self {
        View::Fragment(children)
    }
}

impl From<Option<View>> for View {
    fn from(view: Option<View>) -> Self {
        view.unwrap_or(View::Empty)
    }
}

/// Build a text view.
pub fn text(content: impl fmt::Display) -> View {
    View::Text(content.to_string())
}

/// Build a fragment from an iterator of child views.
pub fn fragment(children: impl IntoIterator<Item = View>) -> View {
    View::Fragment(children.into_iter().collect())
}

/// Start building a host view for the given tag.
pub fn host(tag: impl Into<String>) -> HostBuilder {
    HostBuilder {
        tag: tag.into(),
        props: Props::new(),
        node_ref: None,
        children: Vec::new(),
    }
}

/// Start building a component view from a factory.
pub fn component(factory: &Arc<dyn ComponentFactory>) -> ComponentBuilder {
    ComponentBuilder {
        def: ComponentDef::Stateful(factory.clone()),
        props: Props::new(),
        node_ref: None,
    }
}

/// Start building a component view from a plain render function.
pub fn function(
    render: impl Fn(&Props) -> Result<View, HookError> + Send + Sync + 'static,
) -> ComponentBuilder {
    ComponentBuilder {
        def: ComponentDef::Function(Arc::new(render)),
        props: Props::new(),
        node_ref: None,
    }
}

/// Builder for [`View::Host`] nodes.
///
/// Follows the chained-setter pattern: `host("div").prop("id", 1).child(..)`.
#[derive(Debug, Clone)]
pub struct HostBuilder {
    tag: String,
    props: Props,
    node_ref: Option<Ref>,
    children: Vec<View>,
}

impl HostBuilder {
    /// Set a single prop.
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Replace the whole props map.
    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Request a ref to the resolved host node.
    pub fn node_ref(mut self, node_ref: Ref) -> Self {
        self.node_ref = Some(node_ref);
        self
    }

    /// Append a child view.
    pub fn child(mut self, child: impl Into<View>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several child views.
    pub fn children(mut self, children: impl IntoIterator<Item = View>) -> Self {
        self.children.extend(children);
        self
    }

    /// Finish building.
    pub fn build(self) -> View {
        View::Host(HostView {
            tag: self.tag,
            props: self.props,
            node_ref: self.node_ref,
            children: self.children,
        })
    }
}

impl From<HostBuilder> for View {
    fn from(builder: HostBuilder) -> Self {
        builder.build()
    }
}

/// Builder for [`View::Component`] nodes.
#[derive(Debug, Clone)]
pub struct ComponentBuilder {
    def: ComponentDef,
    props: Props,
    node_ref: Option<Ref>,
}

impl ComponentBuilder {
    /// Set a single prop.
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Replace the whole props map.
    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Request a ref to the mounted component instance.
    pub fn node_ref(mut self, node_ref: Ref) -> Self {
        self.node_ref = Some(node_ref);
        self
    }

    /// Finish building. Factory default props are merged beneath the
    /// props set on the builder.
    pub fn build(self) -> View {
        let props = match self.def.default_props() {
            Some(mut defaults) => {
                shallow_merge(&mut defaults, self.props);
                defaults
            }
            None => self.props,
        };
        View::Component(ComponentView {
            def: self.def,
            props,
            node_ref: self.node_ref,
        })
    }
}

impl From<ComponentBuilder> for View {
    fn from(builder: ComponentBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_is_resolved_at_construction() {
        assert_eq!(View::Empty.kind(), ComponentKind::Empty);
        assert_eq!(text("hi").kind(), ComponentKind::Text);
        assert_eq!(host("div").build().kind(), ComponentKind::Host);
        assert_eq!(fragment([]).kind(), ComponentKind::Fragment);
        assert_eq!(
            function(|_| Ok(View::Empty)).build().kind(),
            ComponentKind::Function
        );
    }

    #[test]
    fn normalize_flattens_nested_fragments() {
        let view = fragment([
            text("a"),
            fragment([text("b"), fragment([text("c")])]),
        ])
        .normalize();
        match view {
            View::Fragment(children) => assert_eq!(children.len(), 3),
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn normalize_collapses_empty_fragment() {
        assert!(matches!(fragment([]).normalize(), View::Empty));
    }

    #[test]
    fn shallow_merge_replaces_colliding_keys() {
        let mut base = props(json!({"a": 1, "b": 2}));
        shallow_merge(&mut base, props(json!({"b": 3, "c": 4})));
        assert_eq!(Value::Object(base), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn function_defs_compare_by_identity() {
        let a = function(|_| Ok(View::Empty)).build();
        let b = a.clone();
        let c = function(|_| Ok(View::Empty)).build();
        let (View::Component(a), View::Component(b), View::Component(c)) = (a, b, c) else {
            panic!("expected component views");
        };
        assert!(a.def.same(&b.def));
        assert!(!a.def.same(&c.def));
    }

    #[test]
    fn host_builder_sets_props_and_children() {
        let View::Host(view) = host("div").prop("id", 1).child(text("x")).build() else {
            panic!("expected host view");
        };
        assert_eq!(view.tag, "div");
        assert_eq!(view.props.get("id"), Some(&json!(1)));
        assert_eq!(view.children.len(), 1);
    }
}
