use crate::element::{Context, HookError, Props, RenderFn, StateMap, View};
use crate::error::Phase;
use crate::refs::RefValue;
use crate::schedule::Link;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of the `initial_state` hook.
pub enum StateInit {
    /// No hook, or the hook declined: keep the current (default) state.
    Unset,
    /// Use this map verbatim as the initial state.
    State(StateMap),
    /// The initial state arrives later; its resolution becomes a deferred
    /// `set_state`. The synchronous mount proceeds with the current state.
    Deferred(BoxFuture<'static, Result<StateMap, HookError>>),
    /// Compatibility shim: a boolean result means "no state" and falls
    /// through to the current state. Kept for parity with legacy callers,
    /// not a designed feature.
    Legacy(bool),
}

/// Result of the `will_unmount` hook.
pub enum Teardown {
    /// Remove host nodes immediately.
    Immediate,
    /// Park the subtree and remove host nodes only once the future
    /// settles. The unmount call itself returns without blocking.
    Deferred(BoxFuture<'static, ()>),
}

/// Result of the `did_catch` hook.
pub enum Catch {
    /// Not handled here; keep searching outward.
    Propagate,
    /// Handled: this view replaces the failing subtree.
    Recover(View),
}

/// Lifecycle hooks for a stateful component.
///
/// Every hook has a default implementation standing in for "hook absent",
/// so implementors override only what they need. Hooks that may trigger
/// further updates receive a [`Link`]; updates requested through it are
/// always deferred past the current pass.
///
/// Hook order is fixed: on mount `initial_state` -> `child_context` ->
/// `render`; on update `will_receive_props` -> `should_update` ->
/// `will_update` -> `render` -> `did_update`; `will_unmount` on teardown.
pub trait Component: Send + 'static {
    /// Produce the child view for the current props, state, and context.
    fn render(&self, props: &Props, state: &StateMap, context: &Context)
        -> Result<View, HookError>;

    /// Compute the initial state at mount.
    fn initial_state(&self, props: &Props) -> StateInit {
        let _ = props;
        StateInit::Unset
    }

    /// Contribute context entries inherited by descendants. Returning
    /// `Some` merges the entries into this element's context on every
    /// mount and update pass.
    fn child_context(&self, props: &Props, state: &StateMap, context: &Context) -> Option<Context> {
        let _ = (props, state, context);
        None
    }

    /// Incoming props are about to be committed.
    fn will_receive_props(&mut self, next_props: &Props, context: &Context, link: &mut Link<'_>) {
        let _ = (next_props, context, link);
    }

    /// Decide whether the pending update should proceed. `false` aborts
    /// the pass before anything is committed.
    fn should_update(&self, next_props: &Props, next_state: &StateMap, context: &Context) -> bool {
        let _ = (next_props, next_state, context);
        true
    }

    /// The update passed its guards and is about to commit.
    fn will_update(
        &mut self,
        next_props: &Props,
        next_state: &StateMap,
        context: &Context,
        link: &mut Link<'_>,
    ) {
        let _ = (next_props, next_state, context, link);
    }

    /// The update committed and the child tree was reconciled. Receives
    /// the pre-update props and state.
    fn did_update(
        &mut self,
        prev_props: &Props,
        prev_state: &StateMap,
        context: &Context,
        link: &mut Link<'_>,
    ) {
        let _ = (prev_props, prev_state, context, link);
    }

    /// The component is about to be removed. Return
    /// [`Teardown::Deferred`] to keep the host subtree alive until the
    /// future settles.
    fn will_unmount(&mut self) -> Teardown {
        Teardown::Immediate
    }

    /// A descendant raised an error. Return [`Catch::Recover`] to replace
    /// the failing subtree; the boundary may also schedule its own
    /// corrective update through `link`.
    fn did_catch(
        &mut self,
        error: &(dyn std::error::Error + Send + Sync),
        phase: Phase,
        link: &mut Link<'_>,
    ) -> Catch {
        let _ = (error, phase, link);
        Catch::Propagate
    }
}

/// Constructs component instances for
/// [`ComponentDef::Stateful`](crate::element::ComponentDef::Stateful) views.
pub trait ComponentFactory: Send + Sync {
    /// Display name used in error messages and trace output.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Props merged beneath user props when a view is built.
    fn default_props(&self) -> Option<Props> {
        None
    }

    /// Construct an instance. Failures route to the nearest error
    /// boundary with phase [`Phase::Constructor`].
    fn create(&self, props: &Props, context: &Context) -> Result<Box<dyn Component>, HookError>;
}

/// Factory for components constructible via [`Default`].
pub struct DefaultFactory<C> {
    name: &'static str,
    _marker: std::marker::PhantomData<fn() -> C>,
}

impl<C: Component + Default> ComponentFactory for DefaultFactory<C> {
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self, _props: &Props, _context: &Context) -> Result<Box<dyn Component>, HookError> {
        Ok(Box::new(C::default()))
    }
}

/// Make a named factory for a `Default`-constructible component.
pub fn factory_of<C: Component + Default>(name: &'static str) -> Arc<dyn ComponentFactory> {
    Arc::new(DefaultFactory::<C> {
        name,
        _marker: std::marker::PhantomData,
    })
}

/// The long-lived object backing a mounted component element.
///
/// Created once at mount, reused across updates, discarded at unmount.
pub struct Instance {
    /// Props committed by the most recent pass.
    pub props: Props,
    /// State committed by the most recent pass. Always a map; merges are
    /// shallow.
    pub state: StateMap,
    /// Context resolved for this element (ancestor context plus this
    /// component's own `child_context` contribution).
    pub context: Context,
    /// Resolved string-key refs. `None` marks a key whose target has
    /// unmounted.
    pub refs: HashMap<String, Option<RefValue>>,
    /// The user component the hooks are dispatched to.
    pub component: Box<dyn Component>,
}

impl Instance {
    pub(crate) fn new(component: Box<dyn Component>, props: Props, context: Context) -> Self {
        Self {
            props,
            state: StateMap::new(),
            context,
            refs: HashMap::new(),
            component,
        }
    }
}

/// Synthesized instance for a plain render function: the function is its
/// `render`, every other hook is absent.
pub(crate) struct FunctionComponent(pub(crate) Arc<RenderFn>);

impl Component for FunctionComponent {
    fn render(
        &self,
        props: &Props,
        _state: &StateMap,
        _context: &Context,
    ) -> Result<View, HookError> {
        (self.0)(props)
    }
}

/// No-op instance installed when a constructor fails but a boundary
/// recovered, so the mount can proceed without crashing the tree.
pub(crate) struct NullComponent;

impl Component for NullComponent {
    fn render(
        &self,
        _props: &Props,
        _state: &StateMap,
        _context: &Context,
    ) -> Result<View, HookError> {
        Ok(View::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element;

    #[derive(Default)]
    struct Plain;

    impl Component for Plain {
        fn render(
            &self,
            _props: &Props,
            _state: &StateMap,
            _context: &Context,
        ) -> Result<View, HookError> {
            Ok(element::text("plain"))
        }
    }

    #[test]
    fn default_factory_uses_given_name() {
        let factory = factory_of::<Plain>("Plain");
        assert_eq!(factory.name(), "Plain");
        assert!(factory.default_props().is_none());
    }

    #[test]
    fn default_hooks_are_neutral() {
        let plain = Plain;
        assert!(plain.should_update(&Props::new(), &StateMap::new(), &Context::new()));
        assert!(matches!(plain.initial_state(&Props::new()), StateInit::Unset));
        assert!(plain
            .child_context(&Props::new(), &StateMap::new(), &Context::new())
            .is_none());
    }

    #[test]
    fn function_component_delegates_render() {
        let render: Arc<RenderFn> = Arc::new(|props: &Props| {
            Ok(element::text(format!(
                "fn:{}",
                props.get("n").cloned().unwrap_or_default()
            )))
        });
        let instance = FunctionComponent(render);
        let view = instance
            .render(
                &element::props(serde_json::json!({"n": 1})),
                &StateMap::new(),
                &Context::new(),
            )
            .unwrap();
        assert!(matches!(view, View::Text(text) if text == "fn:1"));
    }
}
