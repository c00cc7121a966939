//! Core runtime for the **oolong** declarative UI engine.
//!
//! `oolong-core` owns the component lifecycle: applications describe what
//! the UI should look like as a tree of [`View`] values, and the runtime
//! mounts, updates, and unmounts long-lived component instances to match,
//! committing the physical changes through a pluggable [`HostAdapter`].
//!
//! # Key types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`View`] | Cheap declarative description of a node, produced by render |
//! | [`Component`] | Lifecycle hooks for a stateful component |
//! | [`ComponentFactory`] | Constructs component instances for a definition |
//! | [`Runtime`] | Owns the retained tree, the root registry, and the work queue |
//! | [`Link`] | Handle hooks use to request further updates, always deferred |
//! | [`HostAdapter`] | Commit seam: creates and mutates physical nodes |
//! | [`TestRuntime`](testing::TestRuntime) | Headless harness for unit tests |
//!
//! # Architecture
//!
//! 1. **describe** -- Application code builds a [`View`] tree with the
//!    [`host`], [`text`], [`component`], and [`fragment`] builders.
//! 2. **mount** -- [`Runtime::render`] turns views into retained nodes,
//!    constructing an instance per component and running its mount hooks
//!    (`initial_state` -> `child_context` -> `render`).
//! 3. **update** -- [`Runtime::set_state`] and [`Runtime::force_update`]
//!    drive update passes through an explicit guard pipeline
//!    (`will_receive_props` -> `should_update` -> `will_update` ->
//!    `render` -> `did_update`), then reconcile the child tree in place.
//! 4. **recover** -- A hook error walks ancestors for the nearest
//!    `did_catch` boundary; its recovery view replaces the failing
//!    subtree.
//! 5. **unmount** -- Teardown runs `will_unmount`; a deferred teardown
//!    parks the subtree and removes host nodes once its future settles.
//!
//! Asynchronous inputs (deferred initial state, remote state, deferred
//! teardowns) resolve through the runtime's work queue; drive them with
//! [`Runtime::run_until_settled`].
//!
//! # Quick example
//!
//! ```ignore
//! use oolong_core::{component, factory_of, text, Component, Runtime, StateInit};
//! use oolong_core::element::{props, Context, HookError, Props, StateMap, View};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Counter;
//!
//! impl Component for Counter {
//!     fn initial_state(&self, _props: &Props) -> StateInit {
//!         StateInit::State(props(json!({"count": 0})))
//!     }
//!
//!     fn render(
//!         &self,
//!         _props: &Props,
//!         state: &StateMap,
//!         _context: &Context,
//!     ) -> Result<View, HookError> {
//!         Ok(text(format!("Count: {}", state["count"])))
//!     }
//! }
//!
//! let counter = factory_of::<Counter>("Counter");
//! let mut runtime = Runtime::new(my_host_adapter);
//! let root = runtime.render(component(&counter).build(), container)?;
//! runtime.set_state(root, json!({"count": 1}))?;
//! ```

pub mod component;
pub mod element;
pub mod error;
pub mod host;
mod reconcile;
pub mod refs;
pub mod runtime;
pub mod schedule;
pub mod testing;
pub mod tree;

pub use component::{
    factory_of, Catch, Component, ComponentFactory, Instance, StateInit, Teardown,
};
pub use element::{
    component, fragment, function, host, text, ComponentBuilder, ComponentDef, ComponentKind,
    Context, HookError, HostBuilder, Props, StateMap, Value, View,
};
pub use error::{Phase, RuntimeError};
pub use host::{HostAdapter, HostId};
pub use refs::{Ref, RefValue};
pub use runtime::Runtime;
pub use schedule::{Link, StateUpdate, UpdateCause};
pub use tree::{NodeId, WorkState};
