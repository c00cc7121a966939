//! **oolong** -- a declarative component runtime.
//!
//! This is the umbrella crate that re-exports everything you need from a
//! single dependency:
//!
//! ```toml
//! [dependencies]
//! oolong = "0.1"
//! ```
//!
//! # Re-exports
//!
//! * All public items from [`oolong_core`] are available at the crate
//!   root ([`Component`], [`View`], [`Runtime`], the view builders, and
//!   so on).
//! * [`serde_json`], [`futures`], and [`tokio`] are re-exported so
//!   downstream crates do not need to depend on them directly.
//!
//! # Quick start
//!
//! ```ignore
//! use oolong::{component, factory_of, text, Component, Runtime, StateInit};
//! use oolong::element::{props, Context, HookError, Props, StateMap, View};
//! use oolong::serde_json::json;
//!
//! #[derive(Default)]
//! struct Hello;
//!
//! impl Component for Hello {
//!     fn render(
//!         &self,
//!         props: &Props,
//!         _state: &StateMap,
//!         _context: &Context,
//!     ) -> Result<View, HookError> {
//!         Ok(text(format!("Hello, {}!", props["name"])))
//!     }
//! }
//!
//! let hello = factory_of::<Hello>("Hello");
//! let mut runtime = Runtime::new(adapter);
//! runtime.render(component(&hello).prop("name", "oolong").build(), container)?;
//! ```

pub use oolong_core::*;

// Re-export dependencies for use in downstream crates
pub use futures;
pub use serde_json;
pub use tokio;
