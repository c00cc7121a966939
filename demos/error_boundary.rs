//! An error boundary recovering from a failing child render.
//!
//! Run with: `cargo run --example error_boundary`

use oolong::testing::MemoryHost;
use oolong::{component, factory_of, function, text, Catch, Component, Link, Phase, Runtime};
use oolong::{Context, HookError, Props, StateMap, View};

#[derive(Default)]
struct Boundary;

impl Component for Boundary {
    fn render(
        &self,
        _props: &Props,
        _state: &StateMap,
        _context: &Context,
    ) -> Result<View, HookError> {
        Ok(function(|_| Err("the child exploded".into())).build())
    }

    fn did_catch(
        &mut self,
        error: &(dyn std::error::Error + Send + Sync),
        phase: Phase,
        _link: &mut Link<'_>,
    ) -> Catch {
        Catch::Recover(text(format!("recovered from a {phase} error: {error}")))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = MemoryHost::new();
    let container = host.container();
    let mut runtime = Runtime::new(host.clone());

    let boundary = factory_of::<Boundary>("Boundary");
    runtime.render(component(&boundary).build(), container)?;
    println!("{}", host.render_string(container));
    Ok(())
}
