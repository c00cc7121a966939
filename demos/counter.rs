//! Minimal counter: mount a component, push state updates, and print the
//! committed tree after each pass.
//!
//! Run with: `cargo run --example counter`

use oolong::element::props;
use oolong::serde_json::json;
use oolong::testing::MemoryHost;
use oolong::{component, factory_of, text, Component, Runtime, StateInit};
use oolong::{Context, HookError, Props, StateMap, View};

#[derive(Default)]
struct Counter;

impl Component for Counter {
    fn initial_state(&self, _props: &Props) -> StateInit {
        StateInit::State(props(json!({"count": 0})))
    }

    fn render(
        &self,
        _props: &Props,
        state: &StateMap,
        _context: &Context,
    ) -> Result<View, HookError> {
        Ok(text(format!("Count: {}", state["count"])))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = MemoryHost::new();
    let container = host.container();
    let mut runtime = Runtime::new(host.clone());

    let counter = factory_of::<Counter>("Counter");
    let root = runtime.render(component(&counter).build(), container)?;
    println!("{}", host.render_string(container));

    for _ in 0..3 {
        let current = runtime
            .instance(root)
            .and_then(|instance| instance.state["count"].as_i64())
            .unwrap_or(0);
        runtime.set_state(root, json!({"count": current + 1}))?;
        println!("{}", host.render_string(container));
    }

    runtime.run_until_settled().await?;
    Ok(())
}
