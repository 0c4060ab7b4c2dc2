use crate::{
    counter::{Counter, CounterLib},
    dom::{Document, Element, ElementId, EventType},
    instance::Instance,
    module::Module,
    store::Store,
};
use anyhow::{Context, Result};
use std::{future::Future, io, path::PathBuf, rc::Rc};
use tracing::{debug, error, info, warn};

pub const BUTTON_SELECTOR: &str = ".some-button";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// When unset the runtime is torn down right after instantiation.
    pub no_exit_runtime: bool,
}

impl InitOptions {
    pub fn keep_alive() -> Self {
        Self {
            no_exit_runtime: true,
        }
    }
}

pub struct Runtime {
    pub store: Store,
    pub instance: Instance,
}

pub async fn fetch(path: PathBuf) -> io::Result<Vec<u8>> {
    tokio::fs::read(path).await
}

pub async fn initialize<S>(source: S, options: InitOptions) -> Result<Runtime>
where
    S: Future<Output = io::Result<Vec<u8>>>,
{
    let bytes = source.await.context("failed to fetch module")?;
    let module = Module::from_source(&bytes)?;

    let mut store = Store::default();
    let instance = Instance::new(&mut store, &module)?;
    if !options.no_exit_runtime {
        instance.exit(&mut store)?;
    }
    info!(exports = module.exports.len(), "module instantiated");

    Ok(Runtime { store, instance })
}

#[derive(Debug)]
pub struct ButtonBinding {
    counter: Rc<Counter>,
    buttons: Vec<ElementId>,
}

impl ButtonBinding {
    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    pub fn buttons(&self) -> &[ElementId] {
        &self.buttons
    }
}

/// Creates one counter and registers a click listener on every element
/// currently matching `selector`. Elements added later are not bound.
pub fn attach(
    document: &mut Document,
    lib: &Rc<CounterLib>,
    selector: &str,
) -> Result<ButtonBinding> {
    let counter = Rc::new(lib.create()?);
    let buttons = document.query_selector_all(selector)?;

    for &id in &buttons {
        let counter = Rc::clone(&counter);
        document.add_event_listener(id, EventType::Click, move |button| {
            on_click(&counter, button)
        })?;
    }
    info!(count = buttons.len(), selector, "attached click listeners");

    Ok(ButtonBinding { counter, buttons })
}

/// Load, bind, sanity-check `add`, attach to `.some-button`. Needs
/// [`InitOptions::keep_alive`]: with the default options the runtime exits
/// before `add` is called and this fails with `Trap::RuntimeExited`.
pub async fn start<S>(
    document: &mut Document,
    source: S,
    options: InitOptions,
) -> Result<ButtonBinding>
where
    S: Future<Output = io::Result<Vec<u8>>>,
{
    let runtime = initialize(source, options).await?;
    let lib = CounterLib::bind(runtime)?;

    info!("Calling wasm functions from rust!");
    let sum = lib.add(1, 2, 3)?;
    info!(sum, "add(1, 2, 3)");

    attach(document, &lib, BUTTON_SELECTOR)
}

pub fn button_label(value: i32) -> String {
    format!("Button: {value}")
}

/// Clicks the elements at `indices` (document order) and returns how many
/// listeners ran in total.
pub fn replay_clicks(document: &mut Document, indices: &[usize]) -> Result<usize> {
    let ids: Vec<ElementId> = document.elements().map(|(id, _)| id).collect();
    let mut ran = 0;
    for &index in indices {
        let id = *ids
            .get(index)
            .with_context(|| format!("page has no element {index}"))?;
        match document.dispatch(id, EventType::Click)? {
            0 => warn!(index, "clicked an element without a listener"),
            n => ran += n,
        }
    }
    Ok(ran)
}

fn on_click(counter: &Counter, button: &mut Element) {
    debug!("click");
    if let Err(err) = render_click(counter, button) {
        error!(handle = counter.handle(), "click handler failed: {err:#}");
    }
}

fn render_click(counter: &Counter, button: &mut Element) -> Result<()> {
    counter.increment()?;
    // read for diagnostics only
    debug!(
        x = ?button.get_attribute("data-x"),
        y = ?button.get_attribute("data-y"),
        "button data"
    );
    let value = counter.get()?;
    button.set_text_content(button_label(value));
    Ok(())
}
