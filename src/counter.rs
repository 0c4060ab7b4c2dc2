use crate::{
    binding::Runtime,
    instance::{Instance, TypedFunc},
    store::Store,
    value::{Value, WasmParams, WasmResults},
};
use anyhow::{Context, Result};
use std::{cell::RefCell, fmt, rc::Rc};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct CounterApi {
    pub add: TypedFunc<(i32, i32, i32), i32>,
    pub create: TypedFunc<(), i32>,
    pub increment: TypedFunc<i32, ()>,
    pub decrement: TypedFunc<i32, ()>,
    pub set: TypedFunc<(i32, i32), ()>,
    pub get: TypedFunc<i32, i32>,
    pub destroy: TypedFunc<i32, ()>,
}

impl CounterApi {
    pub fn bind(instance: &Instance, store: &Store) -> Result<Self> {
        Ok(Self {
            add: instance.exported_func(store, "add")?,
            create: instance.exported_func(store, "counter_create")?,
            increment: instance.exported_func(store, "counter_increment")?,
            decrement: instance.exported_func(store, "counter_decrement")?,
            set: instance.exported_func(store, "counter_set")?,
            get: instance.exported_func(store, "counter_get")?,
            destroy: instance.exported_func(store, "counter_destroy")?,
        })
    }
}

pub struct CounterLib {
    store: RefCell<Store>,
    instance: Instance,
    api: CounterApi,
}

impl CounterLib {
    pub fn bind(runtime: Runtime) -> Result<Rc<Self>> {
        let Runtime { store, instance } = runtime;
        let api = CounterApi::bind(&instance, &store)
            .context("module does not provide the counter library")?;
        debug!("bound counter library exports");

        Ok(Rc::new(Self {
            store: RefCell::new(store),
            instance,
            api,
        }))
    }

    pub fn add(&self, a: i32, b: i32, c: i32) -> Result<i32> {
        self.call(&self.api.add, (a, b, c))
    }

    pub fn create(self: &Rc<Self>) -> Result<Counter> {
        let handle = self.call(&self.api.create, ())?;
        debug!(handle, "created counter");
        Ok(Counter {
            lib: Rc::clone(self),
            handle,
            released: false,
        })
    }

    pub fn read_global(&self, name: &str) -> Result<Value> {
        let store = self.store.try_borrow().context("counter library is busy")?;
        self.instance.get_global(&store, name)
    }

    fn call<P, R>(&self, func: &TypedFunc<P, R>, params: P) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let mut store = self
            .store
            .try_borrow_mut()
            .context("counter library re-entered")?;
        func.call(&mut store, params)
    }
}

impl fmt::Debug for CounterLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterLib")
            .field("instance", &self.instance)
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

/// Owns one `i32` handle and destroys it exactly once, explicitly or on drop.
pub struct Counter {
    lib: Rc<CounterLib>,
    handle: i32,
    released: bool,
}

impl Counter {
    pub fn handle(&self) -> i32 {
        self.handle
    }

    pub fn lib(&self) -> &Rc<CounterLib> {
        &self.lib
    }

    pub fn increment(&self) -> Result<()> {
        self.lib.call(&self.lib.api.increment, self.handle)
    }

    pub fn decrement(&self) -> Result<()> {
        self.lib.call(&self.lib.api.decrement, self.handle)
    }

    pub fn set(&self, count: i32) -> Result<()> {
        self.lib.call(&self.lib.api.set, (self.handle, count))
    }

    pub fn get(&self) -> Result<i32> {
        self.lib.call(&self.lib.api.get, self.handle)
    }

    pub fn destroy(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.released, true) {
            return Ok(());
        }
        debug!(handle = self.handle, "destroying counter");
        self.lib.call(&self.lib.api.destroy, self.handle)
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(handle = self.handle, "failed to destroy counter: {err:#}");
        }
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish()
    }
}
