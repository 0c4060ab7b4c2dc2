use crate::{error::LinkError, instance::Instance, module::Module, value::Value};
use anyhow::Result;
use std::{
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
};

static NEXT_STORE_ID: AtomicUsize = AtomicUsize::new(0);

/// Owns the runtime state of every instance created in it. An `Instance`
/// handed to a store other than the one that created it is rejected with
/// [`LinkError::ForeignInstance`].
pub struct Store {
    id: usize,
    instances: Vec<InstanceData>,
}

pub(crate) struct InstanceData {
    pub module: Rc<Module>,
    pub memory: Vec<u8>,
    pub max_pages: Option<u32>,
    pub globals: Vec<Value>,
    pub exited: bool,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            instances: Vec::new(),
        }
    }
}

impl Store {
    pub(crate) fn push(&mut self, data: InstanceData) -> Instance {
        self.instances.push(data);
        Instance::from_parts(self.id, self.instances.len() - 1)
    }

    pub(crate) fn data(&self, instance: Instance) -> Result<&InstanceData> {
        self.check(instance)?;
        self.instances
            .get(instance.index())
            .ok_or_else(|| self.foreign(instance).into())
    }

    pub(crate) fn data_mut(&mut self, instance: Instance) -> Result<&mut InstanceData> {
        self.check(instance)?;
        let err = self.foreign(instance);
        self.instances
            .get_mut(instance.index())
            .ok_or_else(|| err.into())
    }

    fn check(&self, instance: Instance) -> Result<(), LinkError> {
        if instance.store_id() == self.id {
            Ok(())
        } else {
            Err(self.foreign(instance))
        }
    }

    fn foreign(&self, instance: Instance) -> LinkError {
        LinkError::ForeignInstance {
            instance: instance.index(),
            owner: instance.store_id(),
            store: self.id,
        }
    }
}
