use crate::{
    error::{LinkError, Trap},
    exec,
    module::{ConstExpr, ExternKind, FuncType, Module, PAGE_SIZE},
    store::{InstanceData, Store},
    value::{Value, WasmParams, WasmResults},
};
use anyhow::{bail, ensure, Context, Result};
use std::{fmt, marker::PhantomData, rc::Rc};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instance {
    store: usize,
    index: usize,
}

impl Instance {
    pub(crate) fn from_parts(store: usize, index: usize) -> Self {
        Self { store, index }
    }

    pub(crate) fn store_id(&self) -> usize {
        self.store
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub fn new(store: &mut Store, module: &Module) -> Result<Self> {
        let mut globals = Vec::with_capacity(module.globals.len());
        for global in &module.globals {
            let value = eval_const(&global.init, &globals)?;
            ensure!(
                value.ty() == global.ty,
                "global initialiser has type {}, declared {}",
                value.ty(),
                global.ty
            );
            globals.push(value);
        }

        let (mut memory, max_pages) = match module.memory {
            Some(ty) => (vec![0; ty.min as usize * PAGE_SIZE], ty.max),
            None => (Vec::new(), Some(0)),
        };
        for (index, segment) in module.data.iter().enumerate() {
            let Some(offset) = &segment.offset else {
                continue;
            };
            let offset = match eval_const(offset, &globals)? {
                Value::I32(v) => v as u32 as usize,
                other => bail!("data segment offset must be i32, found {}", other.ty()),
            };
            let end = offset
                .checked_add(segment.bytes.len())
                .filter(|end| *end <= memory.len())
                .ok_or(LinkError::DataSegmentOutOfBounds { index })?;
            memory[offset..end].copy_from_slice(&segment.bytes);
        }

        let instance = store.push(InstanceData {
            module: Rc::new(module.clone()),
            memory,
            max_pages,
            globals,
            exited: false,
        });

        if let Some(start) = module.start {
            debug!(start, "running start function");
            exec::invoke(store.data_mut(instance)?, start, Vec::new())
                .context("start function failed")?;
        }

        Ok(instance)
    }

    pub fn get_func(&self, store: &Store, name: &str) -> Result<Func> {
        let data = store.data(*self)?;
        let export = data
            .module
            .export(name)
            .ok_or_else(|| LinkError::MissingExport(name.to_string()))?;
        if export.kind != ExternKind::Func {
            return Err(LinkError::NotAFunction {
                name: name.to_string(),
                kind: export.kind.as_str(),
            }
            .into());
        }
        let ty = data
            .module
            .funcs
            .get(export.idx as usize)
            .map(|func| func.ty.clone())
            .with_context(|| format!("export `{name}` refers to a missing function"))?;

        Ok(Func {
            instance: *self,
            index: export.idx,
            name: name.to_string(),
            ty,
        })
    }

    /// Binds an export under a declared Rust signature. The declaration is
    /// checked against the export table here, not at call time.
    pub fn exported_func<P, R>(&self, store: &Store, name: &str) -> Result<TypedFunc<P, R>>
    where
        P: WasmParams,
        R: WasmResults,
    {
        self.get_func(store, name)?.typed()
    }

    pub fn get_global(&self, store: &Store, name: &str) -> Result<Value> {
        let data = store.data(*self)?;
        let export = data
            .module
            .export(name)
            .filter(|export| export.kind == ExternKind::Global)
            .ok_or_else(|| LinkError::MissingExport(name.to_string()))?;
        data.globals
            .get(export.idx as usize)
            .copied()
            .with_context(|| format!("export `{name}` refers to a missing global"))
    }

    pub fn exports(&self, store: &Store) -> Result<Vec<ExportDesc>> {
        let data = store.data(*self)?;
        Ok(data
            .module
            .exports
            .iter()
            .map(|export| ExportDesc {
                name: export.name.clone(),
                kind: export.kind,
                ty: match export.kind {
                    ExternKind::Func => data
                        .module
                        .funcs
                        .get(export.idx as usize)
                        .map(|func| func.ty.clone()),
                    _ => None,
                },
            })
            .collect())
    }

    /// Tears the runtime down. Every later call through a binding fails
    /// with [`Trap::RuntimeExited`].
    pub fn exit(&self, store: &mut Store) -> Result<()> {
        store.data_mut(*self)?.exited = true;
        debug!("runtime exited");
        Ok(())
    }

    pub fn is_exited(&self, store: &Store) -> Result<bool> {
        Ok(store.data(*self)?.exited)
    }
}

fn eval_const(expr: &ConstExpr, globals: &[Value]) -> Result<Value> {
    Ok(match expr {
        ConstExpr::I32(v) => Value::I32(*v),
        ConstExpr::I64(v) => Value::I64(*v),
        ConstExpr::F32(v) => Value::F32(*v),
        ConstExpr::F64(v) => Value::F64(*v),
        ConstExpr::GlobalGet(idx) => globals
            .get(*idx as usize)
            .copied()
            .with_context(|| format!("constant expression reads uninitialised global {idx}"))?,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportDesc {
    pub name: String,
    pub kind: ExternKind,
    pub ty: Option<FuncType>,
}

impl fmt::Display for ExportDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.name)?;
        if let Some(ty) = &self.ty {
            write!(f, ": {ty}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Func {
    instance: Instance,
    index: u32,
    name: String,
    ty: FuncType,
}

impl Func {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    pub fn call(&self, store: &mut Store, args: &[Value]) -> Result<Vec<Value>> {
        let matches = args.len() == self.ty.params.len()
            && args
                .iter()
                .zip(&self.ty.params)
                .all(|(arg, ty)| arg.ty() == *ty);
        if !matches {
            return Err(Trap::ArgumentMismatch {
                expected: self.ty.clone(),
            }
            .into());
        }
        self.call_unchecked(store, args.to_vec())
    }

    pub fn typed<P, R>(self) -> Result<TypedFunc<P, R>>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let expected = FuncType::new(P::types(), R::types());
        if expected != self.ty {
            return Err(LinkError::SignatureMismatch {
                name: self.name,
                expected,
                found: self.ty,
            }
            .into());
        }
        Ok(TypedFunc {
            func: self,
            _marker: PhantomData,
        })
    }

    fn call_unchecked(&self, store: &mut Store, args: Vec<Value>) -> Result<Vec<Value>> {
        let data = store.data_mut(self.instance)?;
        if data.exited {
            return Err(Trap::RuntimeExited.into());
        }
        trace!(name = %self.name, ?args, "call");
        exec::invoke(data, self.index, args).with_context(|| format!("calling `{}`", self.name))
    }
}

/// A binding whose signature was verified when it was created.
pub struct TypedFunc<P, R> {
    func: Func,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R> Clone for TypedFunc<P, R> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            _marker: PhantomData,
        }
    }
}

impl<P, R> fmt::Debug for TypedFunc<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedFunc")
            .field("name", &self.func.name)
            .field("ty", &self.func.ty)
            .finish()
    }
}

impl<P, R> TypedFunc<P, R>
where
    P: WasmParams,
    R: WasmResults,
{
    pub fn call(&self, store: &mut Store, params: P) -> Result<R> {
        let results = self.func.call_unchecked(store, params.into_values())?;
        R::from_values(&results)
            .with_context(|| format!("`{}` returned unexpected {results:?}", self.func.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instantiate(wat: &str) -> (Store, Instance) {
        let module = Module::from_source(wat.as_bytes()).unwrap();
        let mut store = Store::default();
        let instance = Instance::new(&mut store, &module).unwrap();
        (store, instance)
    }

    fn trap_of(err: &anyhow::Error) -> Option<&Trap> {
        err.downcast_ref::<Trap>()
    }

    #[test]
    fn add_sums_three_arguments() {
        let (mut store, instance) = instantiate(include_str!("../demos/counter.wat"));
        let add = instance
            .exported_func::<(i32, i32, i32), i32>(&store, "add")
            .unwrap();
        assert_eq!(add.call(&mut store, (1, 2, 3)).unwrap(), 6);
        assert_eq!(add.call(&mut store, (i32::MAX, 1, 0)).unwrap(), i32::MIN);
    }

    #[test]
    fn wrong_declared_signature_fails_at_bind_time() {
        let (store, instance) = instantiate(include_str!("../demos/counter.wat"));

        let err = instance
            .exported_func::<(i32, i32), i32>(&store, "add")
            .unwrap_err();
        match err.downcast_ref::<LinkError>() {
            Some(LinkError::SignatureMismatch { name, .. }) => assert_eq!(name, "add"),
            other => panic!("unexpected error {other:?}"),
        }
        insta::assert_snapshot!(
            err.to_string(),
            @"export `add` has signature (i32, i32, i32) -> i32, bound as (i32, i32) -> i32"
        );

        let err = instance.exported_func::<(), i32>(&store, "sub").unwrap_err();
        assert_eq!(
            err.downcast_ref::<LinkError>(),
            Some(&LinkError::MissingExport("sub".to_string()))
        );

        let err = instance.get_func(&store, "memory").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LinkError>(),
            Some(LinkError::NotAFunction { kind: "memory", .. })
        ));
    }

    #[test]
    fn dynamic_call_checks_arguments() {
        let (mut store, instance) = instantiate(include_str!("../demos/counter.wat"));
        let add = instance.get_func(&store, "add").unwrap();

        let results = add
            .call(&mut store, &[Value::I32(4), Value::I32(5), Value::I32(6)])
            .unwrap();
        assert_eq!(results, [Value::I32(15)]);

        let err = add.call(&mut store, &[Value::I32(4)]).unwrap_err();
        assert!(matches!(trap_of(&err), Some(Trap::ArgumentMismatch { .. })));
        let err = add
            .call(&mut store, &[Value::I32(4), Value::I64(5), Value::I32(6)])
            .unwrap_err();
        assert!(matches!(trap_of(&err), Some(Trap::ArgumentMismatch { .. })));
    }

    #[test]
    fn exited_runtime_rejects_calls() {
        let (mut store, instance) = instantiate(include_str!("../demos/counter.wat"));
        let create = instance
            .exported_func::<(), i32>(&store, "counter_create")
            .unwrap();
        create.call(&mut store, ()).unwrap();

        instance.exit(&mut store).unwrap();
        assert!(instance.is_exited(&store).unwrap());
        let err = create.call(&mut store, ()).unwrap_err();
        assert_eq!(trap_of(&err), Some(&Trap::RuntimeExited));
    }

    #[test]
    fn start_function_runs_during_instantiation() {
        let (store, instance) = instantiate(
            r#"(module
                (global $ready (export "ready") (mut i32) (i32.const 0))
                (func $init i32.const 1 global.set $ready)
                (start $init))"#,
        );
        assert_eq!(instance.get_global(&store, "ready").unwrap(), Value::I32(1));
    }

    #[test]
    fn data_segments_are_copied() {
        let (mut store, instance) = instantiate(
            r#"(module
                (memory 1)
                (data (i32.const 8) "\2a\00\00\00")
                (func (export "peek") (result i32) i32.const 8 i32.load))"#,
        );
        let peek = instance.exported_func::<(), i32>(&store, "peek").unwrap();
        assert_eq!(peek.call(&mut store, ()).unwrap(), 42);
    }

    #[test]
    fn oversized_data_segment_fails_to_link() {
        let module = Module::from_source(
            br#"(module (memory 1) (data (i32.const 65534) "\01\02\03\04"))"#,
        )
        .unwrap();
        let err = Instance::new(&mut Store::default(), &module).unwrap_err();
        assert_eq!(
            err.downcast_ref::<LinkError>(),
            Some(&LinkError::DataSegmentOutOfBounds { index: 0 })
        );
    }

    #[test]
    fn traps_surface_as_errors() {
        let (mut store, instance) = instantiate(
            r#"(module
                (memory 1)
                (func (export "oob") (result i32) i32.const 65534 i32.load)
                (func (export "div") (param i32 i32) (result i32)
                  local.get 0 local.get 1 i32.div_s)
                (func (export "boom") unreachable)
                (func $spin (export "spin") call $spin))"#,
        );

        let oob = instance.exported_func::<(), i32>(&store, "oob").unwrap();
        let err = oob.call(&mut store, ()).unwrap_err();
        assert_eq!(
            trap_of(&err),
            Some(&Trap::MemoryOutOfBounds {
                addr: 65534,
                len: 4
            })
        );

        let div = instance
            .exported_func::<(i32, i32), i32>(&store, "div")
            .unwrap();
        assert_eq!(div.call(&mut store, (-7, 2)).unwrap(), -3);
        let err = div.call(&mut store, (1, 0)).unwrap_err();
        assert_eq!(trap_of(&err), Some(&Trap::IntegerDivideByZero));
        let err = div.call(&mut store, (i32::MIN, -1)).unwrap_err();
        assert_eq!(trap_of(&err), Some(&Trap::IntegerOverflow));

        let boom = instance.exported_func::<(), ()>(&store, "boom").unwrap();
        let err = boom.call(&mut store, ()).unwrap_err();
        assert_eq!(trap_of(&err), Some(&Trap::Unreachable));

        let spin = instance.exported_func::<(), ()>(&store, "spin").unwrap();
        let err = spin.call(&mut store, ()).unwrap_err();
        assert_eq!(trap_of(&err), Some(&Trap::CallStackExhausted));
    }

    #[test]
    fn loops_and_branches() {
        let (mut store, instance) = instantiate(
            r#"(module
                (func (export "sum_to") (param $n i32) (result i32)
                  (local $acc i32)
                  block $done
                    loop $again
                      local.get $n
                      i32.eqz
                      br_if $done
                      local.get $acc
                      local.get $n
                      i32.add
                      local.set $acc
                      local.get $n
                      i32.const 1
                      i32.sub
                      local.set $n
                      br $again
                    end
                  end
                  local.get $acc)
                (func (export "early") (param i32) (result i32)
                  local.get 0
                  if
                    i32.const 10
                    return
                  end
                  i32.const 20))"#,
        );

        let sum_to = instance.exported_func::<i32, i32>(&store, "sum_to").unwrap();
        assert_eq!(sum_to.call(&mut store, 10).unwrap(), 55);
        assert_eq!(sum_to.call(&mut store, 0).unwrap(), 0);

        let early = instance.exported_func::<i32, i32>(&store, "early").unwrap();
        assert_eq!(early.call(&mut store, 1).unwrap(), 10);
        assert_eq!(early.call(&mut store, 0).unwrap(), 20);
    }

    #[test]
    fn memory_grow_respects_maximum() {
        let (mut store, instance) = instantiate(
            r#"(module
                (memory 1 2)
                (func (export "grow") (param i32) (result i32)
                  local.get 0 memory.grow)
                (func (export "size") (result i32) memory.size))"#,
        );
        let grow = instance.exported_func::<i32, i32>(&store, "grow").unwrap();
        let size = instance.exported_func::<(), i32>(&store, "size").unwrap();

        assert_eq!(grow.call(&mut store, 1).unwrap(), 1);
        assert_eq!(size.call(&mut store, ()).unwrap(), 2);
        assert_eq!(grow.call(&mut store, 1).unwrap(), -1);
    }

    #[test]
    fn memory_grow_stops_at_the_address_space() {
        let (mut store, instance) = instantiate(
            r#"(module
                (memory 1)
                (func (export "grow") (param i32) (result i32)
                  local.get 0 memory.grow)
                (func (export "size") (result i32) memory.size))"#,
        );
        let grow = instance.exported_func::<i32, i32>(&store, "grow").unwrap();
        let size = instance.exported_func::<(), i32>(&store, "size").unwrap();

        assert_eq!(grow.call(&mut store, 65536).unwrap(), -1);
        assert_eq!(grow.call(&mut store, -1).unwrap(), -1);
        assert_eq!(size.call(&mut store, ()).unwrap(), 1);
        assert_eq!(grow.call(&mut store, 0).unwrap(), 1);
    }

    #[test]
    fn bindings_stay_with_their_store() {
        let (mut store_a, instance_a) =
            instantiate(r#"(module (func (export "f") (result i32) i32.const 1))"#);
        let (mut store_b, instance_b) =
            instantiate(r#"(module (func (export "f") (result i32) i32.const 2))"#);
        let f = instance_a.exported_func::<(), i32>(&store_a, "f").unwrap();

        assert_eq!(f.call(&mut store_a, ()).unwrap(), 1);
        let err = f.call(&mut store_b, ()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LinkError>(),
            Some(LinkError::ForeignInstance { instance: 0, .. })
        ));

        assert!(instance_a.get_func(&store_b, "f").is_err());
        assert!(instance_a.exit(&mut store_b).is_err());
        assert!(!instance_b.is_exited(&store_b).unwrap());

        let dynamic = instance_b.get_func(&store_b, "f").unwrap();
        assert_eq!(dynamic.name(), "f");
        assert_eq!(dynamic.ty().to_string(), "() -> i32");
        assert!(dynamic.call(&mut store_a, &[]).is_err());
        assert_eq!(dynamic.call(&mut store_b, &[]).unwrap(), [Value::I32(2)]);
    }

    #[test]
    fn export_listing() {
        let (store, instance) = instantiate(include_str!("../demos/counter.wat"));
        let listing = instance
            .exports(&store)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        insta::assert_snapshot!(listing, @r"
        memory memory
        function add: (i32, i32, i32) -> i32
        function counter_create: () -> i32
        function counter_increment: (i32) -> ()
        function counter_decrement: (i32) -> ()
        function counter_set: (i32, i32) -> ()
        function counter_get: (i32) -> i32
        function counter_destroy: (i32) -> ()
        ");
    }
}
