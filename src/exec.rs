use crate::{
    error::Trap,
    module::{Func, Instr, Module, MAX_PAGES, PAGE_SIZE},
    store::InstanceData,
    value::Value,
};
use anyhow::{bail, ensure, Context, Result};
use bytes::Buf;
use std::{ops::Range, rc::Rc};

const MAX_CALL_DEPTH: usize = 200;

/// Runs function `func_idx` of the instance with already type-checked arguments.
pub(crate) fn invoke(
    data: &mut InstanceData,
    func_idx: u32,
    args: Vec<Value>,
) -> Result<Vec<Value>> {
    let module = Rc::clone(&data.module);
    let mut executor = Executor {
        module: &module,
        data,
        depth: 0,
    };
    executor.call(func_idx, args)
}

#[derive(Clone, Copy, Debug)]
struct Label {
    /// Values carried across a branch to this label.
    arity: usize,
    /// Operand stack height when the block was entered.
    height: usize,
    target: usize,
    is_loop: bool,
}

struct Executor<'a> {
    module: &'a Module,
    data: &'a mut InstanceData,
    depth: usize,
}

impl<'a> Executor<'a> {
    fn call(&mut self, idx: u32, args: Vec<Value>) -> Result<Vec<Value>> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Trap::CallStackExhausted.into());
        }
        let module = self.module;
        let func = module
            .funcs
            .get(idx as usize)
            .with_context(|| format!("call to missing function {idx}"))?;

        let mut locals = args;
        locals.extend(func.locals.iter().map(Value::default_for));

        self.depth += 1;
        let results = self.run(func, &mut locals);
        self.depth -= 1;
        results
    }

    fn run(&mut self, func: &'a Func, locals: &mut [Value]) -> Result<Vec<Value>> {
        let mut stack: Vec<Value> = Vec::new();
        let mut labels: Vec<Label> = Vec::new();
        let mut pc = 0;

        loop {
            let instr = func
                .body
                .get(pc)
                .context("execution ran past the end of the function body")?;
            pc += 1;

            match instr {
                Instr::Unreachable => return Err(Trap::Unreachable.into()),
                Instr::Nop => {}
                Instr::Block { ty, end } => labels.push(Label {
                    arity: ty.arity(),
                    height: stack.len(),
                    target: end + 1,
                    is_loop: false,
                }),
                Instr::Loop { .. } => labels.push(Label {
                    arity: 0,
                    height: stack.len(),
                    target: pc,
                    is_loop: true,
                }),
                Instr::If { ty, else_at, end } => {
                    let cond = pop_i32(&mut stack)?;
                    labels.push(Label {
                        arity: ty.arity(),
                        height: stack.len(),
                        target: end + 1,
                        is_loop: false,
                    });
                    if cond == 0 {
                        // the matching end pops the label
                        pc = match else_at {
                            Some(else_at) => else_at + 1,
                            None => *end,
                        };
                    }
                }
                Instr::Else { end } => pc = *end,
                Instr::End => {
                    if labels.pop().is_none() {
                        break;
                    }
                }
                Instr::Br(depth) => match branch(&mut stack, &mut labels, *depth)? {
                    Some(target) => pc = target,
                    None => break,
                },
                Instr::BrIf(depth) => {
                    if pop_i32(&mut stack)? != 0 {
                        match branch(&mut stack, &mut labels, *depth)? {
                            Some(target) => pc = target,
                            None => break,
                        }
                    }
                }
                Instr::Return => break,
                Instr::Call(idx) => {
                    let callee = self
                        .module
                        .funcs
                        .get(*idx as usize)
                        .with_context(|| format!("call to missing function {idx}"))?;
                    let n = callee.ty.params.len();
                    ensure!(stack.len() >= n, "value stack underflow");
                    let args = stack.split_off(stack.len() - n);
                    let results = self.call(*idx, args)?;
                    stack.extend(results);
                }

                Instr::Drop => {
                    pop(&mut stack)?;
                }
                Instr::Select => {
                    let cond = pop_i32(&mut stack)?;
                    let b = pop(&mut stack)?;
                    let a = pop(&mut stack)?;
                    stack.push(if cond != 0 { a } else { b });
                }

                Instr::LocalGet(idx) => {
                    let value = locals
                        .get(*idx as usize)
                        .copied()
                        .with_context(|| format!("unknown local {idx}"))?;
                    stack.push(value);
                }
                Instr::LocalSet(idx) => {
                    let value = pop(&mut stack)?;
                    *local_mut(locals, *idx)? = value;
                }
                Instr::LocalTee(idx) => {
                    let value = *stack.last().context("value stack underflow")?;
                    *local_mut(locals, *idx)? = value;
                }
                Instr::GlobalGet(idx) => {
                    let value = self
                        .data
                        .globals
                        .get(*idx as usize)
                        .copied()
                        .with_context(|| format!("unknown global {idx}"))?;
                    stack.push(value);
                }
                Instr::GlobalSet(idx) => {
                    let value = pop(&mut stack)?;
                    let mutable = self
                        .module
                        .globals
                        .get(*idx as usize)
                        .map(|global| global.mutable)
                        .with_context(|| format!("unknown global {idx}"))?;
                    ensure!(mutable, "global {idx} is immutable");
                    self.data.globals[*idx as usize] = value;
                }

                Instr::I32Load(arg) => {
                    let base = pop_i32(&mut stack)?;
                    let range = self.memory_range(base, arg.offset)?;
                    let value = (&self.data.memory[range]).get_i32_le();
                    stack.push(Value::I32(value));
                }
                Instr::I32Store(arg) => {
                    let value = pop_i32(&mut stack)?;
                    let base = pop_i32(&mut stack)?;
                    let range = self.memory_range(base, arg.offset)?;
                    self.data.memory[range].copy_from_slice(&value.to_le_bytes());
                }
                Instr::MemorySize => {
                    stack.push(Value::I32((self.data.memory.len() / PAGE_SIZE) as i32));
                }
                Instr::MemoryGrow => {
                    let delta = pop_i32(&mut stack)? as u32;
                    stack.push(Value::I32(self.grow(delta)));
                }

                Instr::I32Const(value) => stack.push(Value::I32(*value)),
                Instr::I32Eqz => {
                    let a = pop_i32(&mut stack)?;
                    stack.push(Value::I32((a == 0) as i32));
                }
                Instr::I32Eq => compare(&mut stack, |a, b| a == b)?,
                Instr::I32Ne => compare(&mut stack, |a, b| a != b)?,
                Instr::I32LtS => compare(&mut stack, |a, b| a < b)?,
                Instr::I32LtU => compare(&mut stack, |a, b| (a as u32) < (b as u32))?,
                Instr::I32GtS => compare(&mut stack, |a, b| a > b)?,
                Instr::I32GtU => compare(&mut stack, |a, b| (a as u32) > (b as u32))?,
                Instr::I32LeS => compare(&mut stack, |a, b| a <= b)?,
                Instr::I32GeS => compare(&mut stack, |a, b| a >= b)?,
                Instr::I32Add => arith(&mut stack, |a, b| Ok(a.wrapping_add(b)))?,
                Instr::I32Sub => arith(&mut stack, |a, b| Ok(a.wrapping_sub(b)))?,
                Instr::I32Mul => arith(&mut stack, |a, b| Ok(a.wrapping_mul(b)))?,
                Instr::I32DivS => arith(&mut stack, |a, b| match (a, b) {
                    (_, 0) => Err(Trap::IntegerDivideByZero),
                    (i32::MIN, -1) => Err(Trap::IntegerOverflow),
                    (a, b) => Ok(a / b),
                })?,
                Instr::I32RemS => arith(&mut stack, |a, b| match b {
                    0 => Err(Trap::IntegerDivideByZero),
                    b => Ok(a.wrapping_rem(b)),
                })?,
                Instr::I32And => arith(&mut stack, |a, b| Ok(a & b))?,
                Instr::I32Or => arith(&mut stack, |a, b| Ok(a | b))?,
                Instr::I32Xor => arith(&mut stack, |a, b| Ok(a ^ b))?,
                Instr::I32Shl => arith(&mut stack, |a, b| Ok(a.wrapping_shl(b as u32)))?,
                Instr::I32ShrS => arith(&mut stack, |a, b| Ok(a.wrapping_shr(b as u32)))?,
                Instr::I32ShrU => {
                    arith(&mut stack, |a, b| Ok((a as u32).wrapping_shr(b as u32) as i32))?
                }
            }
        }

        let arity = func.ty.results.len();
        ensure!(stack.len() >= arity, "value stack underflow on return");
        Ok(stack.split_off(stack.len() - arity))
    }

    fn memory_range(&self, base: i32, offset: u32) -> Result<Range<usize>, Trap> {
        let addr = base as u32 as u64 + offset as u64;
        let end = addr + 4;
        if end > self.data.memory.len() as u64 {
            return Err(Trap::MemoryOutOfBounds { addr, len: 4 });
        }
        Ok(addr as usize..end as usize)
    }

    /// Returns the previous size in pages, or -1 when the memory cannot grow.
    fn grow(&mut self, delta: u32) -> i32 {
        let memory = &mut self.data.memory;
        let old = memory.len() / PAGE_SIZE;
        let max = self.data.max_pages.map_or(MAX_PAGES, |max| max as usize);
        let Some(new) = old.checked_add(delta as usize).filter(|new| *new <= max) else {
            return -1;
        };
        let additional = (new - old) * PAGE_SIZE;
        if memory.try_reserve_exact(additional).is_err() {
            return -1;
        }
        memory.resize(new * PAGE_SIZE, 0);
        old as i32
    }
}

/// Unwinds to the label `depth` levels out. `None` means the branch leaves the function.
fn branch(stack: &mut Vec<Value>, labels: &mut Vec<Label>, depth: u32) -> Result<Option<usize>> {
    let depth = depth as usize;
    if depth == labels.len() {
        return Ok(None);
    }
    ensure!(depth < labels.len(), "branch depth {depth} out of range");

    let label = labels[labels.len() - 1 - depth];
    ensure!(
        stack.len() >= label.height + label.arity,
        "value stack underflow on branch"
    );
    let carried = stack.split_off(stack.len() - label.arity);
    stack.truncate(label.height);
    stack.extend(carried);

    // a loop label stays in place, the branch re-enters its body
    let keep = if label.is_loop { depth } else { depth + 1 };
    labels.truncate(labels.len() - keep);
    Ok(Some(label.target))
}

fn pop(stack: &mut Vec<Value>) -> Result<Value> {
    stack.pop().context("value stack underflow")
}

fn pop_i32(stack: &mut Vec<Value>) -> Result<i32> {
    match pop(stack)? {
        Value::I32(v) => Ok(v),
        other => bail!("expected an i32 operand, found {}", other.ty()),
    }
}

fn local_mut(locals: &mut [Value], idx: u32) -> Result<&mut Value> {
    locals
        .get_mut(idx as usize)
        .with_context(|| format!("unknown local {idx}"))
}

fn arith(stack: &mut Vec<Value>, op: impl FnOnce(i32, i32) -> Result<i32, Trap>) -> Result<()> {
    let b = pop_i32(stack)?;
    let a = pop_i32(stack)?;
    stack.push(Value::I32(op(a, b)?));
    Ok(())
}

fn compare(stack: &mut Vec<Value>, op: impl FnOnce(i32, i32) -> bool) -> Result<()> {
    let b = pop_i32(stack)?;
    let a = pop_i32(stack)?;
    stack.push(Value::I32(op(a, b) as i32));
    Ok(())
}
