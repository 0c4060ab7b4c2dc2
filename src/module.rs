use anyhow::{bail, ensure, Context, Result};
use bytes::{Buf, Bytes};
use std::{fmt, path::Path};
use tracing::trace;

static MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
static VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Size of one linear memory page.
pub const PAGE_SIZE: usize = 65536;
/// Pages addressable with 32-bit memory offsets.
pub const MAX_PAGES: usize = 65536;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        })
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: Vec<ValType>, results: Vec<ValType>) -> Self {
        Self { params, results }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |types: &[ValType]| {
            types
                .iter()
                .map(ValType::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({}) -> ", join(&self.params))?;
        match self.results.as_slice() {
            [single] => write!(f, "{single}"),
            results => write!(f, "({})", join(results)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
}

impl BlockType {
    pub fn arity(&self) -> usize {
        match self {
            BlockType::Empty => 0,
            BlockType::Value(_) => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

/// Decoded instructions. Structured control flow carries the positions of its
/// matching `else` and `end` so the interpreter can jump without rescanning.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    Unreachable,
    Nop,
    Block {
        ty: BlockType,
        end: usize,
    },
    Loop {
        ty: BlockType,
    },
    If {
        ty: BlockType,
        else_at: Option<usize>,
        end: usize,
    },
    Else {
        end: usize,
    },
    End,
    Br(u32),
    BrIf(u32),
    Return,
    Call(u32),

    Drop,
    Select,

    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    I32Load(MemArg),
    I32Store(MemArg),
    MemorySize,
    MemoryGrow,

    I32Const(i32),
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32GeS,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32RemS,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Func {
    pub ty: FuncType,
    pub locals: Vec<ValType>,
    pub body: Vec<Instr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExternKind {
    Func,
    Table,
    Memory,
    Global,
}

impl ExternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternKind::Func => "function",
            ExternKind::Table => "table",
            ExternKind::Memory => "memory",
            ExternKind::Global => "global",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub idx: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryType {
    pub min: u32,
    pub max: Option<u32>,
}

/// Constant expressions used by global initialisers and data offsets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    GlobalGet(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub ty: ValType,
    pub mutable: bool,
    pub init: ConstExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Data {
    /// `None` for passive segments, which are never copied at instantiation.
    pub offset: Option<ConstExpr>,
    pub bytes: Bytes,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub funcs: Vec<Func>,
    pub memory: Option<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub data: Vec<Data>,
}

impl Module {
    /// Loads a module from disk. Text format input is assembled first.
    pub fn from_file<T>(file: T) -> Result<Self>
    where
        T: AsRef<Path>,
    {
        let path = file.as_ref();
        let contents = std::fs::read(path)
            .with_context(|| format!("failed to read module {}", path.display()))?;
        Self::from_source(&contents).with_context(|| format!("invalid module {}", path.display()))
    }

    /// Accepts either the binary or the text format.
    pub fn from_source(contents: &[u8]) -> Result<Self> {
        let binary = wat::parse_bytes(contents).context("failed to assemble text module")?;
        Self::from_bytes(&binary)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut contents = bytes;
        ensure!(contents.remaining() >= 8, "module is too short for a header");

        if contents.copy_to_bytes(4) != MAGIC[..] {
            bail!("wrong magic");
        }
        if contents.copy_to_bytes(4) != VERSION[..] {
            bail!("wrong version");
        }

        let mut module = Self::default();
        let mut func_types = Vec::new();
        while contents.has_remaining() {
            let id = read_u8(&mut contents)?;
            let len = read_u32(&mut contents)? as usize;
            ensure!(
                contents.remaining() >= len,
                "section {id} claims {len} bytes, only {} left",
                contents.remaining()
            );
            let (mut section, rest) = contents.split_at(len);
            contents = rest;

            trace!(id, len, "section");
            match id {
                // custom, table, element and data count sections carry nothing we execute
                0x00 | 0x04 | 0x09 | 0x0C => continue,
                0x01 => module.types = Self::parse_type_section(&mut section)?,
                0x02 => bail!("imports are not supported"),
                0x03 => func_types = Self::parse_function_section(&mut section, &module.types)?,
                0x05 => module.memory = Self::parse_memory_section(&mut section)?,
                0x06 => module.globals = Self::parse_global_section(&mut section)?,
                0x07 => module.exports = Self::parse_export_section(&mut section)?,
                0x08 => module.start = Some(read_u32(&mut section)?),
                0x0A => module.funcs = Self::parse_code_section(&mut section, &func_types)?,
                0x0B => module.data = Self::parse_data_section(&mut section)?,
                _ => bail!("unknown section id {id}"),
            }
            ensure!(!section.has_remaining(), "section {id} has trailing bytes");
        }

        ensure!(
            module.funcs.len() == func_types.len(),
            "function section declares {} functions, code section has {}",
            func_types.len(),
            module.funcs.len()
        );
        module.check_indices()?;

        Ok(module)
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|export| export.name == name)
    }

    fn check_indices(&self) -> Result<()> {
        for export in &self.exports {
            let in_range = match export.kind {
                ExternKind::Func => (export.idx as usize) < self.funcs.len(),
                ExternKind::Global => (export.idx as usize) < self.globals.len(),
                ExternKind::Memory => export.idx == 0 && self.memory.is_some(),
                ExternKind::Table => true,
            };
            ensure!(
                in_range,
                "export `{}` refers to missing {} {}",
                export.name,
                export.kind.as_str(),
                export.idx
            );
        }
        if let Some(start) = self.start {
            let func = self
                .funcs
                .get(start as usize)
                .with_context(|| format!("start function {start} does not exist"))?;
            ensure!(
                func.ty == FuncType::default(),
                "start function must take and return nothing, found {}",
                func.ty
            );
        }
        Ok(())
    }

    fn parse_type_section(contents: &mut &[u8]) -> Result<Vec<FuncType>> {
        let types_len = read_u32(contents)?;

        let mut result = Vec::new();
        for _ in 0..types_len {
            let mut func_type = FuncType::default();

            // 0x60, start of functype
            let start = read_u8(contents)?;
            if start != 0x60 {
                bail!("malformed module, expected start of functype (0x60), got {start}");
            }

            let params_len = read_u32(contents)?;
            for _ in 0..params_len {
                func_type.params.push(Self::parse_val(contents)?);
            }

            let results_len = read_u32(contents)?;
            for _ in 0..results_len {
                func_type.results.push(Self::parse_val(contents)?);
            }

            result.push(func_type);
        }

        Ok(result)
    }

    fn parse_function_section(
        contents: &mut &[u8],
        func_types: &[FuncType],
    ) -> Result<Vec<FuncType>> {
        let function_len = read_u32(contents)?;
        let mut result = Vec::new();
        for _ in 0..function_len {
            let idx = read_u32(contents)?;
            match func_types.get(idx as usize) {
                Some(ty) => result.push(ty.clone()),
                None => bail!("Unable to find function type {}", idx),
            }
        }

        Ok(result)
    }

    fn parse_memory_section(contents: &mut &[u8]) -> Result<Option<MemoryType>> {
        let count = read_u32(contents)?;
        match count {
            0 => Ok(None),
            1 => {
                let flags = read_u8(contents)?;
                let min = read_u32(contents)?;
                let max = match flags {
                    0x00 => None,
                    0x01 => Some(read_u32(contents)?),
                    _ => bail!("unsupported memory limits flag {flags:#x}"),
                };
                for pages in std::iter::once(min).chain(max) {
                    ensure!(
                        pages as usize <= MAX_PAGES,
                        "memory size {pages} exceeds {MAX_PAGES} pages"
                    );
                }
                if let Some(max) = max {
                    ensure!(min <= max, "memory minimum {min} is above its maximum {max}");
                }
                Ok(Some(MemoryType { min, max }))
            }
            _ => bail!("at most one memory is supported, found {count}"),
        }
    }

    fn parse_global_section(contents: &mut &[u8]) -> Result<Vec<Global>> {
        let count = read_u32(contents)?;
        let mut result = Vec::new();
        for _ in 0..count {
            let ty = Self::parse_val(contents)?;
            let mutable = match read_u8(contents)? {
                0x00 => false,
                0x01 => true,
                other => bail!("invalid global mutability {other:#x}"),
            };
            let init = Self::parse_const_expr(contents)?;
            result.push(Global { ty, mutable, init });
        }
        Ok(result)
    }

    fn parse_export_section(contents: &mut &[u8]) -> Result<Vec<Export>> {
        let mut result = Vec::new();

        let num_exports = read_u32(contents)?;
        for _ in 0..num_exports {
            let name = read_name(contents)?;
            let kind = match read_u8(contents)? {
                0x00 => ExternKind::Func,
                0x01 => ExternKind::Table,
                0x02 => ExternKind::Memory,
                0x03 => ExternKind::Global,
                other => bail!("unknown export kind {other:#x} for `{name}`"),
            };
            let idx = read_u32(contents)?;

            result.push(Export { name, kind, idx })
        }

        Ok(result)
    }

    fn parse_code_section(contents: &mut &[u8], func_types: &[FuncType]) -> Result<Vec<Func>> {
        let n = read_u32(contents)?;
        ensure!(
            n as usize == func_types.len(),
            "code section has {n} bodies for {} functions",
            func_types.len()
        );

        let mut funcs = Vec::with_capacity(func_types.len());
        for ty in func_types {
            let func_len = read_u32(contents)? as usize;
            ensure!(contents.remaining() >= func_len, "function body overruns code section");
            let remaining: &[u8] = contents;
            let (mut body, rest) = remaining.split_at(func_len);
            *contents = rest;

            let mut locals = Vec::new();
            let groups = read_u32(&mut body)?;
            for _ in 0..groups {
                let count = read_u32(&mut body)?;
                let local_ty = Self::parse_val(&mut body)?;
                locals.extend(std::iter::repeat(local_ty).take(count as usize));
            }

            let body = Self::parse_instructions(&mut body)
                .with_context(|| format!("in function {}", funcs.len()))?;
            funcs.push(Func {
                ty: ty.clone(),
                locals,
                body,
            });
        }

        Ok(funcs)
    }

    fn parse_data_section(contents: &mut &[u8]) -> Result<Vec<Data>> {
        let count = read_u32(contents)?;
        let mut result = Vec::new();
        for _ in 0..count {
            let offset = match read_u32(contents)? {
                0 => Some(Self::parse_const_expr(contents)?),
                1 => None,
                2 => {
                    let memory = read_u32(contents)?;
                    ensure!(memory == 0, "data segment targets missing memory {memory}");
                    Some(Self::parse_const_expr(contents)?)
                }
                flags => bail!("unknown data segment flags {flags}"),
            };
            let len = read_u32(contents)? as usize;
            let bytes = read_bytes(contents, len)?;
            result.push(Data { offset, bytes });
        }
        Ok(result)
    }

    fn parse_val(contents: &mut &[u8]) -> Result<ValType> {
        let n = read_u8(contents)?;

        match n {
            0x7F => Ok(ValType::I32),
            0x7E => Ok(ValType::I64),
            0x7D => Ok(ValType::F32),
            0x7C => Ok(ValType::F64),
            _ => bail!("unknown type {n:#x}"),
        }
    }

    fn parse_block_type(contents: &mut &[u8]) -> Result<BlockType> {
        match contents.first() {
            Some(0x40) => {
                contents.advance(1);
                Ok(BlockType::Empty)
            }
            Some(0x7F | 0x7E | 0x7D | 0x7C) => Ok(BlockType::Value(Self::parse_val(contents)?)),
            Some(_) => bail!("multi-value block types are not supported"),
            None => bail!("unexpected end of module"),
        }
    }

    fn parse_const_expr(contents: &mut &[u8]) -> Result<ConstExpr> {
        let opcode = read_u8(contents)?;
        let expr = match opcode {
            0x41 => ConstExpr::I32(read_i32(contents)?),
            0x42 => ConstExpr::I64(leb128::read::signed(contents)?),
            0x43 => {
                ensure!(contents.remaining() >= 4, "unexpected end of module");
                ConstExpr::F32(contents.get_f32_le())
            }
            0x44 => {
                ensure!(contents.remaining() >= 8, "unexpected end of module");
                ConstExpr::F64(contents.get_f64_le())
            }
            0x23 => ConstExpr::GlobalGet(read_u32(contents)?),
            _ => bail!("unsupported constant expression opcode {opcode:#x}"),
        };
        let end = read_u8(contents)?;
        ensure!(end == 0x0B, "constant expression is not terminated by end");
        Ok(expr)
    }

    fn parse_mem_arg(contents: &mut &[u8]) -> Result<MemArg> {
        Ok(MemArg {
            align: read_u32(contents)?,
            offset: read_u32(contents)?,
        })
    }

    fn parse_instructions(contents: &mut &[u8]) -> Result<Vec<Instr>> {
        let mut result = Vec::new();
        // positions of the enclosing block, loop and if instructions
        let mut open: Vec<usize> = Vec::new();

        loop {
            if contents.remaining() == 0 {
                bail!("function body is not terminated by end");
            }
            let opcode = read_u8(contents)?;
            let at = result.len();

            let instr = match opcode {
                0x00 => Instr::Unreachable,
                0x01 => Instr::Nop,
                0x02 => {
                    open.push(at);
                    Instr::Block {
                        ty: Self::parse_block_type(contents)?,
                        end: 0,
                    }
                }
                0x03 => {
                    open.push(at);
                    Instr::Loop {
                        ty: Self::parse_block_type(contents)?,
                    }
                }
                0x04 => {
                    open.push(at);
                    Instr::If {
                        ty: Self::parse_block_type(contents)?,
                        else_at: None,
                        end: 0,
                    }
                }
                0x05 => {
                    let Some(&start) = open.last() else {
                        bail!("else outside of an if");
                    };
                    match &mut result[start] {
                        Instr::If { else_at, .. } if else_at.is_none() => *else_at = Some(at),
                        _ => bail!("else without a matching if"),
                    }
                    Instr::Else { end: 0 }
                }
                0x0B => {
                    let Some(start) = open.pop() else {
                        // end of the function body
                        result.push(Instr::End);
                        break;
                    };
                    let else_at = match &mut result[start] {
                        Instr::Block { end, .. } => {
                            *end = at;
                            None
                        }
                        Instr::If { else_at, end, .. } => {
                            *end = at;
                            *else_at
                        }
                        _ => None,
                    };
                    if let Some(e) = else_at {
                        if let Instr::Else { end } = &mut result[e] {
                            *end = at;
                        }
                    }
                    Instr::End
                }
                0x0C => Instr::Br(read_u32(contents)?),
                0x0D => Instr::BrIf(read_u32(contents)?),
                0x0F => Instr::Return,
                0x10 => Instr::Call(read_u32(contents)?),
                0x1A => Instr::Drop,
                0x1B => Instr::Select,
                0x20 => Instr::LocalGet(read_u32(contents)?),
                0x21 => Instr::LocalSet(read_u32(contents)?),
                0x22 => Instr::LocalTee(read_u32(contents)?),
                0x23 => Instr::GlobalGet(read_u32(contents)?),
                0x24 => Instr::GlobalSet(read_u32(contents)?),
                0x28 => Instr::I32Load(Self::parse_mem_arg(contents)?),
                0x36 => Instr::I32Store(Self::parse_mem_arg(contents)?),
                0x3F => {
                    read_u8(contents)?;
                    Instr::MemorySize
                }
                0x40 => {
                    read_u8(contents)?;
                    Instr::MemoryGrow
                }
                0x41 => Instr::I32Const(read_i32(contents)?),
                0x45 => Instr::I32Eqz,
                0x46 => Instr::I32Eq,
                0x47 => Instr::I32Ne,
                0x48 => Instr::I32LtS,
                0x49 => Instr::I32LtU,
                0x4A => Instr::I32GtS,
                0x4B => Instr::I32GtU,
                0x4C => Instr::I32LeS,
                0x4E => Instr::I32GeS,
                0x6A => Instr::I32Add,
                0x6B => Instr::I32Sub,
                0x6C => Instr::I32Mul,
                0x6D => Instr::I32DivS,
                0x6F => Instr::I32RemS,
                0x71 => Instr::I32And,
                0x72 => Instr::I32Or,
                0x73 => Instr::I32Xor,
                0x74 => Instr::I32Shl,
                0x75 => Instr::I32ShrS,
                0x76 => Instr::I32ShrU,
                _ => bail!("Unknown opcode {opcode:#x}"),
            };

            result.push(instr);
        }

        ensure!(
            !contents.has_remaining(),
            "bytes after the final end of a function body"
        );

        Ok(result)
    }
}

fn read_u8(contents: &mut &[u8]) -> Result<u8> {
    ensure!(contents.has_remaining(), "unexpected end of module");
    Ok(contents.get_u8())
}

fn read_u32(contents: &mut &[u8]) -> Result<u32> {
    let value = leb128::read::unsigned(contents)?;
    u32::try_from(value).context("LEB128 value does not fit in u32")
}

fn read_i32(contents: &mut &[u8]) -> Result<i32> {
    let value = leb128::read::signed(contents)?;
    i32::try_from(value).context("LEB128 value does not fit in i32")
}

fn read_bytes(contents: &mut &[u8], len: usize) -> Result<Bytes> {
    ensure!(contents.remaining() >= len, "unexpected end of module");
    Ok(contents.copy_to_bytes(len))
}

fn read_name(contents: &mut &[u8]) -> Result<String> {
    let len = read_u32(contents)? as usize;
    let name = read_bytes(contents, len)?;
    Ok(String::from_utf8(name.to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(wat: &str) -> Result<Module> {
        Module::from_bytes(&wat::parse_str(wat)?)
    }

    #[test]
    fn decodes_demo_counter_exports() {
        let module = Module::from_source(include_bytes!("../demos/counter.wat")).unwrap();

        let names: Vec<_> = module.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "memory",
                "add",
                "counter_create",
                "counter_increment",
                "counter_decrement",
                "counter_set",
                "counter_get",
                "counter_destroy",
            ]
        );
        let add = module.export("add").unwrap();
        assert_eq!(add.kind, ExternKind::Func);
        assert_eq!(
            module.funcs[add.idx as usize].ty.to_string(),
            "(i32, i32, i32) -> i32"
        );
        assert_eq!(module.memory, Some(MemoryType { min: 1, max: None }));
    }

    #[test]
    fn rejects_bad_header() {
        let err = Module::from_bytes(&[0x00, 0x61, 0x73, 0x6E, 1, 0, 0, 0]).unwrap_err();
        assert_eq!(err.to_string(), "wrong magic");

        let err = Module::from_bytes(&[0x00, 0x61, 0x73, 0x6D, 2, 0, 0, 0]).unwrap_err();
        assert_eq!(err.to_string(), "wrong version");

        assert!(Module::from_bytes(&MAGIC).is_err());
    }

    #[test]
    fn rejects_memory_limits_past_the_address_space() {
        let header = [0x00, 0x61, 0x73, 0x6D, 1, 0, 0, 0];
        let with_memory = |limits: &[u8]| {
            let mut bytes = header.to_vec();
            bytes.extend([0x05, limits.len() as u8 + 1, 0x01]);
            bytes.extend(limits);
            Module::from_bytes(&bytes)
        };

        // 65537 pages, no maximum
        let err = with_memory(&[0x00, 0x81, 0x80, 0x04]).unwrap_err();
        assert!(format!("{err:#}").contains("exceeds 65536 pages"), "{err:#}");
        let err = with_memory(&[0x01, 0x01, 0x81, 0x80, 0x04]).unwrap_err();
        assert!(format!("{err:#}").contains("exceeds 65536 pages"), "{err:#}");
        let err = with_memory(&[0x01, 0x02, 0x01]).unwrap_err();
        assert!(format!("{err:#}").contains("above its maximum"), "{err:#}");

        let module = with_memory(&[0x01, 0x01, 0x80, 0x80, 0x04]).unwrap();
        assert_eq!(
            module.memory,
            Some(MemoryType {
                min: 1,
                max: Some(65536)
            })
        );
    }

    #[test]
    fn rejects_truncated_section() {
        let mut bytes = wat::parse_str(r#"(module (func (export "f")))"#).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(Module::from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_imports() {
        let err = parse(r#"(module (import "env" "f" (func)))"#).unwrap_err();
        assert_eq!(err.to_string(), "imports are not supported");
    }

    #[test]
    fn locals_expand_their_counts() {
        let module = parse("(module (func (local i32 i32) (local i64)))").unwrap();
        assert_eq!(
            module.funcs[0].locals,
            [ValType::I32, ValType::I32, ValType::I64]
        );
    }

    #[test]
    fn matches_structured_control_flow() {
        let module = parse(
            r#"(module
                (func (param i32) (result i32)
                  local.get 0
                  if (result i32)
                    i32.const 1
                  else
                    block
                      nop
                    end
                    i32.const 2
                  end))"#,
        )
        .unwrap();

        assert_eq!(
            module.funcs[0].body,
            [
                Instr::LocalGet(0),
                Instr::If {
                    ty: BlockType::Value(ValType::I32),
                    else_at: Some(3),
                    end: 8,
                },
                Instr::I32Const(1),
                Instr::Else { end: 8 },
                Instr::Block {
                    ty: BlockType::Empty,
                    end: 6,
                },
                Instr::Nop,
                Instr::End,
                Instr::I32Const(2),
                Instr::End,
                Instr::End,
            ]
        );
    }

    #[test]
    fn decodes_globals_and_data() {
        let module = parse(
            r#"(module
                (memory 1 2)
                (global $g (mut i32) (i32.const 16))
                (data (i32.const 8) "\01\02"))"#,
        )
        .unwrap();

        assert_eq!(module.memory, Some(MemoryType { min: 1, max: Some(2) }));
        assert_eq!(
            module.globals,
            [Global {
                ty: ValType::I32,
                mutable: true,
                init: ConstExpr::I32(16),
            }]
        );
        assert_eq!(module.data[0].offset, Some(ConstExpr::I32(8)));
        assert_eq!(&module.data[0].bytes[..], &[1, 2]);
    }

    #[test]
    fn func_type_display() {
        let ty = FuncType::new(vec![ValType::I32, ValType::I64], vec![]);
        insta::assert_snapshot!(ty.to_string(), @"(i32, i64) -> ()");
    }
}
