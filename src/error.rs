use crate::module::FuncType;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,
    #[error("out of bounds memory access at {addr:#x} ({len} bytes)")]
    MemoryOutOfBounds { addr: u64, len: usize },
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("call stack exhausted")]
    CallStackExhausted,
    #[error("runtime has exited, exports are no longer callable")]
    RuntimeExited,
    #[error("arguments do not match {expected}")]
    ArgumentMismatch { expected: FuncType },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("module has no export named `{0}`")]
    MissingExport(String),
    #[error("export `{name}` is a {kind}, not a function")]
    NotAFunction { name: String, kind: &'static str },
    #[error("export `{name}` has signature {found}, bound as {expected}")]
    SignatureMismatch {
        name: String,
        expected: FuncType,
        found: FuncType,
    },
    #[error("data segment {index} does not fit in linear memory")]
    DataSegmentOutOfBounds { index: usize },
    #[error("instance {instance} belongs to store {owner}, not store {store}")]
    ForeignInstance {
        instance: usize,
        owner: usize,
        store: usize,
    },
}
