//! Fatal error tier.
//!
//! Anything in here means the record stream, the backend contract, or an
//! internal invariant is broken and the run cannot continue. These bubble
//! up as `Result` values; only the binary's `main` turns one into a
//! process exit.

use thiserror::Error;

use crate::types::Ty;

/// Unrecoverable pipeline failure.
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read on input stream")]
    ShortRead,

    #[error("record stream out of sync (got 0x{byte:02x})")]
    Sync { byte: u8 },

    #[error("unknown block tag 0x{tag:02x}")]
    UnknownBlock { tag: u8 },

    #[error("unknown header kind 0x{kind:04x}")]
    UnknownHeader { kind: u16 },

    #[error("unknown operator 0x{op:04x} in expression record")]
    UnknownOp { op: u16 },

    #[error("unknown type word 0x{raw:04x} in expression record")]
    UnknownType { raw: u16 },

    #[error("call through unknown prototype id {id}")]
    Prototype { id: u16 },

    #[error("node pool exhausted ({capacity} nodes)")]
    OutOfNodes { capacity: usize },

    #[error("stack offset {sp} at function epilogue")]
    StackImbalance { sp: i32 },

    #[error("bad node type {ty} after rewrite")]
    BadNodeType { ty: Ty },

    #[error("no lowering path for operator {op}")]
    InvalidOp { op: String },

    #[error("cleanup node not claimed by the backend")]
    UnhandledCleanup,

    #[error("continue record names no open loop (id {id})")]
    LoopContext { id: u16 },

    #[error("no helper suffix for type {ty}")]
    HelperType { ty: Ty },

    #[error("no data emission for type {ty}")]
    DataType { ty: Ty },

    #[error("segment stack overflow")]
    SegmentOverflow,

    #[error("segment stack underflow")]
    SegmentUnderflow,

    #[error("unknown target cpu {cpu}")]
    UnknownCpu { cpu: u32 },

    #[error("symbol table: {reason}")]
    SymbolTable { reason: String },
}

/// Result type alias used throughout the code generator.
pub type CodegenResult<T> = Result<T, CodegenError>;
