use thiserror::Error;

/// Runtime failure raised by the execution core.
///
/// `Trap` is the VM-visible taxonomy a guest can legitimately hit at
/// runtime; `Fatal` marks invariant violations (embedder or decoder bugs)
/// that a well-formed module can never produce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{0}")]
    Trap(String),
    #[error("{0}")]
    Fatal(String),
}

impl Error {
    pub fn is_trap(&self) -> bool {
        matches!(self, Error::Trap(_))
    }
}

#[inline]
pub fn trap<T>(msg: impl Into<String>) -> Result<T, Error> {
    Err(Error::Trap(msg.into()))
}

#[inline]
pub fn fatal<T>(msg: impl Into<String>) -> Result<T, Error> {
    Err(Error::Fatal(msg.into()))
}

// Trap messages
pub const DIVIDE_BY_ZERO: &str = "integer divide by zero";
pub const INTEGER_OVERFLOW: &str = "integer overflow";
pub const INVALID_CONV_TO_INT: &str = "invalid conversion to integer";
pub const OOB_MEMORY_ACCESS: &str = "out of bounds memory access";
pub const OOB_TABLE_ACCESS: &str = "out of bounds table access";
pub const UNDEF_ELEM: &str = "undefined element";
pub const UNINITIALIZED_ELEM: &str = "uninitialized element";
pub const INDIRECT_CALL_MISMATCH: &str = "indirect call type mismatch";
pub const UNREACHABLE: &str = "unreachable";
pub const STACK_EXHAUSTED: &str = "call stack exhausted";
pub const MULTI_MEMORY_UNSUPPORTED: &str = "non-zero memory index is not supported";
// Fatal messages
pub const STACK_UNDERFLOW: &str = "value stack underflow";
pub const ARG_TYPE_MISMATCH: &str = "type mismatch when extracting call arguments";
pub const IMMUTABLE_GLOBAL: &str = "write to immutable global";
pub const UNKNOWN_OPCODE: &str = "no handler registered for opcode";
pub const UNKNOWN_FUNC: &str = "unknown function";
pub const UNKNOWN_TYPE: &str = "unknown type";
pub const UNKNOWN_TABLE: &str = "unknown table";
pub const UNKNOWN_MEMORY: &str = "unknown memory";
pub const UNKNOWN_GLOBAL: &str = "unknown global";
pub const UNKNOWN_LOCAL: &str = "unknown local";
pub const UNKNOWN_LABEL: &str = "unknown label";
pub const UNKNOWN_ELEM: &str = "unknown element segment";
pub const NO_FRAME: &str = "no active call frame";
pub const CONST_EXPR_REQUIRED: &str = "constant expression required";

#[inline]
pub fn missing_import(func_id: u32) -> Error {
    Error::Trap(format!("Missing host import, number: {func_id}"))
}

#[inline]
pub fn uninitialized_element(slot: u32) -> Error {
    Error::Trap(format!("{UNINITIALIZED_ELEM} {slot}"))
}
