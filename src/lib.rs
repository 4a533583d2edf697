#![deny(unsafe_code)]

//! Execution core for a WebAssembly-style stack machine.
//!
//! The crate interprets pre-decoded function bodies: a [`Machine`]
//! drives the operand stack and the call stack of [`StackFrame`]s,
//! mutating the memory, tables and globals of an [`Instance`]. Module
//! decoding, validation and import resolution are the embedder's job;
//! bodies arrive as [`Instruction`] sequences with branch labels
//! already resolved to absolute offsets.

pub mod error;
pub mod frame;
pub mod instance;
pub mod machine;
pub mod memory;
pub mod numeric;
pub mod opcode;
pub mod stack;
pub mod table;
pub mod value;

pub use error::Error;
pub use frame::StackFrame;
pub use instance::{
    ConstExpr, ElementSegment, FunctionBody, FunctionType, HostFn, HostImport, Instance,
    WasmGlobal,
};
pub use machine::{call, eval, FrameInfo, Machine};
pub use memory::WasmMemory;
pub use opcode::{Instruction, OpCode};
pub use stack::ValueStack;
pub use table::WasmTable;
pub use value::{ValType, Value};
