//! The interpreter: opcode dispatch, control transfer, call dispatch.
//!
//! Handlers live in a fixed-size table indexed by opcode ordinal and
//! built once on first use. Each handler mutates the operand stack, the
//! current frame, and the instance's resources; calls push a new frame
//! and re-enter [`eval`].

use std::sync::LazyLock;

use tracing::{debug, trace};

use crate::error::*;
use crate::frame::StackFrame;
use crate::instance::{FunctionType, HostImport, Instance};
use crate::numeric;
use crate::opcode::{Instruction, OpCode};
use crate::stack::ValueStack;
use crate::value::{ValType, Value};

/// Recursion ceiling; beyond it the call traps instead of exhausting
/// the host stack.
pub const MAX_CALL_DEPTH: usize = 1000;

type Handler =
    fn(&mut ValueStack, &Instance, &mut Vec<StackFrame>, &Instruction) -> Result<(), Error>;

static DISPATCH: LazyLock<[Option<Handler>; OpCode::COUNT]> = LazyLock::new(build_dispatch);

/// One entry of a post-trap stack trace, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub func_id: u32,
    pub pc: usize,
}

/// Owns the operand stack and call stack for one thread of execution
/// against a borrowed instance.
pub struct Machine<'a> {
    instance: &'a Instance,
    stack: ValueStack,
    call_stack: Vec<StackFrame>,
}

impl<'a> Machine<'a> {
    pub fn new(instance: &'a Instance) -> Self {
        Self { instance, stack: ValueStack::new(), call_stack: Vec::new() }
    }

    /// Invoke `func_id`. With `pop_results` the results come back as a
    /// vector in source order; without it they stay on the stack, which
    /// is what nested and indirect callers want.
    pub fn call(
        &mut self,
        func_id: u32,
        args: &[Value],
        pop_results: bool,
    ) -> Result<Option<Vec<Value>>, Error> {
        call(&mut self.stack, self.instance, &mut self.call_stack, func_id, args, None, pop_results)
    }

    /// Frames live at the point of the last trap (or currently active),
    /// outermost first.
    pub fn stack_trace(&self) -> Vec<FrameInfo> {
        self.call_stack
            .iter()
            .map(|f| FrameInfo { func_id: f.func_id, pc: f.pc })
            .collect()
    }

    pub fn stack(&self) -> &ValueStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut ValueStack {
        &mut self.stack
    }
}

/// Call dispatch, parameterised by stack and call stack so host
/// functions can re-enter. `call_type` carries the expected signature
/// of an indirect call and is verified against the callee's actual
/// type before any frame is pushed.
#[allow(clippy::too_many_arguments)]
pub fn call(
    stack: &mut ValueStack,
    instance: &Instance,
    call_stack: &mut Vec<StackFrame>,
    func_id: u32,
    args: &[Value],
    call_type: Option<&FunctionType>,
    pop_results: bool,
) -> Result<Option<Vec<Value>>, Error> {
    if call_stack.len() >= MAX_CALL_DEPTH {
        return trap(STACK_EXHAUSTED);
    }
    let type_id = instance.function_type(func_id)?;
    let ty = instance.ty(type_id)?;
    if let Some(expected) = call_type {
        if !ty.types_match(expected) {
            return trap(INDIRECT_CALL_MISMATCH);
        }
    }
    debug!(func_id, params = ty.params.len(), "call");

    match instance.function(func_id)? {
        Some(body) => {
            call_stack.push(StackFrame::new(
                body.instructions.clone(),
                func_id,
                args,
                &body.local_types,
            ));
            eval(stack, instance, call_stack)?;
        }
        None => {
            // Placeholder frame so host calls show up in stack traces.
            call_stack.push(StackFrame::host(func_id, args));
            match instance.import(func_id) {
                Some(HostImport::Function(host)) => {
                    if let Some(results) = host(instance, args)? {
                        for v in results {
                            stack.push(v);
                        }
                    }
                }
                Some(HostImport::Global(cell)) => stack.push(cell.borrow().value),
                None => return Err(missing_import(func_id)),
            }
        }
    }

    // Trap paths return above and leave the frame chain intact for
    // stack traces.
    if !call_stack.is_empty() {
        call_stack.pop();
    }

    if !pop_results {
        return Ok(None);
    }
    let returns = ty.returns.len();
    if returns == 0 || stack.size() == 0 {
        return Ok(None);
    }
    let mut results = vec![Value::FALSE; returns];
    for i in (0..returns).rev() {
        results[i] = stack.pop()?;
    }
    Ok(Some(results))
}

/// Run the top frame to completion (END of body or `return`).
pub fn eval(
    stack: &mut ValueStack,
    instance: &Instance,
    call_stack: &mut Vec<StackFrame>,
) -> Result<(), Error> {
    loop {
        let frame = match call_stack.last_mut() {
            Some(frame) => frame,
            None => return Ok(()),
        };
        if frame.terminated() || frame.should_return {
            return Ok(());
        }
        let body = frame.instructions.clone();
        let pc = frame.load_current_instruction();
        let ins = &body[pc];
        trace!(func = frame.func_id, pc, opcode = ?ins.opcode, "exec");
        let handler = DISPATCH[ins.opcode.ordinal()]
            .ok_or_else(|| Error::Fatal(format!("{UNKNOWN_OPCODE} {:?}", ins.opcode)))?;
        handler(stack, instance, call_stack, ins)?;
    }
}

fn top_frame<'f>(frames: &'f mut [StackFrame]) -> Result<&'f mut StackFrame, Error> {
    frames.last_mut().ok_or_else(|| Error::Fatal(NO_FRAME.into()))
}

/// Arm the sticky transfer flag and shield the branch predicate from
/// the unwind buffer: the buffer is detached across the predicate pop
/// and reattached (or freshly created) afterwards.
fn prepare_control_transfer(
    frame: &mut StackFrame,
    stack: &mut ValueStack,
    consume: bool,
) -> Result<Option<Value>, Error> {
    frame.do_control_transfer = true;
    let unwind = stack.take_unwind_frame();
    let pred = if consume { Some(stack.pop()?) } else { None };
    stack.set_unwind_frame(unwind.unwrap_or_default());
    Ok(pred)
}

/// Result arity of the scope an END closes: none for a bare END scope,
/// the function's return count for the body-closing END, one for a
/// value-typed block, or the full return count of a function-typed
/// block.
fn number_of_values_to_return(
    instance: &Instance,
    frame: &StackFrame,
    ins: &Instruction,
) -> Result<usize, Error> {
    let open = match ins.scope {
        None => {
            let type_id = instance.function_type(frame.func_id)?;
            return Ok(instance.ty(type_id)?.returns.len());
        }
        Some(open) => open,
    };
    let scope = frame
        .instructions
        .get(open)
        .ok_or_else(|| Error::Fatal(UNKNOWN_TYPE.into()))?;
    if scope.opcode == OpCode::End {
        return Ok(0);
    }
    let block_type = scope.operands.first().copied().unwrap_or(0x40);
    if block_type == 0x40 {
        return Ok(0);
    }
    if ValType::from_code(block_type).is_some() {
        return Ok(1);
    }
    Ok(instance.ty(block_type as u32)?.returns.len())
}

/// The transfer at a control END: detach the unwind buffer,
/// save the target arity's worth of results, realign the stack to the
/// block entry height, restore rescued values at the body-closing END,
/// put the results back.
fn do_control_transfer(
    instance: &Instance,
    stack: &mut ValueStack,
    frame: &mut StackFrame,
    ins: &Instruction,
) -> Result<(), Error> {
    frame.do_control_transfer = false;
    let unwind = stack.take_unwind_frame();

    let arity = number_of_values_to_return(instance, frame, ins)?;
    let mut returns = Vec::with_capacity(arity);
    for _ in 0..arity {
        if stack.size() > 0 {
            returns.push(stack.pop()?);
        }
    }

    frame.drop_values_out_of_block(stack);

    if frame.is_last_block() {
        if let Some(mut rescued) = unwind {
            while let Some(v) = rescued.pop() {
                stack.push(v);
            }
        }
    }

    for v in returns.into_iter().rev() {
        stack.push(v);
    }
    Ok(())
}

fn extract_args(stack: &mut ValueStack, params: &[ValType]) -> Result<Vec<Value>, Error> {
    let mut args = vec![Value::FALSE; params.len()];
    for i in (0..params.len()).rev() {
        let v = stack.pop()?;
        if v.ty() != params[i] {
            return fatal(ARG_TYPE_MISMATCH);
        }
        args[i] = v;
    }
    Ok(args)
}

fn build_dispatch() -> [Option<Handler>; OpCode::COUNT] {
    let mut t: [Option<Handler>; OpCode::COUNT] = [None; OpCode::COUNT];

    macro_rules! op {
        ($t:ident, $op:ident, $f:expr) => {
            $t[OpCode::$op as usize] = Some($f);
        };
    }
    macro_rules! alias {
        ($t:ident, $op:ident, $src:ident) => {
            $t[OpCode::$op as usize] = $t[OpCode::$src as usize];
        };
    }
    macro_rules! binop {
        ($t:ident, $op:ident, $as:ident, $from:ident, $f:expr) => {
            op!($t, $op, |stack, _, _, _| {
                let b = stack.pop()?.$as();
                let a = stack.pop()?.$as();
                stack.push(Value::$from($f(a, b)));
                Ok(())
            });
        };
    }
    macro_rules! try_binop {
        ($t:ident, $op:ident, $as:ident, $from:ident, $f:expr) => {
            op!($t, $op, |stack, _, _, _| {
                let b = stack.pop()?.$as();
                let a = stack.pop()?.$as();
                stack.push(Value::$from($f(a, b)?));
                Ok(())
            });
        };
    }
    macro_rules! cmpop {
        ($t:ident, $op:ident, $as:ident, $f:expr) => {
            op!($t, $op, |stack, _, _, _| {
                let b = stack.pop()?.$as();
                let a = stack.pop()?.$as();
                stack.push(Value::from_bool($f(a, b)));
                Ok(())
            });
        };
    }
    macro_rules! unop {
        ($t:ident, $op:ident, $as:ident, $from:ident, $f:expr) => {
            op!($t, $op, |stack, _, _, _| {
                let a = stack.pop()?.$as();
                stack.push(Value::$from($f(a)));
                Ok(())
            });
        };
    }
    macro_rules! try_unop {
        ($t:ident, $op:ident, $as:ident, $from:ident, $f:expr) => {
            op!($t, $op, |stack, _, _, _| {
                let a = stack.pop()?.$as();
                stack.push(Value::$from($f(a)?));
                Ok(())
            });
        };
    }
    macro_rules! load {
        ($t:ident, $op:ident, $loader:ident, $push:expr) => {
            op!($t, $op, |stack, instance, _, ins| {
                let ptr = stack.pop()?.as_u32();
                let v = instance.memory()?.borrow().$loader(ptr, ins.operand(1) as u32)?;
                stack.push($push(v));
                Ok(())
            });
        };
    }
    macro_rules! store {
        ($t:ident, $op:ident, $storer:ident, $extract:expr) => {
            op!($t, $op, |stack, instance, _, ins| {
                let value = stack.pop()?;
                let ptr = stack.pop()?.as_u32();
                instance
                    .memory()?
                    .borrow_mut()
                    .$storer(ptr, ins.operand(1) as u32, $extract(value))?;
                Ok(())
            });
        };
    }

    // ---------------- Control ----------------
    op!(t, Unreachable, |_, _, _, _| trap(UNREACHABLE));
    op!(t, Nop, |_, _, _, _| Ok(()));
    op!(t, Block, |stack, _, frames, _| {
        let frame = top_frame(frames)?;
        frame.is_control_frame = true;
        frame.register_stack_size(stack);
        Ok(())
    });
    alias!(t, Loop, Block);
    op!(t, If, |stack, _, frames, ins| {
        let frame = top_frame(frames)?;
        frame.is_control_frame = false;
        let pred = stack.pop()?;
        frame.register_stack_size(stack);
        frame.jump_to(if pred.as_i32() == 0 { ins.label_false } else { ins.label_true });
        Ok(())
    });
    op!(t, Else, |stack, _, frames, ins| {
        let frame = top_frame(frames)?;
        prepare_control_transfer(frame, stack, false)?;
        frame.jump_to(ins.label_true);
        Ok(())
    });
    alias!(t, Br, Else);
    op!(t, BrIf, |stack, _, frames, ins| {
        let frame = top_frame(frames)?;
        let pred = prepare_control_transfer(frame, stack, true)?.map_or(0, |v| v.as_i32());
        frame.jump_to(if pred == 0 { ins.label_false } else { ins.label_true });
        Ok(())
    });
    op!(t, BrTable, |stack, _, frames, ins| {
        let frame = top_frame(frames)?;
        let pred = prepare_control_transfer(frame, stack, true)?.map_or(0, |v| v.as_i32());
        let labels = &ins.label_table;
        let last = *labels.last().ok_or_else(|| Error::Fatal(UNKNOWN_LABEL.into()))?;
        // The default target is stored as the final entry.
        let target = if pred < 0 || (pred as usize) >= labels.len() - 1 {
            last
        } else {
            labels[pred as usize]
        };
        frame.jump_to(target);
        Ok(())
    });
    op!(t, Return, |_, _, frames, _| {
        top_frame(frames)?.should_return = true;
        Ok(())
    });
    op!(t, End, |stack, instance, frames, ins| {
        let frame = top_frame(frames)?;
        if frame.do_control_transfer && frame.is_control_frame {
            do_control_transfer(instance, stack, frame, ins)?;
        } else {
            frame.end_of_non_control_block();
        }
        // the last END closes the function
        if frame.is_last_block() {
            frame.should_return = true;
        }
        Ok(())
    });
    op!(t, Call, |stack, instance, frames, ins| {
        let func_id = ins.operand(0) as u32;
        let type_id = instance.function_type(func_id)?;
        let ty = instance.ty(type_id)?;
        let args = extract_args(stack, &ty.params)?;
        call(stack, instance, frames, func_id, &args, Some(ty), false)?;
        Ok(())
    });
    op!(t, CallIndirect, |stack, instance, frames, ins| {
        let type_id = ins.operand(0) as u32;
        let table_idx = ins.operand(1) as u32;
        let expected = instance.ty(type_id)?;
        let slot = stack.pop()?.as_i32() as u32;
        let entry = instance.table(table_idx)?.borrow().get(slot)?;
        if entry.is_null() {
            return Err(uninitialized_element(slot));
        }
        let func_id = entry.as_func_ref();
        let args = extract_args(stack, &expected.params)?;
        call(stack, instance, frames, func_id, &args, Some(expected), false)?;
        Ok(())
    });

    // ---------------- Parametric ----------------
    op!(t, Drop, |stack, _, _, _| {
        stack.pop()?;
        Ok(())
    });
    op!(t, Select, |stack, _, _, _| {
        let pred = stack.pop()?.as_i32();
        let b = stack.pop()?;
        let a = stack.pop()?;
        stack.push(if pred == 0 { b } else { a });
        Ok(())
    });

    // ---------------- Variables ----------------
    op!(t, LocalGet, |stack, _, frames, ins| {
        let frame = top_frame(frames)?;
        let idx = ins.operand(0) as usize;
        let v = *frame.locals.get(idx).ok_or_else(|| Error::Fatal(UNKNOWN_LOCAL.into()))?;
        stack.push(v);
        Ok(())
    });
    op!(t, LocalSet, |stack, _, frames, ins| {
        let frame = top_frame(frames)?;
        let idx = ins.operand(0) as usize;
        let v = stack.pop()?;
        *frame.locals.get_mut(idx).ok_or_else(|| Error::Fatal(UNKNOWN_LOCAL.into()))? = v;
        Ok(())
    });
    op!(t, LocalTee, |stack, _, frames, ins| {
        let frame = top_frame(frames)?;
        let idx = ins.operand(0) as usize;
        let v = stack.peek()?;
        *frame.locals.get_mut(idx).ok_or_else(|| Error::Fatal(UNKNOWN_LOCAL.into()))? = v;
        Ok(())
    });
    op!(t, GlobalGet, |stack, instance, _, ins| {
        stack.push(instance.read_global(ins.operand(0) as u32)?);
        Ok(())
    });
    op!(t, GlobalSet, |stack, instance, _, ins| {
        let v = stack.pop()?;
        instance.write_global(ins.operand(0) as u32, v)
    });

    // ---------------- Tables ----------------
    op!(t, TableGet, |stack, instance, _, ins| {
        let table = instance.table(ins.operand(0) as u32)?;
        let i = stack.pop()?.as_i32();
        let table = table.borrow();
        if i < 0 || i as u32 >= table.max() || i as u32 >= table.size() {
            return trap(OOB_TABLE_ACCESS);
        }
        stack.push(table.get(i as u32)?);
        Ok(())
    });
    op!(t, TableSet, |stack, instance, _, ins| {
        let table = instance.table(ins.operand(0) as u32)?;
        let value = stack.pop()?;
        let i = stack.pop()?.as_i32();
        table.borrow_mut().set(i as u32, value)
    });
    op!(t, TableSize, |stack, instance, _, ins| {
        let table = instance.table(ins.operand(0) as u32)?;
        stack.push(Value::from_u32(table.borrow().size()));
        Ok(())
    });
    op!(t, TableGrow, |stack, instance, _, ins| {
        let table = instance.table(ins.operand(0) as u32)?;
        let delta = stack.pop()?.as_i32();
        let init = stack.pop()?;
        let res = table.borrow_mut().grow(delta as u32, init);
        stack.push(Value::from_i32(res as i32));
        Ok(())
    });
    op!(t, TableFill, |stack, instance, _, ins| {
        let table = instance.table(ins.operand(0) as u32)?;
        let size = stack.pop()?.as_i32();
        let val = stack.pop()?;
        let offset = stack.pop()?.as_i32();
        let end = offset as i64 + size as i64;
        if size < 0 || offset < 0 || end > table.borrow().size() as i64 {
            return trap(OOB_TABLE_ACCESS);
        }
        let mut table = table.borrow_mut();
        for i in (offset as u32)..(end as u32) {
            table.set(i, val)?;
        }
        Ok(())
    });
    op!(t, TableInit, |stack, instance, _, ins| {
        let elem_idx = ins.operand(0) as u32;
        let table = instance.table(ins.operand(1) as u32)?;
        let size = stack.pop()?.as_i32();
        let elem_off = stack.pop()?.as_i32();
        let dst = stack.pop()?.as_i32();
        let table_size = table.borrow().size();
        if size < 0
            || elem_off < 0
            || dst < 0
            || elem_idx > instance.element_count()
            || !instance.element_is_live(elem_idx)
            || elem_off as i64 + size as i64 > instance.element_size(elem_idx)? as i64
            || dst as i64 + size as i64 > table_size as i64
        {
            return trap(OOB_TABLE_ACCESS);
        }
        for i in 0..size as u32 {
            let func = instance.element_value(elem_idx, elem_off as u32 + i)?;
            if func > instance.function_count() {
                return trap(OOB_TABLE_ACCESS);
            }
            table.borrow_mut().set(dst as u32 + i, Value::func_ref(func))?;
        }
        Ok(())
    });
    op!(t, TableCopy, |stack, instance, _, ins| {
        let dst_table = instance.table(ins.operand(0) as u32)?;
        let src_table = instance.table(ins.operand(1) as u32)?;
        let size = stack.pop()?.as_i32();
        let s = stack.pop()?.as_i32();
        let d = stack.pop()?.as_i32();
        if size < 0
            || s < 0
            || d < 0
            || s as i64 + size as i64 > src_table.borrow().size() as i64
            || d as i64 + size as i64 > dst_table.borrow().size() as i64
        {
            return trap(OOB_TABLE_ACCESS);
        }
        // ascending when the destination is below the source, else
        // descending; src and dst may alias the same table
        if d <= s {
            for i in 0..size as u32 {
                let v = src_table.borrow().get(s as u32 + i)?;
                dst_table.borrow_mut().set(d as u32 + i, v)?;
            }
        } else {
            for i in (0..size as u32).rev() {
                let v = src_table.borrow().get(s as u32 + i)?;
                dst_table.borrow_mut().set(d as u32 + i, v)?;
            }
        }
        Ok(())
    });
    op!(t, ElemDrop, |_, instance, _, ins| {
        instance.set_element(ins.operand(0) as u32, None);
        Ok(())
    });

    // ---------------- References ----------------
    op!(t, RefFunc, |stack, _, _, ins| {
        stack.push(Value::func_ref(ins.operand(0) as u32));
        Ok(())
    });
    op!(t, RefNull, |stack, _, _, ins| {
        let ty = ValType::from_code(ins.operand(0))
            .ok_or_else(|| Error::Fatal(UNKNOWN_TYPE.into()))?;
        stack.push(Value::null_ref(ty)?);
        Ok(())
    });
    op!(t, RefIsNull, |stack, _, _, _| {
        let v = stack.pop()?;
        stack.push(Value::from_bool(v.is_null()));
        Ok(())
    });

    // ---------------- Memory ----------------
    load!(t, I32Load, load_u32, Value::from_u32);
    load!(t, I64Load, load_u64, Value::from_u64);
    load!(t, F32Load, load_f32, Value::from_f32);
    load!(t, F64Load, load_f64, Value::from_f64);
    load!(t, I32Load8S, load_i8, |v: i8| Value::from_i32(v as i32));
    load!(t, I32Load8U, load_u8, |v: u8| Value::from_u32(v as u32));
    load!(t, I32Load16S, load_i16, |v: i16| Value::from_i32(v as i32));
    load!(t, I32Load16U, load_u16, |v: u16| Value::from_u32(v as u32));
    load!(t, I64Load8S, load_i8, |v: i8| Value::from_i64(v as i64));
    load!(t, I64Load8U, load_u8, |v: u8| Value::from_u64(v as u64));
    load!(t, I64Load16S, load_i16, |v: i16| Value::from_i64(v as i64));
    load!(t, I64Load16U, load_u16, |v: u16| Value::from_u64(v as u64));
    load!(t, I64Load32S, load_i32, |v: i32| Value::from_i64(v as i64));
    load!(t, I64Load32U, load_u32, |v: u32| Value::from_u64(v as u64));
    store!(t, I32Store, store_u32, |v: Value| v.as_u32());
    store!(t, I64Store, store_u64, |v: Value| v.as_u64());
    store!(t, F32Store, store_f32, |v: Value| v.as_f32());
    store!(t, F64Store, store_f64, |v: Value| v.as_f64());
    store!(t, I32Store8, store_u8, |v: Value| v.as_u32() as u8);
    store!(t, I32Store16, store_u16, |v: Value| v.as_u32() as u16);
    store!(t, I64Store8, store_u8, |v: Value| v.as_u64() as u8);
    store!(t, I64Store16, store_u16, |v: Value| v.as_u64() as u16);
    store!(t, I64Store32, store_u32, |v: Value| v.as_u64() as u32);
    op!(t, MemorySize, |stack, instance, _, _| {
        stack.push(Value::from_u32(instance.memory()?.borrow().size()));
        Ok(())
    });
    op!(t, MemoryGrow, |stack, instance, _, _| {
        let delta = stack.pop()?.as_i32();
        let prev = instance.memory()?.borrow_mut().grow(delta as u32);
        stack.push(Value::from_i32(prev as i32));
        Ok(())
    });
    op!(t, MemoryFill, |stack, instance, _, ins| {
        if ins.operand(0) != 0 {
            return trap(MULTI_MEMORY_UNSUPPORTED);
        }
        let size = stack.pop()?.as_i32();
        let byte = stack.pop()?.as_i32() as u8;
        let offset = stack.pop()?.as_i32();
        if size < 0 || offset < 0 {
            return trap(OOB_MEMORY_ACCESS);
        }
        instance.memory()?.borrow_mut().fill(byte, offset as u32, size as u32)
    });
    op!(t, MemoryCopy, |stack, instance, _, ins| {
        if ins.operand(0) != 0 || ins.operand(1) != 0 {
            return trap(MULTI_MEMORY_UNSUPPORTED);
        }
        let size = stack.pop()?.as_i32();
        let src = stack.pop()?.as_i32();
        let dst = stack.pop()?.as_i32();
        if size < 0 || src < 0 || dst < 0 {
            return trap(OOB_MEMORY_ACCESS);
        }
        instance.memory()?.borrow_mut().copy(dst as u32, src as u32, size as u32)
    });
    op!(t, MemoryInit, |stack, instance, _, ins| {
        let seg_id = ins.operand(0) as u32;
        if ins.operand(1) != 0 {
            return trap(MULTI_MEMORY_UNSUPPORTED);
        }
        let size = stack.pop()?.as_i32();
        let src_off = stack.pop()?.as_i32();
        let dst = stack.pop()?.as_i32();
        if size < 0 || src_off < 0 || dst < 0 {
            return trap(OOB_MEMORY_ACCESS);
        }
        instance
            .memory()?
            .borrow_mut()
            .init_passive_segment(seg_id, dst as u32, src_off as u32, size as u32)
    });
    op!(t, DataDrop, |_, instance, _, ins| {
        instance.memory()?.borrow_mut().drop_segment(ins.operand(0) as u32)
    });

    // ---------------- Constants ----------------
    op!(t, I32Const, |stack, _, _, ins| {
        stack.push(Value::from_i32(ins.operand(0) as i32));
        Ok(())
    });
    op!(t, I64Const, |stack, _, _, ins| {
        stack.push(Value::from_i64(ins.operand(0) as i64));
        Ok(())
    });
    op!(t, F32Const, |stack, _, _, ins| {
        stack.push(Value::from_f32_bits(ins.operand(0) as u32));
        Ok(())
    });
    op!(t, F64Const, |stack, _, _, ins| {
        stack.push(Value::from_f64_bits(ins.operand(0)));
        Ok(())
    });

    // ---------------- Comparisons ----------------
    unop!(t, I32Eqz, as_i32, from_bool, |a| a == 0);
    cmpop!(t, I32Eq, as_i32, |a, b| a == b);
    cmpop!(t, I32Ne, as_i32, |a, b| a != b);
    cmpop!(t, I32LtS, as_i32, |a, b| a < b);
    cmpop!(t, I32LtU, as_u32, |a, b| a < b);
    cmpop!(t, I32GtS, as_i32, |a, b| a > b);
    cmpop!(t, I32GtU, as_u32, |a, b| a > b);
    cmpop!(t, I32LeS, as_i32, |a, b| a <= b);
    cmpop!(t, I32LeU, as_u32, |a, b| a <= b);
    cmpop!(t, I32GeS, as_i32, |a, b| a >= b);
    cmpop!(t, I32GeU, as_u32, |a, b| a >= b);
    unop!(t, I64Eqz, as_i64, from_bool, |a| a == 0);
    cmpop!(t, I64Eq, as_i64, |a, b| a == b);
    cmpop!(t, I64Ne, as_i64, |a, b| a != b);
    cmpop!(t, I64LtS, as_i64, |a, b| a < b);
    cmpop!(t, I64LtU, as_u64, |a, b| a < b);
    cmpop!(t, I64GtS, as_i64, |a, b| a > b);
    cmpop!(t, I64GtU, as_u64, |a, b| a > b);
    cmpop!(t, I64LeS, as_i64, |a, b| a <= b);
    cmpop!(t, I64LeU, as_u64, |a, b| a <= b);
    cmpop!(t, I64GeS, as_i64, |a, b| a >= b);
    cmpop!(t, I64GeU, as_u64, |a, b| a >= b);
    cmpop!(t, F32Eq, as_f32, |a, b| a == b);
    cmpop!(t, F32Ne, as_f32, |a, b| a != b);
    cmpop!(t, F32Lt, as_f32, |a, b| a < b);
    cmpop!(t, F32Gt, as_f32, |a, b| a > b);
    cmpop!(t, F32Le, as_f32, |a, b| a <= b);
    cmpop!(t, F32Ge, as_f32, |a, b| a >= b);
    cmpop!(t, F64Eq, as_f64, |a, b| a == b);
    cmpop!(t, F64Ne, as_f64, |a, b| a != b);
    cmpop!(t, F64Lt, as_f64, |a, b| a < b);
    cmpop!(t, F64Gt, as_f64, |a, b| a > b);
    cmpop!(t, F64Le, as_f64, |a, b| a <= b);
    cmpop!(t, F64Ge, as_f64, |a, b| a >= b);

    // ---------------- Integer arithmetic ----------------
    unop!(t, I32Clz, as_u32, from_u32, |a: u32| a.leading_zeros());
    unop!(t, I32Ctz, as_u32, from_u32, |a: u32| a.trailing_zeros());
    unop!(t, I32Popcnt, as_u32, from_u32, |a: u32| a.count_ones());
    binop!(t, I32Add, as_u32, from_u32, |a: u32, b: u32| a.wrapping_add(b));
    binop!(t, I32Sub, as_u32, from_u32, |a: u32, b: u32| a.wrapping_sub(b));
    binop!(t, I32Mul, as_u32, from_u32, |a: u32, b: u32| a.wrapping_mul(b));
    try_binop!(t, I32DivS, as_i32, from_i32, numeric::i32_div_s);
    try_binop!(t, I32DivU, as_u32, from_u32, numeric::u32_div_u);
    try_binop!(t, I32RemS, as_i32, from_i32, numeric::i32_rem_s);
    try_binop!(t, I32RemU, as_u32, from_u32, numeric::u32_rem_u);
    binop!(t, I32And, as_u32, from_u32, |a: u32, b: u32| a & b);
    binop!(t, I32Or, as_u32, from_u32, |a: u32, b: u32| a | b);
    binop!(t, I32Xor, as_u32, from_u32, |a: u32, b: u32| a ^ b);
    binop!(t, I32Shl, as_u32, from_u32, |a: u32, b: u32| a.wrapping_shl(b));
    binop!(t, I32ShrS, as_i32, from_i32, |a: i32, b: i32| a.wrapping_shr(b as u32));
    binop!(t, I32ShrU, as_u32, from_u32, |a: u32, b: u32| a.wrapping_shr(b));
    binop!(t, I32Rotl, as_u32, from_u32, |a: u32, b: u32| a.rotate_left(b));
    binop!(t, I32Rotr, as_u32, from_u32, |a: u32, b: u32| a.rotate_right(b));
    unop!(t, I64Clz, as_u64, from_u64, |a: u64| a.leading_zeros() as u64);
    unop!(t, I64Ctz, as_u64, from_u64, |a: u64| a.trailing_zeros() as u64);
    unop!(t, I64Popcnt, as_u64, from_u64, |a: u64| a.count_ones() as u64);
    binop!(t, I64Add, as_u64, from_u64, |a: u64, b: u64| a.wrapping_add(b));
    binop!(t, I64Sub, as_u64, from_u64, |a: u64, b: u64| a.wrapping_sub(b));
    binop!(t, I64Mul, as_u64, from_u64, |a: u64, b: u64| a.wrapping_mul(b));
    try_binop!(t, I64DivS, as_i64, from_i64, numeric::i64_div_s);
    try_binop!(t, I64DivU, as_u64, from_u64, numeric::u64_div_u);
    try_binop!(t, I64RemS, as_i64, from_i64, numeric::i64_rem_s);
    try_binop!(t, I64RemU, as_u64, from_u64, numeric::u64_rem_u);
    binop!(t, I64And, as_u64, from_u64, |a: u64, b: u64| a & b);
    binop!(t, I64Or, as_u64, from_u64, |a: u64, b: u64| a | b);
    binop!(t, I64Xor, as_u64, from_u64, |a: u64, b: u64| a ^ b);
    binop!(t, I64Shl, as_u64, from_u64, |a: u64, b: u64| a.wrapping_shl(b as u32));
    binop!(t, I64ShrS, as_i64, from_i64, |a: i64, b: i64| a.wrapping_shr(b as u32));
    binop!(t, I64ShrU, as_u64, from_u64, |a: u64, b: u64| a.wrapping_shr(b as u32));
    binop!(t, I64Rotl, as_u64, from_u64, |a: u64, b: u64| a.rotate_left(b as u32));
    binop!(t, I64Rotr, as_u64, from_u64, |a: u64, b: u64| a.rotate_right(b as u32));

    // ---------------- Float arithmetic ----------------
    unop!(t, F32Abs, as_f32, from_f32, numeric::f32_abs);
    unop!(t, F32Neg, as_f32, from_f32, numeric::f32_neg);
    unop!(t, F32Ceil, as_f32, from_f32, |a: f32| a.ceil());
    unop!(t, F32Floor, as_f32, from_f32, |a: f32| a.floor());
    unop!(t, F32Trunc, as_f32, from_f32, |a: f32| a.trunc());
    unop!(t, F32Nearest, as_f32, from_f32, |a: f32| a.round_ties_even());
    unop!(t, F32Sqrt, as_f32, from_f32, |a: f32| a.sqrt());
    binop!(t, F32Add, as_f32, from_f32, |a: f32, b: f32| a + b);
    binop!(t, F32Sub, as_f32, from_f32, |a: f32, b: f32| a - b);
    binop!(t, F32Mul, as_f32, from_f32, |a: f32, b: f32| a * b);
    binop!(t, F32Div, as_f32, from_f32, |a: f32, b: f32| a / b);
    binop!(t, F32Min, as_f32, from_f32, numeric::f32_min);
    binop!(t, F32Max, as_f32, from_f32, numeric::f32_max);
    binop!(t, F32Copysign, as_f32, from_f32, numeric::f32_copysign);
    unop!(t, F64Abs, as_f64, from_f64, numeric::f64_abs);
    unop!(t, F64Neg, as_f64, from_f64, numeric::f64_neg);
    unop!(t, F64Ceil, as_f64, from_f64, |a: f64| a.ceil());
    unop!(t, F64Floor, as_f64, from_f64, |a: f64| a.floor());
    unop!(t, F64Trunc, as_f64, from_f64, |a: f64| a.trunc());
    unop!(t, F64Nearest, as_f64, from_f64, |a: f64| a.round_ties_even());
    unop!(t, F64Sqrt, as_f64, from_f64, |a: f64| a.sqrt());
    binop!(t, F64Add, as_f64, from_f64, |a: f64, b: f64| a + b);
    binop!(t, F64Sub, as_f64, from_f64, |a: f64, b: f64| a - b);
    binop!(t, F64Mul, as_f64, from_f64, |a: f64, b: f64| a * b);
    binop!(t, F64Div, as_f64, from_f64, |a: f64, b: f64| a / b);
    binop!(t, F64Min, as_f64, from_f64, numeric::f64_min);
    binop!(t, F64Max, as_f64, from_f64, numeric::f64_max);
    binop!(t, F64Copysign, as_f64, from_f64, numeric::f64_copysign);

    // ---------------- Conversions ----------------
    unop!(t, I32WrapI64, as_i64, from_i32, |a: i64| a as i32);
    try_unop!(t, I32TruncF32S, as_f32, from_i32, numeric::i32_trunc_f32);
    try_unop!(t, I32TruncF32U, as_f32, from_u32, numeric::u32_trunc_f32);
    try_unop!(t, I32TruncF64S, as_f64, from_i32, numeric::i32_trunc_f64);
    try_unop!(t, I32TruncF64U, as_f64, from_u32, numeric::u32_trunc_f64);
    unop!(t, I64ExtendI32S, as_i32, from_i64, |a: i32| a as i64);
    unop!(t, I64ExtendI32U, as_u32, from_u64, |a: u32| a as u64);
    try_unop!(t, I64TruncF32S, as_f32, from_i64, numeric::i64_trunc_f32);
    try_unop!(t, I64TruncF32U, as_f32, from_u64, numeric::u64_trunc_f32);
    try_unop!(t, I64TruncF64S, as_f64, from_i64, numeric::i64_trunc_f64);
    try_unop!(t, I64TruncF64U, as_f64, from_u64, numeric::u64_trunc_f64);
    unop!(t, F32ConvertI32S, as_i32, from_f32, |a: i32| a as f32);
    unop!(t, F32ConvertI32U, as_u32, from_f32, |a: u32| a as f32);
    unop!(t, F32ConvertI64S, as_i64, from_f32, |a: i64| a as f32);
    unop!(t, F32ConvertI64U, as_u64, from_f32, |a: u64| a as f32);
    unop!(t, F32DemoteF64, as_f64, from_f32, |a: f64| a as f32);
    unop!(t, F64ConvertI32S, as_i32, from_f64, |a: i32| a as f64);
    unop!(t, F64ConvertI32U, as_u32, from_f64, |a: u32| a as f64);
    unop!(t, F64ConvertI64S, as_i64, from_f64, |a: i64| a as f64);
    unop!(t, F64ConvertI64U, as_u64, from_f64, |a: u64| a as f64);
    unop!(t, F64PromoteF32, as_f32, from_f64, |a: f32| a as f64);
    op!(t, I32ReinterpretF32, |stack, _, _, _| {
        let v = stack.pop()?;
        stack.push(Value::from_u32(v.as_f32_bits()));
        Ok(())
    });
    op!(t, I64ReinterpretF64, |stack, _, _, _| {
        let v = stack.pop()?;
        stack.push(Value::from_u64(v.as_f64_bits()));
        Ok(())
    });
    op!(t, F32ReinterpretI32, |stack, _, _, _| {
        let v = stack.pop()?;
        stack.push(Value::from_f32_bits(v.as_u32()));
        Ok(())
    });
    op!(t, F64ReinterpretI64, |stack, _, _, _| {
        let v = stack.pop()?;
        stack.push(Value::from_f64_bits(v.as_u64()));
        Ok(())
    });
    unop!(t, I32Extend8S, as_i32, from_i32, |a: i32| a as i8 as i32);
    unop!(t, I32Extend16S, as_i32, from_i32, |a: i32| a as i16 as i32);
    unop!(t, I64Extend8S, as_i64, from_i64, |a: i64| a as i8 as i64);
    unop!(t, I64Extend16S, as_i64, from_i64, |a: i64| a as i16 as i64);
    unop!(t, I64Extend32S, as_i64, from_i64, |a: i64| a as i32 as i64);

    // ---------------- Saturating truncations ----------------
    unop!(t, I32TruncSatF32S, as_f32, from_i32, |a: f32| a as i32);
    unop!(t, I32TruncSatF32U, as_f32, from_u32, |a: f32| a as u32);
    unop!(t, I32TruncSatF64S, as_f64, from_i32, |a: f64| a as i32);
    unop!(t, I32TruncSatF64U, as_f64, from_u32, |a: f64| a as u32);
    unop!(t, I64TruncSatF32S, as_f32, from_i64, |a: f32| a as i64);
    unop!(t, I64TruncSatF32U, as_f32, from_u64, |a: f32| a as u64);
    unop!(t, I64TruncSatF64S, as_f64, from_i64, |a: f64| a as i64);
    unop!(t, I64TruncSatF64U, as_f64, from_u64, |a: f64| a as u64);

    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_has_a_handler() {
        for (ordinal, slot) in DISPATCH.iter().enumerate() {
            assert!(slot.is_some(), "empty dispatch slot at ordinal {ordinal}");
        }
    }
}
