use std::collections::HashMap;
use std::rc::Rc;

use crate::opcode::Instruction;
use crate::stack::ValueStack;
use crate::value::{ValType, Value};

/// Activation record for one function call.
///
/// Locals are the arguments followed by one zeroed cell per declared
/// local type. The block registry maps nesting depth to the operand
/// stack height recorded when that block was entered; exits drop back
/// to it.
pub struct StackFrame {
    pub instructions: Rc<[Instruction]>,
    pub pc: usize,
    pub func_id: u32,
    pub locals: Vec<Value>,
    /// Whether the innermost open block is a break target.
    pub is_control_frame: bool,
    /// Armed by the branch family; consumed by the next control END.
    pub do_control_transfer: bool,
    pub should_return: bool,
    block_depth: u32,
    stack_sizes: HashMap<u32, usize>,
}

impl StackFrame {
    pub fn new(
        instructions: Rc<[Instruction]>,
        func_id: u32,
        args: &[Value],
        local_types: &[ValType],
    ) -> Self {
        let mut locals = Vec::with_capacity(args.len() + local_types.len());
        locals.extend_from_slice(args);
        locals.extend(local_types.iter().map(|&ty| Value::zero(ty)));
        Self {
            instructions,
            pc: 0,
            func_id,
            locals,
            is_control_frame: true,
            do_control_transfer: false,
            should_return: false,
            block_depth: 0,
            stack_sizes: HashMap::new(),
        }
    }

    /// Placeholder frame for a host call; keeps the call chain visible
    /// in stack traces without any code to run.
    pub fn host(func_id: u32, args: &[Value]) -> Self {
        Self::new(Vec::new().into(), func_id, args, &[])
    }

    #[inline]
    pub fn local(&self, idx: usize) -> Value {
        self.locals[idx]
    }

    #[inline]
    pub fn set_local(&mut self, idx: usize, value: Value) {
        self.locals[idx] = value;
    }

    /// Fetch the instruction under the cursor and advance past it.
    #[inline]
    pub fn load_current_instruction(&mut self) -> usize {
        let pc = self.pc;
        self.pc += 1;
        pc
    }

    #[inline]
    pub fn jump_to(&mut self, label: usize) {
        self.pc = label;
    }

    /// Record the operand stack height for the block being entered.
    pub fn register_stack_size(&mut self, stack: &ValueStack) {
        self.block_depth += 1;
        self.stack_sizes.insert(self.block_depth, stack.size());
    }

    /// Drop operands down to the innermost recorded entry height and
    /// close that block level.
    pub fn drop_values_out_of_block(&mut self, stack: &mut ValueStack) {
        if let Some(target) = self.stack_sizes.remove(&self.block_depth) {
            while stack.size() > target {
                let _ = stack.pop();
            }
        }
        self.block_depth = self.block_depth.saturating_sub(1);
    }

    /// Close a block that ended without a control transfer; its values
    /// flow through untouched.
    pub fn end_of_non_control_block(&mut self) {
        self.stack_sizes.remove(&self.block_depth);
        self.block_depth = self.block_depth.saturating_sub(1);
    }

    /// True when the END just executed closed the function body. Depth
    /// alone cannot tell a sibling block's END from the last one, so
    /// this is a cursor check.
    #[inline]
    pub fn is_last_block(&self) -> bool {
        self.pc >= self.instructions.len()
    }

    /// Cursor ran past the final instruction.
    #[inline]
    pub fn terminated(&self) -> bool {
        self.pc >= self.instructions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{Instruction, OpCode};

    fn body(ops: &[OpCode]) -> Rc<[Instruction]> {
        ops.iter().map(|&op| Instruction::new(op)).collect::<Vec<_>>().into()
    }

    #[test]
    fn locals_are_args_then_zeroed() {
        let frame = StackFrame::new(
            body(&[OpCode::End]),
            3,
            &[Value::from_i32(9)],
            &[ValType::I64, ValType::FuncRef],
        );
        assert_eq!(frame.locals.len(), 3);
        assert_eq!(frame.local(0).as_i32(), 9);
        assert_eq!(frame.local(1).as_i64(), 0);
        assert!(frame.local(2).is_null());
    }

    #[test]
    fn block_registry_realigns_stack() {
        let mut frame = StackFrame::new(body(&[OpCode::Block, OpCode::End]), 0, &[], &[]);
        let mut stack = ValueStack::new();
        stack.push(Value::from_i32(1));
        frame.register_stack_size(&stack);
        stack.push(Value::from_i32(2));
        stack.push(Value::from_i32(3));
        frame.drop_values_out_of_block(&mut stack);
        assert_eq!(stack.size(), 1);
        assert_eq!(stack.peek().unwrap().as_i32(), 1);
    }

    #[test]
    fn last_block_is_cursor_based() {
        let mut frame = StackFrame::new(body(&[OpCode::Nop, OpCode::End]), 0, &[], &[]);
        frame.load_current_instruction();
        assert!(!frame.is_last_block());
        frame.load_current_instruction();
        assert!(frame.is_last_block());
        assert!(frame.terminated());
    }
}
