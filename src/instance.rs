use std::cell::RefCell;
use std::rc::Rc;

use crate::error::*;
use crate::memory::WasmMemory;
use crate::opcode::{Instruction, OpCode};
use crate::table::WasmTable;
use crate::value::{ValType, Value};

/// A typed global cell. Writes to a cell with `mutable == false` are a
/// fatal error, not a trap.
pub struct WasmGlobal {
    pub ty: ValType,
    pub mutable: bool,
    pub value: Value,
}

/// Parameter and result sequences of a function or block type.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub params: Vec<ValType>,
    pub returns: Vec<ValType>,
}

impl FunctionType {
    pub fn new(params: Vec<ValType>, returns: Vec<ValType>) -> Self {
        Self { params, returns }
    }

    /// Indirect calls require exact equality of both sequences.
    pub fn types_match(&self, other: &FunctionType) -> bool {
        self.params == other.params && self.returns == other.returns
    }
}

/// Decoded body of a module-local function.
pub struct FunctionBody {
    pub instructions: Rc<[Instruction]>,
    pub local_types: Vec<ValType>,
}

impl FunctionBody {
    pub fn new(instructions: Vec<Instruction>, local_types: Vec<ValType>) -> Self {
        Self { instructions: instructions.into(), local_types }
    }
}

/// Host closure: `(instance, args) -> values | none`; traps by
/// returning the VM error.
pub type HostFn = Rc<dyn Fn(&Instance, &[Value]) -> Result<Option<Vec<Value>>, Error>>;

/// What an imported function slot resolves to at call time.
#[derive(Clone)]
pub enum HostImport {
    Function(HostFn),
    /// An import slot used as a value source pushes the global's
    /// current value.
    Global(Rc<RefCell<WasmGlobal>>),
}

/// A decoded constant expression, evaluated against instance state.
pub type ConstExpr = Vec<Instruction>;

/// Element segment variants feeding `table.init`.
pub enum ElementSegment {
    Func(Vec<u32>),
    Elem(Vec<ConstExpr>),
    Type(ConstExpr),
}

impl ElementSegment {
    pub fn size(&self) -> u32 {
        match self {
            ElementSegment::Func(idx) => idx.len() as u32,
            ElementSegment::Elem(exprs) => exprs.len() as u32,
            ElementSegment::Type(_) => 1,
        }
    }
}

/// Everything the interpreter consumes from its host: types, bodies,
/// the import index, and the mutable resources. Imported tables and
/// globals are resolved into the same `Rc<RefCell<_>>` slots local ones
/// occupy, so the core reads them uniformly; imported functions stay in
/// `imports` because they dispatch differently.
#[derive(Default)]
pub struct Instance {
    pub types: Vec<FunctionType>,
    /// Function index to type index.
    pub function_types: Vec<u32>,
    /// `None` marks an imported function.
    pub bodies: Vec<Option<FunctionBody>>,
    pub imports: Vec<Option<HostImport>>,
    pub memory: Option<Rc<RefCell<WasmMemory>>>,
    pub tables: Vec<Rc<RefCell<WasmTable>>>,
    pub globals: Vec<Rc<RefCell<WasmGlobal>>>,
    /// Cells so `elem.drop` can retire a segment mid-execution.
    pub elements: Vec<RefCell<Option<ElementSegment>>>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function_type(&self, func_id: u32) -> Result<u32, Error> {
        match self.function_types.get(func_id as usize) {
            Some(&type_id) => Ok(type_id),
            None => fatal(UNKNOWN_FUNC),
        }
    }

    pub fn ty(&self, type_id: u32) -> Result<&FunctionType, Error> {
        match self.types.get(type_id as usize) {
            Some(ty) => Ok(ty),
            None => fatal(UNKNOWN_TYPE),
        }
    }

    /// The decoded body, or `None` for an imported function.
    pub fn function(&self, func_id: u32) -> Result<Option<&FunctionBody>, Error> {
        match self.bodies.get(func_id as usize) {
            Some(body) => Ok(body.as_ref()),
            None => fatal(UNKNOWN_FUNC),
        }
    }

    pub fn import(&self, func_id: u32) -> Option<&HostImport> {
        self.imports.get(func_id as usize).and_then(|i| i.as_ref())
    }

    pub fn function_count(&self) -> u32 {
        self.bodies.len() as u32
    }

    pub fn memory(&self) -> Result<&Rc<RefCell<WasmMemory>>, Error> {
        match &self.memory {
            Some(mem) => Ok(mem),
            None => fatal(UNKNOWN_MEMORY),
        }
    }

    pub fn table(&self, idx: u32) -> Result<&Rc<RefCell<WasmTable>>, Error> {
        match self.tables.get(idx as usize) {
            Some(t) => Ok(t),
            None => fatal(UNKNOWN_TABLE),
        }
    }

    pub fn read_global(&self, idx: u32) -> Result<Value, Error> {
        match self.globals.get(idx as usize) {
            Some(g) => Ok(g.borrow().value),
            None => fatal(UNKNOWN_GLOBAL),
        }
    }

    pub fn write_global(&self, idx: u32, value: Value) -> Result<(), Error> {
        let cell = match self.globals.get(idx as usize) {
            Some(g) => g,
            None => return fatal(UNKNOWN_GLOBAL),
        };
        let mut g = cell.borrow_mut();
        if !g.mutable {
            return fatal(IMMUTABLE_GLOBAL);
        }
        g.value = value;
        Ok(())
    }

    pub fn element_count(&self) -> u32 {
        self.elements.len() as u32
    }

    /// Whether segment `idx` exists and has not been dropped.
    pub fn element_is_live(&self, idx: u32) -> bool {
        matches!(self.elements.get(idx as usize), Some(cell) if cell.borrow().is_some())
    }

    pub fn element_size(&self, idx: u32) -> Result<u32, Error> {
        match self.elements.get(idx as usize) {
            Some(cell) => Ok(cell.borrow().as_ref().map_or(0, |seg| seg.size())),
            None => fatal(UNKNOWN_ELEM),
        }
    }

    /// `elem.drop`: the segment becomes unavailable to later inits.
    pub fn set_element(&self, idx: u32, seg: Option<ElementSegment>) {
        if let Some(cell) = self.elements.get(idx as usize) {
            *cell.borrow_mut() = seg;
        }
    }

    pub fn add_element(&mut self, seg: ElementSegment) -> u32 {
        self.elements.push(RefCell::new(Some(seg)));
        self.elements.len() as u32 - 1
    }

    /// Convenience for embedders and tests: register a function with an
    /// existing type id and return its function id.
    pub fn add_function(&mut self, type_id: u32, body: FunctionBody) -> u32 {
        let id = self.bodies.len() as u32;
        self.function_types.push(type_id);
        self.bodies.push(Some(body));
        self.imports.push(None);
        id
    }

    /// Register an imported host function slot.
    pub fn add_host_function(&mut self, type_id: u32, host: HostFn) -> u32 {
        let id = self.bodies.len() as u32;
        self.function_types.push(type_id);
        self.bodies.push(None);
        self.imports.push(Some(HostImport::Function(host)));
        id
    }

    /// Evaluate a decoded constant expression: const pushes, reference
    /// constants, reads of (already initialised) globals, and the
    /// wrapping integer add/sub/mul permitted in initialisers.
    pub fn compute_constant_value(&self, expr: &ConstExpr) -> Result<Value, Error> {
        let mut stack: Vec<Value> = Vec::with_capacity(2);
        for ins in expr {
            match ins.opcode {
                OpCode::I32Const => stack.push(Value::from_i32(ins.operand(0) as i32)),
                OpCode::I64Const => stack.push(Value::from_i64(ins.operand(0) as i64)),
                OpCode::F32Const => stack.push(Value::from_f32_bits(ins.operand(0) as u32)),
                OpCode::F64Const => stack.push(Value::from_f64_bits(ins.operand(0))),
                OpCode::RefFunc => stack.push(Value::func_ref(ins.operand(0) as u32)),
                OpCode::RefNull => {
                    let ty = ValType::from_code(ins.operand(0))
                        .ok_or_else(|| Error::Fatal(CONST_EXPR_REQUIRED.into()))?;
                    stack.push(Value::null_ref(ty)?);
                }
                OpCode::GlobalGet => stack.push(self.read_global(ins.operand(0) as u32)?),
                OpCode::I32Add | OpCode::I32Sub | OpCode::I32Mul => {
                    let b = pop_const(&mut stack)?.as_u32();
                    let a = pop_const(&mut stack)?.as_u32();
                    let v = match ins.opcode {
                        OpCode::I32Add => a.wrapping_add(b),
                        OpCode::I32Sub => a.wrapping_sub(b),
                        _ => a.wrapping_mul(b),
                    };
                    stack.push(Value::from_u32(v));
                }
                OpCode::I64Add | OpCode::I64Sub | OpCode::I64Mul => {
                    let b = pop_const(&mut stack)?.as_u64();
                    let a = pop_const(&mut stack)?.as_u64();
                    let v = match ins.opcode {
                        OpCode::I64Add => a.wrapping_add(b),
                        OpCode::I64Sub => a.wrapping_sub(b),
                        _ => a.wrapping_mul(b),
                    };
                    stack.push(Value::from_u64(v));
                }
                OpCode::End => break,
                _ => return fatal(CONST_EXPR_REQUIRED),
            }
        }
        pop_const(&mut stack)
    }

    /// Resolve entry `pos` of element segment `idx` to a function
    /// index, whatever the segment variant.
    pub fn element_value(&self, idx: u32, pos: u32) -> Result<u32, Error> {
        let cell = match self.elements.get(idx as usize) {
            Some(cell) => cell.borrow(),
            None => return trap(OOB_TABLE_ACCESS),
        };
        match cell.as_ref() {
            None => trap(OOB_TABLE_ACCESS),
            Some(ElementSegment::Func(indices)) => indices
                .get(pos as usize)
                .copied()
                .ok_or_else(|| Error::Trap(OOB_TABLE_ACCESS.into())),
            Some(ElementSegment::Elem(exprs)) => {
                let expr = exprs
                    .get(pos as usize)
                    .ok_or_else(|| Error::Trap(OOB_TABLE_ACCESS.into()))?;
                Ok(self.compute_constant_value(expr)?.bits() as u32)
            }
            Some(ElementSegment::Type(expr)) => {
                Ok(self.compute_constant_value(expr)?.bits() as u32)
            }
        }
    }
}

fn pop_const(stack: &mut Vec<Value>) -> Result<Value, Error> {
    stack.pop().ok_or_else(|| Error::Fatal(CONST_EXPR_REQUIRED.into()))
}
