use smallvec::SmallVec;

/// Ordinal space for the dispatch table. Declaration order is the
/// ordinal; wire encodings belong to the decoder, not to this core.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Control
    Unreachable,
    Nop,
    Block,
    Loop,
    If,
    Else,
    End,
    Br,
    BrIf,
    BrTable,
    Return,
    Call,
    CallIndirect,
    // Parametric
    Drop,
    Select,
    // Variables
    LocalGet,
    LocalSet,
    LocalTee,
    GlobalGet,
    GlobalSet,
    // Tables (indexed access)
    TableGet,
    TableSet,
    // Memory
    I32Load,
    I64Load,
    F32Load,
    F64Load,
    I32Load8S,
    I32Load8U,
    I32Load16S,
    I32Load16U,
    I64Load8S,
    I64Load8U,
    I64Load16S,
    I64Load16U,
    I64Load32S,
    I64Load32U,
    I32Store,
    I64Store,
    F32Store,
    F64Store,
    I32Store8,
    I32Store16,
    I64Store8,
    I64Store16,
    I64Store32,
    MemorySize,
    MemoryGrow,
    // Constants
    I32Const,
    I64Const,
    F32Const,
    F64Const,
    // i32 comparisons
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,
    // i64 comparisons
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,
    // f32 comparisons
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,
    // f64 comparisons
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,
    // i32 arithmetic
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,
    // i64 arithmetic
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,
    // f32 arithmetic
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,
    // f64 arithmetic
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,
    // Conversions
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
    // Sign extension
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,
    // References
    RefNull,
    RefIsNull,
    RefFunc,
    // Saturating truncations
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
    // Bulk memory and tables
    MemoryInit,
    DataDrop,
    MemoryCopy,
    MemoryFill,
    TableInit,
    ElemDrop,
    TableCopy,
    TableGrow,
    TableSize,
    TableFill,
}

impl OpCode {
    /// Size of the dispatch table.
    pub const COUNT: usize = OpCode::TableFill as usize + 1;

    #[inline]
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

/// Immediate operands; two slots cover every opcode in the set
/// (memory ops carry align + offset, bulk ops two indices).
pub type Operands = SmallVec<[u64; 2]>;

/// One decoded instruction. Labels are absolute indices into the owning
/// function body, resolved by the decoder:
///
/// * `label_true` — branch target of BR/ELSE, taken edge of IF/BR_IF;
/// * `label_false` — fall-through edge of IF/BR_IF;
/// * `label_table` — BR_TABLE targets, default entry last;
/// * `scope` — for END, the index of the block-opening instruction it
///   closes; `None` on the END that closes the function body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operands: Operands,
    pub label_true: usize,
    pub label_false: usize,
    pub label_table: Vec<usize>,
    pub scope: Option<usize>,
}

impl Instruction {
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            operands: Operands::new(),
            label_true: 0,
            label_false: 0,
            label_table: Vec::new(),
            scope: None,
        }
    }

    pub fn with_operands(opcode: OpCode, operands: &[u64]) -> Self {
        let mut ins = Self::new(opcode);
        ins.operands = SmallVec::from_slice(operands);
        ins
    }

    pub fn labels(mut self, label_true: usize, label_false: usize) -> Self {
        self.label_true = label_true;
        self.label_false = label_false;
        self
    }

    pub fn table(mut self, labels: Vec<usize>) -> Self {
        self.label_table = labels;
        self
    }

    pub fn scoped(mut self, scope: usize) -> Self {
        self.scope = Some(scope);
        self
    }

    #[inline]
    pub fn operand(&self, i: usize) -> u64 {
        self.operands[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_are_dense() {
        assert_eq!(OpCode::Unreachable.ordinal(), 0);
        assert_eq!(OpCode::TableFill.ordinal(), OpCode::COUNT - 1);
        assert!(OpCode::COUNT > 190);
    }

    #[test]
    fn operands_stay_inline() {
        let ins = Instruction::with_operands(OpCode::I32Load, &[2, 16]);
        assert!(!ins.operands.spilled());
        assert_eq!(ins.operand(1), 16);
    }
}
