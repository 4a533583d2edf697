use std::cell::RefCell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wami::{
    FunctionBody, FunctionType, Instance, Instruction, Machine, OpCode, ValType, Value, WasmMemory,
};

fn op(o: OpCode) -> Instruction {
    Instruction::new(o)
}

fn op1(o: OpCode, a: u64) -> Instruction {
    Instruction::with_operands(o, &[a])
}

fn op2(o: OpCode, a: u64, b: u64) -> Instruction {
    Instruction::with_operands(o, &[a, b])
}

fn i32c(v: i32) -> Instruction {
    op1(OpCode::I32Const, v as u32 as u64)
}

/// sum(n..=1) with a block/loop/br_if skeleton: the hot path of the
/// dispatch loop, branch machinery and locals.
fn sum_loop_instance() -> Instance {
    let body = vec![
        op1(OpCode::Block, 0x40),
        op1(OpCode::Loop, 0x40),
        op1(OpCode::LocalGet, 0),
        op(OpCode::I32Eqz),
        op(OpCode::BrIf).labels(15, 5),
        op1(OpCode::LocalGet, 1),
        op1(OpCode::LocalGet, 0),
        op(OpCode::I32Add),
        op1(OpCode::LocalSet, 1),
        op1(OpCode::LocalGet, 0),
        i32c(1),
        op(OpCode::I32Sub),
        op1(OpCode::LocalSet, 0),
        op(OpCode::Br).labels(1, 0),
        op(OpCode::End).scoped(1),
        op(OpCode::End).scoped(0),
        op1(OpCode::LocalGet, 1),
        op(OpCode::End),
    ];
    let mut inst = Instance::new();
    inst.types.push(FunctionType::new(vec![ValType::I32], vec![ValType::I32]));
    inst.add_function(0, FunctionBody::new(body, vec![ValType::I32]));
    inst
}

/// Write-then-read sweep over one memory page.
fn memory_churn_instance() -> Instance {
    let body = vec![
        // while i != limit { mem[i] = i; acc += mem[i]; i += 4 }
        op1(OpCode::Block, 0x40),
        op1(OpCode::Loop, 0x40),
        op1(OpCode::LocalGet, 0),
        i32c(65536 - 4),
        op(OpCode::I32GeU),
        op(OpCode::BrIf).labels(20, 6),
        op1(OpCode::LocalGet, 0),
        op1(OpCode::LocalGet, 0),
        op2(OpCode::I32Store, 2, 0),
        op1(OpCode::LocalGet, 1),
        op1(OpCode::LocalGet, 0),
        op2(OpCode::I32Load, 2, 0),
        op(OpCode::I32Add),
        op1(OpCode::LocalSet, 1),
        op1(OpCode::LocalGet, 0),
        i32c(4),
        op(OpCode::I32Add),
        op1(OpCode::LocalSet, 0),
        op(OpCode::Br).labels(1, 0),
        op(OpCode::End).scoped(1),
        op(OpCode::End).scoped(0),
        op1(OpCode::LocalGet, 1),
        op(OpCode::End),
    ];
    let mut inst = Instance::new();
    inst.types.push(FunctionType::new(vec![ValType::I32], vec![ValType::I32]));
    inst.add_function(0, FunctionBody::new(body, vec![ValType::I32]));
    inst.memory = Some(Rc::new(RefCell::new(WasmMemory::new(1, 1))));
    inst
}

fn bench_interp(c: &mut Criterion) {
    let sum = sum_loop_instance();
    c.bench_function("sum_loop_1k", |b| {
        b.iter(|| {
            let out = Machine::new(&sum)
                .call(0, &[Value::from_i32(black_box(1000))], true)
                .unwrap()
                .unwrap();
            black_box(out[0].as_i32())
        })
    });

    let churn = memory_churn_instance();
    c.bench_function("memory_churn_page", |b| {
        b.iter(|| {
            let out = Machine::new(&churn)
                .call(0, &[Value::from_i32(black_box(0))], true)
                .unwrap()
                .unwrap();
            black_box(out[0].as_i32())
        })
    });
}

criterion_group!(benches, bench_interp);
criterion_main!(benches);
